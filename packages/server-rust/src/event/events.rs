//! Events raised by the dispatch core itself.

use std::any::Any;

use sos_core::{ExceptionReport, TypeTag};

use super::{Event, EVENT};

/// Parent of events that signal a change of runtime configuration.
pub static CONFIGURATION_EVENT: TypeTag = TypeTag::new("ConfigurationEvent", &[&EVENT]);

pub static EXCEPTION_EVENT: TypeTag = TypeTag::new("ExceptionEvent", &[&EVENT]);
pub static SETTINGS_CHANGE_EVENT: TypeTag =
    TypeTag::new("SettingsChangeEvent", &[&CONFIGURATION_EVENT]);
pub static CODEC_RELOAD_EVENT: TypeTag = TypeTag::new("CodecReloadEvent", &[&CONFIGURATION_EVENT]);

/// A binding turned a failure into a fault response.
#[derive(Debug, Clone)]
pub struct ExceptionEvent {
    pub binding: &'static str,
    pub report: ExceptionReport,
}

impl Event for ExceptionEvent {
    fn event_type(&self) -> &'static TypeTag {
        &EXCEPTION_EVENT
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A setting changed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsChangeEvent {
    pub key: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl Event for SettingsChangeEvent {
    fn event_type(&self) -> &'static TypeTag {
        &SETTINGS_CHANGE_EVENT
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The codec registries were rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecReloadEvent {
    pub decoders: usize,
    pub encoders: usize,
}

impl Event for CodecReloadEvent {
    fn event_type(&self) -> &'static TypeTag {
        &CODEC_RELOAD_EVENT
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
