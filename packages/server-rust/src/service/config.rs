use sos_core::request::{versions, SOS};
use sos_core::TieBreak;

use crate::binding::soap::SoapVersion;

/// How the event bus runs listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventDelivery {
    /// Listeners run on the firing thread before `fire` returns.
    #[default]
    Synchronous,
    /// Listeners run on a fixed pool of background workers.
    Asynchronous { workers: usize },
}

impl EventDelivery {
    /// Asynchronous delivery with the default pool size.
    pub const DEFAULT_ASYNC: Self = Self::Asynchronous { workers: 3 };
}

/// Configuration of the dispatch core.
///
/// Controls service defaults, codec tie-breaking, event delivery and SOAP
/// handling.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service assumed for capabilities requests that omit `service`.
    pub default_service: String,
    /// Version stamped on fault documents when the request's is unknown
    /// and the default service has no operators.
    pub fallback_version: String,
    /// Order among equally close codecs.
    pub codec_tie_break: TieBreak,
    pub event_delivery: EventDelivery,
    /// Reject SOAP requests whose action does not name the body operation.
    pub validate_soap_action: bool,
    /// SOAP version for faults raised before the envelope was understood.
    pub default_soap_version: SoapVersion,
    /// Base URL of the binding endpoints, advertised in capabilities.
    pub service_url: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_service: SOS.to_string(),
            fallback_version: versions::V2_0_0.to_string(),
            codec_tie_break: TieBreak::RegistrationOrder,
            event_delivery: EventDelivery::Synchronous,
            validate_soap_action: false,
            default_soap_version: SoapVersion::Soap12,
            service_url: "/service".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_config_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.default_service, "SOS");
        assert_eq!(config.fallback_version, "2.0.0");
        assert_eq!(config.codec_tie_break, TieBreak::RegistrationOrder);
        assert_eq!(config.event_delivery, EventDelivery::Synchronous);
        assert!(!config.validate_soap_action);
        assert_eq!(config.default_soap_version, SoapVersion::Soap12);
        assert_eq!(config.service_url, "/service");
    }

    #[test]
    fn default_async_pool_has_three_workers() {
        assert_eq!(
            EventDelivery::DEFAULT_ASYNC,
            EventDelivery::Asynchronous { workers: 3 }
        );
    }
}
