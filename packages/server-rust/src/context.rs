//! Composition root of the dispatch core.
//!
//! [`SosContext`] owns everything a binding needs to serve requests: the
//! codec repository, the frozen operator router, the event bus and the
//! installed bindings. It is built once at startup with
//! [`SosContextBuilder`]; afterwards only the codec snapshots change, via
//! [`SosContext::reload_codecs`].

use std::sync::Arc;

use sos_core::{CodingRepository, ConfigurationError};
use tracing::info;

use crate::binding::{Binding, BindingContext, BindingRepository};
use crate::event::{CodecReloadEvent, EventBus, EventListener, SettingsChangeEvent};
use crate::service::config::ServiceConfig;
use crate::service::domain::{install_codecs, GetCapabilitiesOperator};
use crate::service::operation::RequestOperator;
use crate::service::registry::OperatorRegistry;
use crate::service::router::OperatorRouter;

/// Collects operators, listeners and bindings before the router is frozen.
pub struct SosContextBuilder {
    config: ServiceConfig,
    codecs: Arc<CodingRepository>,
    operators: Vec<Arc<dyn RequestOperator>>,
    listeners: Vec<Arc<dyn EventListener>>,
    bindings: BindingRepository,
    capabilities: bool,
}

impl SosContextBuilder {
    #[must_use]
    pub fn operator(mut self, operator: Arc<dyn RequestOperator>) -> Self {
        self.operators.push(operator);
        self
    }

    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Adds or replaces a binding; KVP, POX and SOAP are installed already.
    #[must_use]
    pub fn binding(mut self, binding: Arc<dyn Binding>) -> Self {
        self.bindings.register(binding);
        self
    }

    /// Skips the built-in `GetCapabilities` operator and codecs.
    #[must_use]
    pub fn without_capabilities(mut self) -> Self {
        self.capabilities = false;
        self
    }

    /// Registers everything and freezes the router.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for duplicate operators, duplicate
    /// exact codec keys, or when no operator ends up registered.
    pub fn build(self) -> Result<SosContext, ConfigurationError> {
        let mut registry = OperatorRegistry::new();
        for operator in self.operators {
            registry.register(operator)?;
        }

        if self.capabilities {
            install_codecs(
                &self.codecs,
                &self.config.default_service,
                &self.config.service_url,
            )?;
            let operators = GetCapabilitiesOperator::from_registry(
                &registry,
                &self.config.default_service,
                &self.codecs,
                &self.bindings,
            );
            for operator in operators {
                registry.register(operator)?;
            }
        }

        let router = OperatorRouter::new(registry)?;

        let events = Arc::new(EventBus::new(self.config.event_delivery));
        for listener in self.listeners {
            events.register(listener);
        }

        info!(
            operators = router.registry().len(),
            decoders = self.codecs.decoders().len(),
            encoders = self.codecs.encoders().len(),
            bindings = self.bindings.len(),
            listeners = events.listener_count(),
            "dispatch core assembled"
        );

        Ok(SosContext {
            dispatch: BindingContext::new(Arc::new(self.config), self.codecs, router, events),
            bindings: self.bindings,
        })
    }
}

/// Shared state behind every transport endpoint. Cloning is cheap.
#[derive(Clone)]
pub struct SosContext {
    dispatch: BindingContext,
    bindings: BindingRepository,
}

impl SosContext {
    #[must_use]
    pub fn builder(config: ServiceConfig, codecs: Arc<CodingRepository>) -> SosContextBuilder {
        SosContextBuilder {
            config,
            codecs,
            operators: Vec::new(),
            listeners: Vec::new(),
            bindings: BindingRepository::with_defaults(),
            capabilities: true,
        }
    }

    /// What bindings hand requests to.
    #[must_use]
    pub fn dispatch(&self) -> &BindingContext {
        &self.dispatch
    }

    #[must_use]
    pub fn bindings(&self) -> &BindingRepository {
        &self.bindings
    }

    /// The binding served under `url_pattern`, ignoring case.
    #[must_use]
    pub fn binding(&self, url_pattern: &str) -> Option<Arc<dyn Binding>> {
        self.bindings.get(url_pattern)
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.dispatch.config
    }

    #[must_use]
    pub fn codecs(&self) -> &CodingRepository {
        &self.dispatch.codecs
    }

    #[must_use]
    pub fn router(&self) -> &OperatorRouter {
        &self.dispatch.router
    }

    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.dispatch.events
    }

    /// Rebuilds both codec snapshots and announces the new counts.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigurationError`] raised by discovery; the previous
    /// snapshots stay in place.
    pub fn reload_codecs(&self) -> Result<CodecReloadEvent, ConfigurationError> {
        let codecs = &self.dispatch.codecs;
        codecs.reload()?;
        let event = CodecReloadEvent {
            decoders: codecs.decoders().len(),
            encoders: codecs.encoders().len(),
        };
        info!(
            decoders = event.decoders,
            encoders = event.encoders,
            "codecs reloaded"
        );
        self.dispatch.events.fire(event);
        Ok(event)
    }

    /// Announces a changed setting to listeners.
    pub fn setting_changed(&self, key: &str, old: Option<String>, new: Option<String>) {
        info!(key, ?old, ?new, "setting changed");
        self.dispatch.events.fire(SettingsChangeEvent {
            key: key.to_string(),
            old,
            new,
        });
    }

    /// Stops background event delivery, letting queued events finish.
    pub async fn shutdown(&self) {
        self.dispatch.events.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use sos_core::{TieBreak, TypeTag};

    use super::*;
    use crate::binding::TransportRequest;
    use crate::event::events::CONFIGURATION_EVENT;
    use crate::event::Event;
    use crate::testing::EchoOperator;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl EventListener for Recorder {
        fn types(&self) -> Vec<&'static TypeTag> {
            vec![&CONFIGURATION_EVENT]
        }

        fn handle(&self, event: &dyn Event) -> anyhow::Result<()> {
            self.seen.lock().push(event.event_type().name().to_string());
            Ok(())
        }
    }

    fn codecs() -> Arc<CodingRepository> {
        Arc::new(CodingRepository::new(TieBreak::RegistrationOrder))
    }

    #[test]
    fn capabilities_alone_satisfy_the_router() {
        let context = SosContext::builder(ServiceConfig::default(), codecs())
            .build()
            .unwrap();
        assert!(context.router().is_version_supported("SOS", "2.0.0"));
        assert_eq!(context.codecs().decoders().len(), 2);
        assert_eq!(context.codecs().encoders().len(), 1);
        assert_eq!(context.bindings().len(), 3);
    }

    #[test]
    fn empty_context_without_capabilities_is_rejected() {
        let result = SosContext::builder(ServiceConfig::default(), codecs())
            .without_capabilities()
            .build();
        assert!(matches!(result, Err(ConfigurationError::NoOperators)));
    }

    #[test]
    fn duplicate_operator_is_rejected() {
        let result = SosContext::builder(ServiceConfig::default(), codecs())
            .operator(EchoOperator::arc("SOS", "2.0.0", "GetObservation"))
            .operator(EchoOperator::arc("SOS", "2.0.0", "GetObservation"))
            .build();
        assert!(matches!(
            result,
            Err(ConfigurationError::DuplicateOperator { .. })
        ));
    }

    #[test]
    fn reload_and_settings_reach_configuration_listeners() {
        let recorder = Arc::new(Recorder::default());
        let context = SosContext::builder(ServiceConfig::default(), codecs())
            .listener(recorder.clone())
            .build()
            .unwrap();

        let event = context.reload_codecs().unwrap();
        assert_eq!(event, CodecReloadEvent { decoders: 2, encoders: 1 });
        context.setting_changed("validate_soap_action", Some("false".into()), Some("true".into()));

        assert_eq!(
            *recorder.seen.lock(),
            vec!["CodecReloadEvent", "SettingsChangeEvent"]
        );
    }

    #[tokio::test]
    async fn capabilities_are_served_over_kvp() {
        let context = SosContext::builder(ServiceConfig::default(), codecs())
            .operator(EchoOperator::arc("SOS", "2.0.0", "GetObservation"))
            .build()
            .unwrap();
        let binding = context.binding("KVP").unwrap();
        let response = binding
            .handle_get(
                context.dispatch(),
                TransportRequest::get("service=SOS&request=GetCapabilities"),
            )
            .await;
        assert_eq!(response.status, http::StatusCode::OK);
        let body = response.body_text();
        assert!(body.contains("sos:Capabilities"));
        assert!(body.contains(r#"<ows:Operation name="GetCapabilities">"#));
        assert!(body.contains(r#"<ows:Operation name="GetObservation">"#));
    }

    #[tokio::test]
    async fn blank_service_parameter_takes_the_default() {
        let context = SosContext::builder(ServiceConfig::default(), codecs())
            .build()
            .unwrap();
        let binding = context.binding("kvp").unwrap();
        for query in ["request=GetCapabilities", "service=&request=GetCapabilities"] {
            let response = binding
                .handle_get(context.dispatch(), TransportRequest::get(query))
                .await;
            assert_eq!(response.status, http::StatusCode::OK, "{query}");
            assert!(response.body_text().contains("sos:Capabilities"));
        }
    }
}
