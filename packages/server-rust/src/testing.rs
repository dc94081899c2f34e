//! Operators and codecs shared by unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use sos_core::codec::{Codec, Decoder, DecoderInput, Encoder};
use sos_core::request::SERVICE_RESPONSE;
use sos_core::{
    CodecKey, CodingRepository, EncodedResponse, ServiceError, ServiceRequest, ServiceResponse,
    TypeTag,
};

use crate::binding::BindingContext;
use crate::event::EventBus;
use crate::service::config::ServiceConfig;
use crate::service::operation::{RequestOperator, RequestOperatorKey};
use crate::service::registry::OperatorRegistry;
use crate::service::router::OperatorRouter;

pub const TEST_NS: &str = "http://www.opengis.net/sos/2.0";

pub static ECHO_RESPONSE: TypeTag = TypeTag::new("EchoResponse", &[&SERVICE_RESPONSE]);

/// Returns the request's identity as the response payload.
pub struct EchoOperator {
    key: RequestOperatorKey,
}

impl EchoOperator {
    pub fn arc(service: &str, version: &str, operation: &str) -> Arc<Self> {
        Arc::new(Self {
            key: RequestOperatorKey::new(service, version, operation),
        })
    }
}

#[async_trait]
impl RequestOperator for EchoOperator {
    fn key(&self) -> RequestOperatorKey {
        self.key.clone()
    }

    async fn receive_request(
        &self,
        request: ServiceRequest,
    ) -> Result<ServiceResponse, ServiceError> {
        Ok(ServiceResponse {
            service: request.service.clone(),
            version: request.version.clone().unwrap_or_default(),
            operation: request.operation.clone(),
            namespace: TEST_NS.to_string(),
            response_type: &ECHO_RESPONSE,
            content_type: "application/xml".to_string(),
            payload: serde_json::to_value(&request).unwrap_or_default(),
            status: None,
        })
    }
}

/// Always fails with a located decode error.
pub struct FailingOperator {
    key: RequestOperatorKey,
}

impl FailingOperator {
    pub fn new(service: &str, version: &str, operation: &str) -> Self {
        Self {
            key: RequestOperatorKey::new(service, version, operation),
        }
    }
}

#[async_trait]
impl RequestOperator for FailingOperator {
    fn key(&self) -> RequestOperatorKey {
        self.key.clone()
    }

    async fn receive_request(
        &self,
        _request: ServiceRequest,
    ) -> Result<ServiceResponse, ServiceError> {
        Err(ServiceError::decode_at("procedure", "unknown procedure"))
    }
}

/// Decodes KVP or XML input into a request for a fixed triple.
pub struct StaticDecoder {
    keys: Vec<CodecKey>,
    service: String,
    version: String,
    operation: String,
}

impl StaticDecoder {
    pub fn arc(keys: Vec<CodecKey>, version: &str, operation: &str) -> Arc<Self> {
        Arc::new(Self {
            keys,
            service: "SOS".to_string(),
            version: version.to_string(),
            operation: operation.to_string(),
        })
    }
}

impl Codec for StaticDecoder {
    fn keys(&self) -> Vec<CodecKey> {
        self.keys.clone()
    }
}

impl Decoder for StaticDecoder {
    fn decode(&self, input: DecoderInput<'_>) -> Result<ServiceRequest, ServiceError> {
        let version = match input {
            DecoderInput::Kvp(params) => params.get("version").map(str::to_string),
            DecoderInput::Xml(doc) => doc.attribute("version").map(str::to_string),
        }
        .or_else(|| Some(self.version.clone()));
        Ok(ServiceRequest::new(
            self.service.clone(),
            version,
            self.operation.clone(),
        ))
    }
}

/// Renders any response as `<echo operation=".."/>`.
pub struct EchoEncoder;

impl Codec for EchoEncoder {
    fn keys(&self) -> Vec<CodecKey> {
        vec![CodecKey::xml_type(TEST_NS, &SERVICE_RESPONSE)]
    }
}

impl Encoder for EchoEncoder {
    fn encode(&self, response: &ServiceResponse) -> Result<EncodedResponse, ServiceError> {
        Ok(EncodedResponse::xml(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<echo xmlns="{TEST_NS}" operation="{}" version="{}"/>"#,
            response.operation, response.version
        )))
    }
}

/// Binding context over `decoders`, `operators` and an [`EchoEncoder`].
pub fn binding_context(
    decoders: Vec<Arc<dyn Decoder>>,
    operators: Vec<Arc<dyn RequestOperator>>,
) -> BindingContext {
    binding_context_with(ServiceConfig::default(), decoders, operators)
}

pub fn binding_context_with(
    config: ServiceConfig,
    decoders: Vec<Arc<dyn Decoder>>,
    operators: Vec<Arc<dyn RequestOperator>>,
) -> BindingContext {
    let codecs = CodingRepository::new(config.codec_tie_break);
    for decoder in decoders {
        codecs.register_decoder(decoder).unwrap();
    }
    codecs.register_encoder(Arc::new(EchoEncoder)).unwrap();

    let mut registry = OperatorRegistry::new();
    for operator in operators {
        registry.register(operator).unwrap();
    }
    let events = Arc::new(EventBus::new(config.event_delivery));
    BindingContext::new(
        Arc::new(config),
        Arc::new(codecs),
        OperatorRouter::new(registry).unwrap(),
        events,
    )
}
