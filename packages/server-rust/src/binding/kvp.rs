//! Key-value-pair binding: `?service=SOS&version=2.0.0&request=...`.

use async_trait::async_trait;
use sos_core::request::{operation_names, params};
use sos_core::{
    CodecKey, CodingRepository, DecoderInput, EncodedResponse, Encoding, OperationKey,
    ParameterMap, ServiceError,
};
use tracing::debug;

use super::{Binding, BindingContext, TransportRequest, TransportResponse};

const NAME: &str = "KVP";

/// Serves GET requests whose query string names the operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct KvpBinding;

impl KvpBinding {
    async fn process(
        ctx: &BindingContext,
        mut parameters: ParameterMap,
    ) -> Result<EncodedResponse, ServiceError> {
        if parameters.is_empty() {
            return Err(ServiceError::missing(params::REQUEST));
        }
        let operation = parameters
            .get(params::REQUEST)
            .ok_or_else(|| ServiceError::missing(params::REQUEST))?
            .to_string();
        let capabilities = operation == operation_names::GET_CAPABILITIES;

        let service = match parameters.get(params::SERVICE) {
            Some(service) => service.to_string(),
            None if capabilities => {
                let service = ctx.config.default_service.clone();
                parameters.set(params::SERVICE, service.clone());
                service
            }
            None => return Err(ServiceError::missing(params::SERVICE)),
        };
        let version = parameters.get(params::VERSION).map(str::to_string);
        if version.is_none() && !capabilities {
            ctx.check_service_version(Some(&service), None)?;
            return Err(ServiceError::missing(params::VERSION));
        }
        ctx.check_service_version(Some(&service), version.as_deref())?;

        let key = CodecKey::operation(
            Encoding::Kvp,
            OperationKey {
                service: Some(service),
                version,
                operation: Some(operation),
            },
        );
        let decoder = ctx
            .codecs
            .resolve_decoder(&key)
            .map_err(|miss| ServiceError::NoDecoderForKey { key: miss.key })?;
        debug!(%key, decoder = decoder.name(), "decoding KVP request");
        let request = decoder.decode(DecoderInput::Kvp(&parameters))?;
        ctx.execute(request).await
    }
}

#[async_trait]
impl Binding for KvpBinding {
    fn name(&self) -> &'static str {
        NAME
    }

    fn url_pattern(&self) -> &'static str {
        "kvp"
    }

    async fn handle_get(&self, ctx: &BindingContext, request: TransportRequest) -> TransportResponse {
        let parameters = ParameterMap::from_query(request.query.as_deref().unwrap_or_default());
        let version = parameters.get(params::VERSION).map(str::to_string);
        match Self::process(ctx, parameters).await {
            Ok(encoded) => TransportResponse::from_encoded(encoded),
            Err(e) => ctx.exception_response(NAME, &e, version.as_deref()),
        }
    }

    fn supports_operation_over_get(&self, codecs: &CodingRepository, operation: &OperationKey) -> bool {
        codecs.supports(Encoding::Kvp, operation)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
