//! Transport bindings.
//!
//! A [`Binding`] turns one wire format into a [`ServiceRequest`], runs it
//! through the dispatch pipeline, and encodes the result. Failures never
//! escape a binding: each becomes a fault document with an HTTP status.
//!
//! - [`kvp`]: query parameters over GET
//! - [`pox`]: plain XML documents over POST
//! - [`soap`]: SOAP 1.1 / 1.2 envelopes over POST

pub mod kvp;
pub mod pox;
pub mod soap;

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use sos_core::request::params;
use sos_core::xml::CONTENT_TYPE_XML;
use sos_core::{
    CodecKey, CodingRepository, DecoderInput, EncodedResponse, ExceptionReport, OperationKey,
    ServiceError, ServiceRequest, XmlDocument,
};
use tower::ServiceExt;
use tracing::{debug, error};

use crate::event::{EventBus, ExceptionEvent};
use crate::service::config::ServiceConfig;
use crate::service::middleware::{build_dispatch_pipeline, DispatchPipeline};
use crate::service::router::OperatorRouter;

pub use kvp::KvpBinding;
pub use pox::PoxBinding;
pub use soap::{SoapBinding, SoapVersion};

// ---------------------------------------------------------------------------
// Transport request / response
// ---------------------------------------------------------------------------

/// An inbound HTTP request as bindings see it.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Option<String>,
    pub body: Bytes,
}

impl TransportRequest {
    /// GET request carrying `query`.
    #[must_use]
    pub fn get(query: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            query: Some(query.into()),
            body: Bytes::new(),
        }
    }

    /// POST request with `body` of `content_type`.
    #[must_use]
    pub fn post(content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            method: Method::POST,
            headers,
            query: None,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }
}

/// What a binding sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
}

impl TransportResponse {
    #[must_use]
    pub fn new(status: StatusCode, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Carries an encoder's output; no status means 200.
    #[must_use]
    pub fn from_encoded(encoded: EncodedResponse) -> Self {
        let status = encoded.status.map_or(StatusCode::OK, status_code);
        Self::new(status, encoded.content_type, encoded.body)
    }

    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

impl IntoResponse for TransportResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

/// Maps a numeric status; out-of-range values become 500.
#[must_use]
pub fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

// ---------------------------------------------------------------------------
// Binding trait
// ---------------------------------------------------------------------------

/// One wire transport.
///
/// Both handlers always answer: a verb a binding does not serve yields a
/// `MethodNotSupported` fault with status 405.
#[async_trait]
pub trait Binding: Send + Sync + 'static {
    /// Name used in logs and exception events.
    fn name(&self) -> &'static str;

    /// Path segment the binding is mounted under.
    fn url_pattern(&self) -> &'static str;

    async fn handle_get(&self, ctx: &BindingContext, request: TransportRequest) -> TransportResponse {
        ctx.exception_response(self.name(), &method_not_supported(&request, self.name()), None)
    }

    async fn handle_post(&self, ctx: &BindingContext, request: TransportRequest) -> TransportResponse {
        ctx.exception_response(self.name(), &method_not_supported(&request, self.name()), None)
    }

    /// Fault document for a request refused before `handle_get` or
    /// `handle_post` could run.
    fn fault_response(&self, ctx: &BindingContext, error: &ServiceError) -> TransportResponse {
        ctx.exception_response(self.name(), error, None)
    }

    /// Whether `operation` can be requested with GET on this binding.
    fn supports_operation_over_get(&self, _codecs: &CodingRepository, _operation: &OperationKey) -> bool {
        false
    }

    /// Whether `operation` can be requested with POST on this binding.
    fn supports_operation_over_post(
        &self,
        _codecs: &CodingRepository,
        _operation: &OperationKey,
    ) -> bool {
        false
    }
}

#[must_use]
pub fn method_not_supported(request: &TransportRequest, binding: &'static str) -> ServiceError {
    ServiceError::MethodNotSupported {
        method: request.method.to_string(),
        binding,
    }
}

// ---------------------------------------------------------------------------
// BindingContext
// ---------------------------------------------------------------------------

/// Everything a binding needs to serve a request.
#[derive(Clone)]
pub struct BindingContext {
    pub config: Arc<ServiceConfig>,
    pub codecs: Arc<CodingRepository>,
    pub router: OperatorRouter,
    pub pipeline: DispatchPipeline,
    pub events: Arc<EventBus>,
}

impl BindingContext {
    #[must_use]
    pub fn new(
        config: Arc<ServiceConfig>,
        codecs: Arc<CodingRepository>,
        router: OperatorRouter,
        events: Arc<EventBus>,
    ) -> Self {
        let pipeline = build_dispatch_pipeline(router.clone());
        Self {
            config,
            codecs,
            router,
            pipeline,
            events,
        }
    }

    /// Rejects an unsupported service, or an unsupported version of a
    /// supported one, before anything is decoded.
    ///
    /// # Errors
    ///
    /// [`ServiceError::InvalidService`] or [`ServiceError::VersionNotSupported`].
    pub fn check_service_version(
        &self,
        service: Option<&str>,
        version: Option<&str>,
    ) -> Result<(), ServiceError> {
        let Some(service) = service else {
            return Ok(());
        };
        if !self.router.is_service_supported(service) {
            return Err(ServiceError::InvalidService {
                service: service.to_string(),
            });
        }
        match version {
            Some(version) if !self.router.is_version_supported(service, version) => {
                Err(ServiceError::VersionNotSupported {
                    version: version.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Decodes an XML request keyed by its root element.
    ///
    /// `service` and `version` root attributes are checked first. Once
    /// decoded, every problem with the request's service and version is
    /// reported together.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NoDecoderForKey`] when no decoder accepts the root
    /// element; decoder errors pass through unchanged.
    pub fn decode_xml(&self, doc: &XmlDocument) -> Result<ServiceRequest, ServiceError> {
        self.check_service_version(
            doc.attribute(params::SERVICE),
            doc.attribute(params::VERSION),
        )?;
        let key = CodecKey::element(doc.root_namespace().unwrap_or_default(), doc.root_name());
        let decoder = self
            .codecs
            .resolve_decoder(&key)
            .map_err(|miss| ServiceError::NoDecoderForKey { key: miss.key })?;
        debug!(%key, decoder = decoder.name(), "decoding XML request");
        let request = decoder.decode(DecoderInput::Xml(doc))?;
        self.validate_decoded(&request)?;
        Ok(request)
    }

    /// Checks service and version of a decoded request, collecting every
    /// problem into one report.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Report`] listing each problem.
    pub fn validate_decoded(&self, request: &ServiceRequest) -> Result<(), ServiceError> {
        let mut report = ExceptionReport::new();
        let service_known = if request.service.is_empty() {
            report.merge(ServiceError::missing(params::SERVICE).to_report());
            false
        } else if self.router.is_service_supported(&request.service) {
            true
        } else {
            report.merge(
                ServiceError::InvalidService {
                    service: request.service.clone(),
                }
                .to_report(),
            );
            false
        };
        match request.version.as_deref() {
            Some(version)
                if service_known && !self.router.is_version_supported(&request.service, version) =>
            {
                report.merge(
                    ServiceError::VersionNotSupported {
                        version: version.to_string(),
                    }
                    .to_report(),
                );
            }
            None if !request.is_capabilities() => {
                report.merge(ServiceError::missing(params::VERSION).to_report());
            }
            _ => {}
        }
        if report.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Report(report))
        }
    }

    /// Negotiates, dispatches and encodes a decoded request.
    ///
    /// # Errors
    ///
    /// Negotiation and operator errors pass through;
    /// [`ServiceError::NoEncoderForKey`] when nothing can render the
    /// response.
    pub async fn execute(&self, mut request: ServiceRequest) -> Result<EncodedResponse, ServiceError> {
        self.router.negotiate_version(&mut request)?;
        let response = self.pipeline.clone().oneshot(request).await?;
        let key = response.encoder_key();
        let encoder = self
            .codecs
            .resolve_encoder(&key)
            .map_err(|miss| ServiceError::NoEncoderForKey { key: miss.key })?;
        debug!(%key, encoder = encoder.name(), "encoding response");
        let mut encoded = encoder.encode(&response)?;
        if encoded.status.is_none() {
            encoded.status = response.status;
        }
        Ok(encoded)
    }

    /// Version to stamp on a fault document.
    ///
    /// A supported requested version is echoed; otherwise the highest
    /// version of the default service, then the configured fallback.
    #[must_use]
    pub fn fault_version(&self, requested: Option<&str>) -> String {
        let service = self.config.default_service.as_str();
        if let Some(version) = requested {
            if self.router.is_version_supported(service, version) {
                return version.to_string();
            }
        }
        self.router
            .highest_version(service)
            .unwrap_or(self.config.fallback_version.as_str())
            .to_string()
    }

    /// Logs `error`, announces it on the event bus and returns its report.
    pub fn report_failure(&self, binding: &'static str, error: &ServiceError) -> ExceptionReport {
        let report = error.to_report();
        if error.is_client_fault() {
            debug!(binding, status = report.status(), error = %error, "request rejected");
        } else {
            error!(binding, status = report.status(), error = %error, "request failed");
        }
        self.events.fire(ExceptionEvent {
            binding,
            report: report.clone(),
        });
        report
    }

    /// OWS exception report document for `error`.
    pub fn exception_response(
        &self,
        binding: &'static str,
        error: &ServiceError,
        version: Option<&str>,
    ) -> TransportResponse {
        let report = self.report_failure(binding, error);
        let version = self.fault_version(version);
        match report.to_xml(&version) {
            Ok(document) => {
                TransportResponse::new(status_code(report.status()), CONTENT_TYPE_XML, document)
            }
            Err(e) => {
                error!(binding, error = %e, "exception report could not be rendered");
                TransportResponse::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain; charset=utf-8",
                    report.to_string(),
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// BindingRepository
// ---------------------------------------------------------------------------

/// The bindings served, looked up by URL pattern.
#[derive(Clone, Default)]
pub struct BindingRepository {
    bindings: Vec<Arc<dyn Binding>>,
}

impl BindingRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// KVP, POX and SOAP.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut repository = Self::new();
        repository.register(Arc::new(KvpBinding));
        repository.register(Arc::new(PoxBinding));
        repository.register(Arc::new(SoapBinding));
        repository
    }

    /// Adds `binding`, replacing any with the same URL pattern.
    pub fn register(&mut self, binding: Arc<dyn Binding>) {
        self.bindings
            .retain(|b| b.url_pattern() != binding.url_pattern());
        self.bindings.push(binding);
    }

    #[must_use]
    pub fn get(&self, url_pattern: &str) -> Option<Arc<dyn Binding>> {
        self.bindings
            .iter()
            .find(|b| b.url_pattern().eq_ignore_ascii_case(url_pattern))
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Binding>> {
        self.bindings.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// URL patterns of the bindings accepting `operation` over GET, then
    /// over POST, in registration order.
    #[must_use]
    pub fn endpoints(
        &self,
        codecs: &CodingRepository,
        operation: &OperationKey,
    ) -> (Vec<&'static str>, Vec<&'static str>) {
        let get = self
            .bindings
            .iter()
            .filter(|b| b.supports_operation_over_get(codecs, operation))
            .map(|b| b.url_pattern())
            .collect();
        let post = self
            .bindings
            .iter()
            .filter(|b| b.supports_operation_over_post(codecs, operation))
            .map(|b| b.url_pattern())
            .collect();
        (get, post)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
