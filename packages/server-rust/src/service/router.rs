//! Operator routing: dispatches decoded requests by service, version and
//! operation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use sos_core::{ConfigurationError, ServiceError, ServiceRequest, ServiceResponse};
use tower::Service;
use tracing::debug;

use super::registry::{OperatorRegistry, ServiceOperator};

type DispatchFuture = Pin<Box<dyn Future<Output = Result<ServiceResponse, ServiceError>> + Send>>;

// ---------------------------------------------------------------------------
// OperatorRouter
// ---------------------------------------------------------------------------

/// Routes [`ServiceRequest`] values to the request operator registered for
/// their `(service, version, operation)` triple.
///
/// Cloning is cheap; all clones share one immutable [`OperatorRegistry`].
/// A request whose triple has no operator fails with
/// [`ServiceError::OperationNotSupported`].
#[derive(Clone)]
pub struct OperatorRouter {
    registry: Arc<OperatorRegistry>,
}

impl OperatorRouter {
    /// Freezes `registry` into a router.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::NoOperators`] if `registry` is empty.
    pub fn new(registry: OperatorRegistry) -> Result<Self, ConfigurationError> {
        if registry.is_empty() {
            return Err(ConfigurationError::NoOperators);
        }
        Ok(Self {
            registry: Arc::new(registry),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    #[must_use]
    pub fn get_service_operator(&self, service: &str, version: &str) -> Option<&ServiceOperator> {
        self.registry.get_service_operator(service, version)
    }

    #[must_use]
    pub fn is_service_supported(&self, service: &str) -> bool {
        self.registry.is_service_supported(service)
    }

    #[must_use]
    pub fn is_version_supported(&self, service: &str, version: &str) -> bool {
        self.registry.is_version_supported(service, version)
    }

    /// Highest supported version of `service`.
    #[must_use]
    pub fn highest_version(&self, service: &str) -> Option<&str> {
        self.registry
            .supported_versions(service)
            .first()
            .map(String::as_str)
    }

    /// Fills in the version of a capabilities request that has none.
    ///
    /// The first accepted version the service supports wins; without
    /// accepted versions the highest supported version is used.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::VersionNegotiationFailed`] if none of the
    /// accepted versions is supported, or [`ServiceError::InvalidService`]
    /// if the service has no versions at all.
    pub fn negotiate_version(&self, request: &mut ServiceRequest) -> Result<(), ServiceError> {
        if request.version.is_some() || !request.is_capabilities() {
            return Ok(());
        }
        let version = if request.accept_versions.is_empty() {
            self.highest_version(&request.service)
                .map(str::to_string)
                .ok_or_else(|| ServiceError::InvalidService {
                    service: request.service.clone(),
                })?
        } else {
            request
                .accept_versions
                .iter()
                .find(|v| self.is_version_supported(&request.service, v))
                .cloned()
                .ok_or_else(|| ServiceError::VersionNegotiationFailed {
                    accept_versions: request.accept_versions.clone(),
                })?
        };
        debug!(service = %request.service, %version, "negotiated capabilities version");
        request.version = Some(version);
        Ok(())
    }

    /// Executes `request` on its operator.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::OperationNotSupported`] when no operator
    /// matches; operator failures are passed through unchanged.
    pub async fn dispatch(&self, request: ServiceRequest) -> Result<ServiceResponse, ServiceError> {
        let operator = request
            .version
            .as_deref()
            .and_then(|version| self.get_service_operator(&request.service, version))
            .and_then(|service_operator| service_operator.request_operator(&request.operation));
        match operator {
            Some(operator) => operator.receive_request(request).await,
            None => Err(ServiceError::OperationNotSupported {
                operation: request.operation,
            }),
        }
    }
}

impl Service<ServiceRequest> for OperatorRouter {
    type Response = ServiceResponse;
    type Error = ServiceError;
    type Future = DispatchFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Lookups are in-memory; operators apply their own backpressure.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ServiceRequest) -> Self::Future {
        let router = self.clone();
        Box::pin(async move { router.dispatch(request).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
