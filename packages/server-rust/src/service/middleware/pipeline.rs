//! Pipeline composition: wraps the router in the dispatch middleware.

use tower::ServiceBuilder;

use super::metrics::{MetricsLayer, MetricsService};
use crate::service::router::OperatorRouter;

/// The service bindings dispatch through.
pub type DispatchPipeline = MetricsService<OperatorRouter>;

/// Build the dispatch pipeline around `router`.
///
/// Timeouts and body limits belong to the HTTP layers.
#[must_use]
pub fn build_dispatch_pipeline(router: OperatorRouter) -> DispatchPipeline {
    ServiceBuilder::new().layer(MetricsLayer).service(router)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use sos_core::ServiceRequest;
    use tower::ServiceExt;

    use super::*;
    use crate::service::registry::OperatorRegistry;
    use crate::testing::EchoOperator;

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let mut registry = OperatorRegistry::new();
        registry
            .register(EchoOperator::arc("SOS", "2.0.0", "GetObservation"))
            .unwrap();
        let pipeline = build_dispatch_pipeline(OperatorRouter::new(registry).unwrap());

        let response = pipeline
            .clone()
            .oneshot(ServiceRequest::new(
                "SOS",
                Some("2.0.0".into()),
                "GetObservation",
            ))
            .await
            .unwrap();
        assert_eq!(response.operation, "GetObservation");
    }
}
