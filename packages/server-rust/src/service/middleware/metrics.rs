//! Metrics middleware for dispatch.
//!
//! Wraps every dispatched request in a `tracing` span and records counters
//! and a duration histogram through the `metrics` facade.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use sos_core::{ServiceError, ServiceRequest, ServiceResponse};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments dispatch with timing and counting.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records dispatch duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<ServiceRequest> for MetricsService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse, Error = ServiceError> + Send,
    S::Future: Send + 'static,
{
    type Response = ServiceResponse;
    type Error = ServiceError;
    type Future = Pin<Box<dyn Future<Output = Result<ServiceResponse, ServiceError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: ServiceRequest) -> Self::Future {
        let service = request.service.clone();
        let version = request.version.clone().unwrap_or_default();
        let operation = request.operation.clone();

        let span = info_span!(
            "dispatch",
            service = %service,
            version = %version,
            operation = %operation,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(request);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(e) if e.is_client_fault() => "rejected",
                    Err(_) => "error",
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                let labels = [
                    ("service", service),
                    ("version", version),
                    ("operation", operation),
                ];
                metrics::counter!("sos_operations_total", &labels).increment(1);
                metrics::histogram!("sos_operation_duration_seconds", &labels)
                    .record(elapsed.as_secs_f64());
                if let Err(e) = &result {
                    metrics::counter!("sos_operation_errors_total", &labels).increment(1);
                    tracing::debug!(error = %e, outcome, "dispatch failed");
                } else {
                    tracing::debug!(duration_ms, "dispatch complete");
                }

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
