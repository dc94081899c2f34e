//! Health, liveness and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Health state plus what the dispatch core has loaded.
///
/// Always 200; `state` tells a draining server from a healthy one.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let context = &state.context;
    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "operators": context.router().registry().len(),
        "decoders": context.codecs().decoders().len(),
        "encoders": context.codecs().encoders().len(),
        "listeners": context.events().listener_count(),
    }))
}

/// Liveness only says the process answers.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// 200 while `Ready`, 503 before startup completes and once draining.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use sos_core::{CodingRepository, TieBreak};

    use super::*;
    use crate::context::SosContext;
    use crate::network::ShutdownController;
    use crate::service::config::ServiceConfig;
    use crate::testing::EchoOperator;

    fn test_state() -> AppState {
        let context = SosContext::builder(
            ServiceConfig::default(),
            Arc::new(CodingRepository::new(TieBreak::RegistrationOrder)),
        )
        .operator(EchoOperator::arc("SOS", "2.0.0", "GetObservation"))
        .build()
        .unwrap();
        AppState {
            context,
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn health_reports_loaded_components() {
        let state = test_state();
        state.shutdown.set_ready();
        let _guard = state.shutdown.in_flight_guard();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "ready");
        assert_eq!(json["in_flight"], 1);
        // GetObservation plus the built-in GetCapabilities.
        assert_eq!(json["operators"], 2);
        assert_eq!(json["decoders"], 2);
        assert_eq!(json["encoders"], 1);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_reports_draining() {
        let state = test_state();
        state.shutdown.set_ready();
        state.shutdown.trigger_shutdown();
        assert_eq!(health_handler(State(state)).await.0["state"], "draining");
    }

    #[tokio::test]
    async fn liveness_is_unconditional() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_health_state() {
        let state = test_state();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);
        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
