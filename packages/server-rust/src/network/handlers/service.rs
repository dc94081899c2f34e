//! `/service/{binding}`: hands the raw request to the named binding.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use sos_core::ServiceError;
use tracing::debug;

use super::AppState;
use crate::binding::{method_not_supported, TransportRequest};

/// GET and POST go to the binding; other verbs get a 405 fault document.
/// A body the transport refuses, such as one over the size limit, is
/// answered with the binding's fault document and the rejection's status.
pub async fn binding_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let Some(binding) = state.context.binding(&name) else {
        debug!(binding = %name, "no binding mounted");
        return (StatusCode::NOT_FOUND, format!("no binding at /service/{name}")).into_response();
    };
    let ctx = state.context.dispatch();
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(binding = %name, %rejection, "request body refused");
            let error = ServiceError::RequestBody {
                status: rejection.status().as_u16(),
                message: rejection.body_text(),
            };
            return binding.fault_response(ctx, &error).into_response();
        }
    };
    let request = TransportRequest {
        method,
        headers,
        query,
        body,
    };
    let response = if request.method == Method::GET {
        binding.handle_get(ctx, request).await
    } else if request.method == Method::POST {
        binding.handle_post(ctx, request).await
    } else {
        binding.fault_response(ctx, &method_not_supported(&request, binding.name()))
    };
    response.into_response()
}
