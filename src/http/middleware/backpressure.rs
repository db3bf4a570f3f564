//! In-flight request bound.
//! Requests wait for a slot once `listener.max_connections` are being served.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::gatekeeper::GateError;
use crate::http::server::AppState;

pub async fn backpressure_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // Acquire permit first (backpressure)
    let _permit = match state.in_flight.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return GateError::Maintenance.into_response(),
    };

    tracing::trace!(
        available_permits = state.in_flight.available_permits(),
        "Request slot acquired"
    );
    next.run(request).await
}
