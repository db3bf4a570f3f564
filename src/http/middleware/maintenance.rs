//! Maintenance gate.
//! Refuses drive traffic with 503 while maintenance mode is on; admin callers pass.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::admin::auth::is_admin;
use crate::gatekeeper::GateError;
use crate::http::server::AppState;

pub async fn maintenance_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let snapshot = state.snapshot();
    if !snapshot.config.maintenance.enabled {
        return next.run(request).await;
    }

    if is_admin(request.headers(), &snapshot.config.admin) {
        tracing::debug!(path = %request.uri().path(), "Admin request passed maintenance gate");
        return next.run(request).await;
    }

    GateError::Maintenance.into_response()
}
