use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::security::rate_limit::RateLimitPolicy;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub tracked_clients: usize,
}

#[derive(Serialize)]
pub struct ClientSummary {
    pub tracked_clients: usize,
    pub policy: RateLimitPolicy,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let snapshot = state.snapshot();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if snapshot.config.maintenance.enabled {
            "maintenance"
        } else {
            "operational"
        },
        uptime_secs: state.started_at.elapsed().as_secs(),
        tracked_clients: state.limiter.tracked_clients(),
    })
}

pub async fn get_clients(State(state): State<AppState>) -> Json<ClientSummary> {
    Json(ClientSummary {
        tracked_clients: state.limiter.tracked_clients(),
        policy: state.limiter.policy().as_ref().clone(),
    })
}
