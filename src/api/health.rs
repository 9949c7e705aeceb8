use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use crate::api::AppState;
use crate::reporting::{ChannelTarget, TickRecord};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub target_channel: Option<ChannelTarget>,
    pub interval_secs: u64,
    pub last_tick: Option<TickRecord>,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn reporting_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let config = state.reporting.config();
    Json(StatusResponse {
        target_channel: config.target,
        interval_secs: config.interval.secs(),
        last_tick: state.reporting.last_tick(),
    })
}
