//! /health — liveness and coarse capacity check.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
    pub timestamp: String,
}

pub async fn handle_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        active_sessions: state.coordinator.active_session_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
