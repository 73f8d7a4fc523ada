//! /sessions handlers — create and inspect synchronization sessions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use nke_core::frame::TpmConfig;
use nke_core::tpm::{MAX_K, MAX_L, MAX_N};
use nke_services::coordinator::generate_session_id;
use serde::{Deserialize, Serialize};

use super::ApiState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SessionCreateRequest {
    pub tpm_k: Option<usize>,
    pub tpm_n: Option<usize>,
    pub tpm_l: Option<i32>,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub created_at: String,
    pub participant_count: usize,
    pub is_synced: bool,
    pub tpm_config: TpmConfig,
}

/// `POST /sessions` — pre-create a session, returning the id both parties
/// use to connect over the WebSocket.
pub async fn handle_session_create(
    State(state): State<ApiState>,
    body: Option<Json<SessionCreateRequest>>,
) -> Result<Json<SessionResponse>, (StatusCode, String)> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let defaults = state.config.tpm_defaults;
    let tpm_config = TpmConfig {
        k: req.tpm_k.unwrap_or(defaults.k),
        n: req.tpm_n.unwrap_or(defaults.n),
        l: req.tpm_l.unwrap_or(defaults.l),
    };

    if !(1..=MAX_K).contains(&tpm_config.k) {
        return Err((StatusCode::BAD_REQUEST, format!("tpm_k must be in 1..={MAX_K}, got {}", tpm_config.k)));
    }
    if !(1..=MAX_N).contains(&tpm_config.n) {
        return Err((StatusCode::BAD_REQUEST, format!("tpm_n must be in 1..={MAX_N}, got {}", tpm_config.n)));
    }
    if !(1..=MAX_L).contains(&tpm_config.l) {
        return Err((StatusCode::BAD_REQUEST, format!("tpm_l must be in 1..={MAX_L}, got {}", tpm_config.l)));
    }

    let session_id = generate_session_id();
    let session = state.coordinator.create_session(session_id, Some(tpm_config));

    Ok(Json(SessionResponse {
        session_id: session.session_id.clone(),
        created_at: session.created_at.to_rfc3339(),
        participant_count: 0,
        is_synced: false,
        tpm_config: session.tpm_config,
    }))
}

#[derive(Serialize)]
pub struct SyncStateResponse {
    pub round: u64,
    pub is_synced: bool,
}

#[derive(Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub participants: Vec<String>,
    pub sync_state: SyncStateResponse,
    pub created_at: String,
}

/// `GET /sessions/{id}` — current participants and sync round.
pub async fn handle_session_inspect(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatusResponse>, (StatusCode, String)> {
    let session = state
        .coordinator
        .session(&session_id)
        .ok_or((StatusCode::NOT_FOUND, "session not found".to_string()))?;

    let participants = session.participant_ids().await;
    let sync_state = {
        let guard = session.state().await;
        SyncStateResponse {
            round: guard.sync_round,
            is_synced: guard.is_synced,
        }
    };

    Ok(Json(SessionStatusResponse {
        session_id: session.session_id.clone(),
        participants,
        sync_state,
        created_at: session.created_at.to_rfc3339(),
    }))
}
