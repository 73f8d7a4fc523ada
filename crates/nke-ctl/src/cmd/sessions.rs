//! Session management commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, get_json, post_json};

#[derive(Serialize, Default)]
struct CreateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    tpm_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tpm_n: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tpm_l: Option<i32>,
}

#[derive(Deserialize)]
struct TpmConfig {
    #[serde(rename = "K")]
    k: usize,
    #[serde(rename = "N")]
    n: usize,
    #[serde(rename = "L")]
    l: i32,
}

#[derive(Deserialize)]
struct CreateResponse {
    session_id: String,
    created_at: String,
    tpm_config: TpmConfig,
}

pub async fn cmd_session_create(port: u16, tpm_k: Option<usize>, tpm_n: Option<usize>, tpm_l: Option<i32>) -> Result<()> {
    let req = CreateRequest { tpm_k, tpm_n, tpm_l };
    let resp: CreateResponse = post_json(&format!("{}/sessions", base_url(port)), &req).await?;

    println!("Session created : {}", resp.session_id);
    println!("Created at      : {}", resp.created_at);
    println!(
        "TPM config      : K={} N={} L={}",
        resp.tpm_config.k, resp.tpm_config.n, resp.tpm_config.l
    );
    Ok(())
}

#[derive(Deserialize)]
struct SyncStateResponse {
    round: u64,
    is_synced: bool,
}

#[derive(Deserialize)]
struct InspectResponse {
    session_id: String,
    participants: Vec<String>,
    sync_state: SyncStateResponse,
    created_at: String,
}

pub async fn cmd_session_inspect(port: u16, session_id: &str) -> Result<()> {
    let resp: InspectResponse = get_json(&format!("{}/sessions/{}", base_url(port), session_id)).await?;

    println!("═══════════════════════════════════════");
    println!("  Session Details");
    println!("═══════════════════════════════════════");
    println!("  ID           : {}", resp.session_id);
    println!("  Created at   : {}", resp.created_at);
    println!("  Participants : {}", resp.participants.join(", "));
    println!("  Sync round   : {}", resp.sync_state.round);
    println!("  Synced       : {}", resp.sync_state.is_synced);

    Ok(())
}
