//! Daemon-level status commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
    active_sessions: usize,
    timestamp: String,
}

pub async fn cmd_health(port: u16) -> Result<()> {
    let resp: HealthResponse = get_json(&format!("{}/health", base_url(port))).await?;
    println!("Status          : {}", resp.status);
    println!("Active sessions : {}", resp.active_sessions);
    println!("Timestamp       : {}", resp.timestamp);
    Ok(())
}
