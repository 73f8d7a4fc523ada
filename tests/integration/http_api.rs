//! End-to-end check of the HTTP surface: `serve_with_listener` on an
//! ephemeral port, then drive `/health` and `/sessions` with a real client.

use std::sync::Arc;

use nke_api::ApiState;
use nke_core::NkeConfig;
use nke_services::Coordinator;
use serde_json::{json, Value};

async fn spawn_server() -> (String, tokio::task::JoinHandle<()>) {
    let config = NkeConfig::default();
    let coordinator = Arc::new(Coordinator::new(&config));
    let state = ApiState { coordinator, config };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let _ = nke_api::serve_with_listener(state, listener).await;
    });

    (format!("http://{}", addr), handle)
}

#[tokio::test]
async fn health_endpoint_reports_no_active_sessions_on_a_fresh_server() {
    let (base_url, server) = spawn_server().await;

    let resp: Value = reqwest::get(format!("{base_url}/health")).await.unwrap().json().await.unwrap();
    assert_eq!(resp["status"], "healthy");
    assert_eq!(resp["active_sessions"], 0);

    server.abort();
}

#[tokio::test]
async fn create_session_then_inspect_round_trips_over_http() {
    let (base_url, server) = spawn_server().await;

    let created: Value = reqwest::Client::new()
        .post(format!("{base_url}/sessions"))
        .json(&json!({ "tpm_k": 3, "tpm_n": 4, "tpm_l": 3 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let session_id = created["session_id"].as_str().unwrap().to_string();
    assert_eq!(created["participant_count"], 0);
    assert_eq!(created["is_synced"], false);
    assert_eq!(created["tpm_config"]["K"], 3);

    let inspected: Value = reqwest::get(format!("{base_url}/sessions/{session_id}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(inspected["session_id"], session_id);
    assert_eq!(inspected["participants"], json!([]));
    assert_eq!(inspected["sync_state"]["is_synced"], false);

    server.abort();
}

#[tokio::test]
async fn inspecting_an_unknown_session_returns_404() {
    let (base_url, server) = spawn_server().await;

    let resp = reqwest::get(format!("{base_url}/sessions/doesnotexist")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    server.abort();
}
