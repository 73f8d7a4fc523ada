//! WebSocket glue: `/ws/{session_id}/{user_id}` upgrades the connection,
//! wraps the socket halves in a [`Channel`], and runs the receive loop that
//! drives `message`/`request_sync`/`ping` from the client — the same shape
//! as the reference server's `websocket_endpoint`, including the idle
//! keepalive ping.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use nke_core::frame::TpmConfig;
use nke_core::Frame;
use nke_services::channel::{Channel, TransportError};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::handlers::ApiState;

#[derive(Debug, Deserialize)]
pub struct TpmQuery {
    #[serde(default = "default_k")]
    pub tpm_k: usize,
    #[serde(default = "default_n")]
    pub tpm_n: usize,
    #[serde(default = "default_l")]
    pub tpm_l: i32,
}

fn default_k() -> usize {
    3
}
fn default_n() -> usize {
    4
}
fn default_l() -> i32 {
    3
}

/// A live WebSocket wrapped as a [`Channel`]. Both halves are behind their
/// own mutex so `send`/`recv`/`close` can all take `&self` and the same
/// `Arc<WsChannel>` can be registered with the session and driven by its
/// own receive loop at once.
pub struct WsChannel {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
}

impl WsChannel {
    pub fn new(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

#[async_trait]
impl Channel for WsChannel {
    async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        let text = serde_json::to_string(frame).map_err(|e| TransportError::Send(e.to_string()))?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&self) -> Result<Option<Frame>, TransportError> {
        loop {
            let next = self.stream.lock().await.next().await;
            match next {
                None => return Ok(None),
                Some(Err(e)) => return Err(TransportError::Recv(e.to_string())),
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Text(text))) => {
                    let frame = serde_json::from_str(&text).map_err(|e| TransportError::Recv(e.to_string()))?;
                    return Ok(Some(frame));
                }
                // Binary/Ping/Pong frames carry no protocol meaning here.
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn close(&self) {
        let _ = self.sink.lock().await.send(Message::Close(None)).await;
    }
}

pub async fn handle_ws(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Path((session_id, user_id)): Path<(String, String)>,
    Query(tpm): Query<TpmQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, user_id, tpm))
}

async fn handle_socket(socket: WebSocket, state: ApiState, session_id: String, user_id: String, tpm: TpmQuery) {
    let channel = Arc::new(WsChannel::new(socket));
    let tpm_config = TpmConfig {
        k: tpm.tpm_k,
        n: tpm.tpm_n,
        l: tpm.tpm_l,
    };

    if state
        .coordinator
        .connect(&session_id, &user_id, channel.clone(), tpm_config)
        .await
        .is_err()
    {
        channel.close().await;
        return;
    }

    let idle_timeout = Duration::from_secs(state.config.sync.idle_timeout_secs);

    loop {
        match tokio::time::timeout(idle_timeout, channel.recv()).await {
            Ok(Ok(Some(frame))) => {
                if !handle_client_frame(&state, &session_id, &user_id, frame).await {
                    break;
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(err)) => {
                tracing::debug!(session_id = %session_id, %user_id, error = %err, "receive error");
                break;
            }
            Err(_elapsed) => {
                if channel.send(&Frame::Ping {}).await.is_err() {
                    break;
                }
            }
        }
    }

    state.coordinator.disconnect(&session_id, &user_id).await;
    channel.close().await;
}

/// Handle one client-originated frame. Returns `false` to terminate the
/// connection.
async fn handle_client_frame(state: &ApiState, session_id: &str, user_id: &str, frame: Frame) -> bool {
    match frame {
        Frame::Message { ciphertext, .. } => {
            state.coordinator.relay_message(session_id, user_id, ciphertext).await;
            true
        }
        Frame::RequestSync {} => {
            state.coordinator.request_sync(session_id);
            true
        }
        Frame::Ping {} => {
            if let Some(session) = state.coordinator.session(session_id) {
                let _ = session.send_to(user_id, &Frame::Pong {}).await;
            }
            true
        }
        _ => true,
    }
}
