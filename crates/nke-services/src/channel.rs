//! Abstract transport channel.
//!
//! The coordinator and sync engine only ever talk to a `Channel`; the
//! concrete WebSocket implementation lives in `nke-api` (thin glue, per the
//! system's component design) and tests use an in-memory implementation
//! over `tokio::sync::mpsc`.

use async_trait::async_trait;
use nke_core::Frame;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel closed")]
    Closed,
    #[error("send failed: {0}")]
    Send(String),
    #[error("recv failed: {0}")]
    Recv(String),
}

/// A bidirectional, per-`(session_id, user_id)` frame channel. `recv` takes
/// `&self`, not `&mut self`: every real implementation (WebSocket sink/stream,
/// in-memory mpsc) is shared as an `Arc<dyn Channel>` between the
/// coordinator and the connection's own receive loop, so any mutable state
/// lives behind interior mutability regardless of the method signature.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn send(&self, frame: &Frame) -> Result<(), TransportError>;
    async fn recv(&self) -> Result<Option<Frame>, TransportError>;
    async fn close(&self);
}
