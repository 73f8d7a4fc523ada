//! Test-only `Channel`: records every frame sent to a participant on one
//! queue and lets the test feed client-originated frames in on another,
//! standing in for the WebSocket used in production.

use async_trait::async_trait;
use nke_core::Frame;
use nke_services::channel::{Channel, TransportError};
use tokio::sync::{mpsc, Mutex};

pub struct TestChannel {
    outbox: mpsc::UnboundedSender<Frame>,
    inbox: Mutex<mpsc::UnboundedReceiver<Frame>>,
}

#[async_trait]
impl Channel for TestChannel {
    async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        self.outbox
            .send(frame.clone())
            .map_err(|_| TransportError::Send("test receiver dropped".into()))
    }

    async fn recv(&self) -> Result<Option<Frame>, TransportError> {
        Ok(self.inbox.lock().await.recv().await)
    }

    async fn close(&self) {}
}

/// Build a `TestChannel` plus the two halves a test uses to drive it: a
/// receiver for frames broadcast to this participant, and a sender for
/// frames this participant "sends" to the server.
pub fn test_channel() -> (std::sync::Arc<TestChannel>, mpsc::UnboundedReceiver<Frame>, mpsc::UnboundedSender<Frame>) {
    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let channel = std::sync::Arc::new(TestChannel {
        outbox: outbox_tx,
        inbox: Mutex::new(inbox_rx),
    });
    (channel, outbox_rx, inbox_tx)
}

/// Drain `rx` until `predicate` matches a frame or the channel closes,
/// returning the matching frame.
pub async fn recv_until(rx: &mut mpsc::UnboundedReceiver<Frame>, predicate: impl Fn(&Frame) -> bool) -> Option<Frame> {
    while let Some(frame) = rx.recv().await {
        if predicate(&frame) {
            return Some(frame);
        }
    }
    None
}
