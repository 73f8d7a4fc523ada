//! HTTP/WebSocket handlers — exposes the coordinator as a JSON API.

pub mod health;
pub mod sessions;

use std::sync::Arc;

use nke_core::NkeConfig;
use nke_services::Coordinator;

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
    pub config: NkeConfig,
}

pub use health::handle_health;
pub use sessions::{handle_session_create, handle_session_inspect};
