//! nke-services — session registry, the sync engine, and the coordinator
//! that wires them together. Transport-agnostic: the concrete WebSocket
//! glue lives in `nke-api`.

pub mod channel;
pub mod coordinator;
pub mod error;
pub mod session;
pub mod sync_engine;

pub use channel::{Channel, TransportError};
pub use coordinator::{generate_session_id, Coordinator};
pub use error::{SessionError, SyncError};
pub use session::{Session, SyncState};
pub use sync_engine::SyncEngineConfig;
