//! Wire frame catalog — the JSON objects exchanged over the transport.
//!
//! One internally-tagged enum covers both directions, the way
//! `summit_core::message::MessageContent` covers every message kind in a
//! single type: server-only variants are simply never constructed by a
//! client, and vice versa.

use serde::{Deserialize, Serialize};

use crate::tpm::LearningRule;

/// `(K, N, L)` as carried on the wire — field names are upper-case to match
/// the frame catalog's `tpm_config: {K, N, L}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpmConfig {
    #[serde(rename = "K")]
    pub k: usize,
    #[serde(rename = "N")]
    pub n: usize,
    #[serde(rename = "L")]
    pub l: i32,
}

impl Default for TpmConfig {
    fn default() -> Self {
        Self { k: 3, n: 4, l: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Sent to a joining participant right after attach.
    SessionInfo {
        session_id: String,
        participant_count: usize,
        is_synced: bool,
        tpm_config: TpmConfig,
    },
    /// Broadcast to the other participant when someone joins.
    UserJoined {
        user_id: String,
        participant_count: usize,
    },
    /// Broadcast to the remaining participant when someone leaves.
    UserLeft { user_id: String },
    /// Broadcast once, before the first `sync_progress`.
    SyncStart {
        session_id: String,
        tpm_config: TpmConfig,
    },
    /// One per round, in round order.
    SyncProgress {
        round: u64,
        agreed: bool,
        progress: f64,
        tau_a: i32,
        tau_b: i32,
        learning_rule: LearningRule,
        best_progress: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        attacker_progress: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        attacker_tau: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        attacker_synced: Option<bool>,
    },
    /// The final sync frame for a session.
    SyncComplete { rounds: u64, key_fingerprint: String },
    /// An encrypted application message. `sender_id`/`timestamp` are set by
    /// the server on relay and absent on the client-originated frame.
    Message {
        #[serde(skip_serializing_if = "Option::is_none")]
        sender_id: Option<String>,
        ciphertext: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Client -> server: ask the coordinator to (re)start synchronization.
    RequestSync {},
    /// Client -> server keepalive.
    Ping {},
    /// Server -> client reply to `ping`.
    Pong {},
    /// Any of the error taxonomy members in the protocol's error handling
    /// design; `code` is set for machine-readable cases like `SESSION_FULL`.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl Frame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: None,
        }
    }

    pub fn error_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: Some(code.into()),
        }
    }
}
