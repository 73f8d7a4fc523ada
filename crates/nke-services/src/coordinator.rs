//! Coordinator — process-wide session registry and sync-task lifecycle.
//!
//! Mirrors the `SessionTable = Arc<DashMap<[u8;32], ActiveSession>>` pattern:
//! one `DashMap` keyed by session id holds the sessions themselves, and a
//! second tracks the `JoinHandle` of whichever task is currently running
//! that session's synchronization, so at most one sync task ever runs per
//! session.

use std::sync::Arc;

use dashmap::DashMap;
use nke_core::frame::TpmConfig;
use nke_core::tpm::Tpm;
use nke_core::{Frame, NkeConfig};
use tokio::task::JoinHandle;

use crate::channel::Channel;
use crate::error::SessionError;
use crate::session::Session;
use crate::sync_engine::{self, SyncEngineConfig};

/// Process-wide registry of sessions and their sync tasks.
pub struct Coordinator {
    sessions: DashMap<String, Arc<Session>>,
    sync_tasks: DashMap<String, JoinHandle<()>>,
    default_tpm: TpmConfig,
    show_attacker: bool,
    sync_config: SyncEngineConfig,
}

impl Coordinator {
    pub fn new(config: &NkeConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            sync_tasks: DashMap::new(),
            default_tpm: config.tpm_defaults,
            show_attacker: config.sync.show_attacker,
            sync_config: SyncEngineConfig {
                inter_round_delay: std::time::Duration::from_millis(config.sync.inter_round_delay_ms),
                max_rounds: config.sync.max_rounds,
            },
        }
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    /// Pre-create an empty session (`POST /sessions`). `session_id` is
    /// generated by the caller (first 8 hex characters of a UUIDv4, the way
    /// the reference implementation's `create_session` does it) unless one
    /// is already reserved.
    pub fn create_session(&self, session_id: String, tpm_config: Option<TpmConfig>) -> Arc<Session> {
        let tpm_config = tpm_config.unwrap_or(self.default_tpm);
        let session = Arc::new(Session::new(session_id.clone(), tpm_config, self.show_attacker));
        self.sessions.insert(session_id, session.clone());
        session
    }

    /// Attach `channel` as `user_id` on `session_id`, creating the session
    /// on first contact if it doesn't exist yet (lazy WebSocket connect, the
    /// same fallback the reference server's `/ws/{session_id}/{user_id}`
    /// handler provides alongside the explicit `POST /sessions`).
    pub async fn connect(
        &self,
        session_id: &str,
        user_id: &str,
        channel: Arc<dyn Channel>,
        tpm_config: TpmConfig,
    ) -> Result<Arc<Session>, SessionError> {
        let session = match self.sessions.get(session_id) {
            Some(entry) => entry.clone(),
            None => self.create_session(session_id.to_string(), Some(tpm_config)),
        };

        // Always build the new participant's TPM from the session's own
        // (K, N, L), never the connector-supplied config — the two TPMs must
        // share dimensions or `progress_against` indexes out of bounds.
        let tpm = {
            let mut rng = rand::thread_rng();
            let TpmConfig { k, n, l } = session.tpm_config;
            Tpm::new(k, n, l, &mut rng)?
        };

        if !session.add_participant(user_id, channel.clone(), tpm).await {
            let _ = channel
                .send(&Frame::error_with_code("Session is full", "SESSION_FULL"))
                .await;
            return Err(SessionError::SessionFull);
        }

        session
            .broadcast(
                &Frame::UserJoined {
                    user_id: user_id.to_string(),
                    participant_count: session.participant_count().await,
                },
                &[user_id],
            )
            .await;

        let (is_synced, participant_count) = {
            let state = session.state().await;
            (state.is_synced, session.participant_count().await)
        };
        let _ = session
            .send_to(
                user_id,
                &Frame::SessionInfo {
                    session_id: session.session_id.clone(),
                    participant_count,
                    is_synced,
                    tpm_config: session.tpm_config,
                },
            )
            .await;

        self.maybe_start_sync(session.clone());

        Ok(session)
    }

    /// Spawn the sync task if the session is ready and nothing is running
    /// for it yet. Idempotent — safe to call on every `connect`.
    pub fn maybe_start_sync(&self, session: Arc<Session>) {
        let session_id = session.session_id.clone();
        if self.sync_tasks.contains_key(&session_id) {
            return;
        }

        let config = self.sync_config;
        let handle = tokio::spawn(async move {
            if let Err(err) = sync_engine::run_sync(session.clone(), config).await {
                tracing::warn!(session_id = %session.session_id, error = %err, "sync task ended with an error");
            }
        });
        self.sync_tasks.insert(session_id, handle);
    }

    /// Detach `user_id` from `session_id`: cancels any running sync task,
    /// notifies the remaining participant, and drops the session entirely
    /// once it's empty.
    pub async fn disconnect(&self, session_id: &str, user_id: &str) {
        let Some(session) = self.session(session_id) else {
            return;
        };

        session.remove_participant(user_id).await;

        if let Some((_, handle)) = self.sync_tasks.remove(session_id) {
            handle.abort();
            // `abort` drops the task without running its remaining code, so
            // the in-progress-sync flag is reset here instead.
            let mut state = session.state().await;
            state.is_syncing = false;
        }

        session
            .broadcast(&Frame::UserLeft { user_id: user_id.to_string() }, &[])
            .await;

        if session.participant_count().await == 0 {
            self.sessions.remove(session_id);
        }
    }

    /// Relay an encrypted application message from `from_user` to the other
    /// participant, stamping `sender_id`/`timestamp` the way the server does
    /// on relay (the client-originated frame carries neither).
    pub async fn relay_message(&self, session_id: &str, from_user: &str, ciphertext: String) {
        let Some(session) = self.session(session_id) else {
            return;
        };

        let frame = Frame::Message {
            sender_id: Some(from_user.to_string()),
            ciphertext,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        };

        let failed = session.broadcast(&frame, &[from_user]).await;
        for user_id in failed {
            self.disconnect(session_id, &user_id).await;
        }
    }

    /// Ask the coordinator to (re)start synchronization for a session whose
    /// client sent `request_sync`.
    pub fn request_sync(&self, session_id: &str) {
        if let Some(session) = self.session(session_id) {
            self.maybe_start_sync(session);
        }
    }
}

/// Generate an 8-character session id: the leading segment of a UUIDv4,
/// matching `str(uuid.uuid4())[:8]` in the reference server.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
