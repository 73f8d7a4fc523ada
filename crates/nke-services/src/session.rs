//! Session — the data container for one pair-wise Neural Key Exchange.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nke_core::{Frame, NeuralCipher};
use nke_core::frame::TpmConfig;
use nke_core::tpm::Tpm;
use tokio::sync::{Mutex, RwLock};

use crate::channel::{Channel, TransportError};

/// Mutable synchronization state. Mutated exclusively by the session's own
/// sync task; the participant set below is mutated only by the
/// coordinator's connect/disconnect paths — this split is what lets the two
/// sides run without contending on the same lock.
pub struct SyncState {
    pub tpms: HashMap<String, Tpm>,
    pub sync_round: u64,
    pub is_synced: bool,
    pub is_syncing: bool,
    pub shared_key: Option<Vec<u8>>,
    pub cipher: Option<NeuralCipher>,
    pub attacker_tpm: Option<Tpm>,
    pub attacker_progress: f64,
}

impl SyncState {
    fn new() -> Self {
        Self {
            tpms: HashMap::new(),
            sync_round: 0,
            is_synced: false,
            is_syncing: false,
            shared_key: None,
            cipher: None,
            attacker_tpm: None,
            attacker_progress: 0.0,
        }
    }
}

/// A neural key exchange session between (at most) two participants.
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub tpm_config: TpmConfig,
    pub show_attacker: bool,

    participants: RwLock<HashMap<String, Arc<dyn Channel>>>,
    state: Mutex<SyncState>,
}

impl Session {
    pub fn new(session_id: String, tpm_config: TpmConfig, show_attacker: bool) -> Self {
        Self {
            session_id,
            created_at: Utc::now(),
            tpm_config,
            show_attacker,
            participants: RwLock::new(HashMap::new()),
            state: Mutex::new(SyncState::new()),
        }
    }

    pub async fn state(&self) -> tokio::sync::MutexGuard<'_, SyncState> {
        self.state.lock().await
    }

    /// Add a participant and their fresh TPM. Returns `false` if the
    /// session already has two distinct participants and `user_id` is not
    /// among them — the caller should treat this as `SESSION_FULL`.
    pub async fn add_participant(
        &self,
        user_id: &str,
        channel: Arc<dyn Channel>,
        tpm: Tpm,
    ) -> bool {
        let mut participants = self.participants.write().await;
        if participants.len() >= 2 && !participants.contains_key(user_id) {
            return false;
        }
        participants.insert(user_id.to_string(), channel);
        drop(participants);

        let mut state = self.state.lock().await;
        state.tpms.insert(user_id.to_string(), tpm);
        true
    }

    pub async fn remove_participant(&self, user_id: &str) {
        self.participants.write().await.remove(user_id);
        self.state.lock().await.tpms.remove(user_id);
    }

    pub async fn participant_count(&self) -> usize {
        self.participants.read().await.len()
    }

    pub async fn participant_ids(&self) -> Vec<String> {
        self.participants.read().await.keys().cloned().collect()
    }

    /// Ready for sync: exactly two participants attached.
    pub async fn is_ready(&self) -> bool {
        self.participant_count().await == 2
    }

    /// Best-effort broadcast to every participant not in `exclude`.
    /// Participants whose send fails are returned (not removed here — the
    /// caller runs the full disconnect path for each, per the
    /// `TransportError` handling policy).
    pub async fn broadcast(&self, frame: &Frame, exclude: &[&str]) -> Vec<String> {
        let participants = self.participants.read().await;
        let mut failed = Vec::new();
        for (user_id, channel) in participants.iter() {
            if exclude.contains(&user_id.as_str()) {
                continue;
            }
            if let Err(err) = channel.send(frame).await {
                tracing::warn!(session_id = %self.session_id, %user_id, error = %err, "broadcast failed");
                failed.push(user_id.clone());
            }
        }
        failed
    }

    pub async fn send_to(&self, user_id: &str, frame: &Frame) -> Result<(), TransportError> {
        let participants = self.participants.read().await;
        match participants.get(user_id) {
            Some(channel) => channel.send(frame).await,
            None => Err(TransportError::Closed),
        }
    }
}
