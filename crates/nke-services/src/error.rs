//! Error taxonomy for session and sync-engine operations (spec §7).

use nke_core::tpm::TpmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid TPM parameters: {0}")]
    Validation(#[from] TpmError),
    #[error("session is full")]
    SessionFull,
    #[error("session not found")]
    NotFound,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync round cap ({0}) exceeded without convergence")]
    RoundCapExceeded(u64),
    #[error("session lost a participant mid-sync")]
    ParticipantLost,
}
