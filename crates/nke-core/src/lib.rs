//! nke-core — TPM primitive, AES-256-GCM cipher, wire frames, and config.
//! All other nke crates depend on this one.

pub mod cipher;
pub mod config;
pub mod frame;
pub mod tpm;

pub use cipher::{CipherError, NeuralCipher};
pub use config::NkeConfig;
pub use frame::Frame;
pub use tpm::{LearningRule, Tpm, TpmError};
