//! Neural Cipher — AES-256-GCM encryption keyed from synchronized TPM weights.
//!
//! GCM mode provides both confidentiality and authenticity, so a tampered
//! ciphertext fails to decrypt rather than silently producing garbage.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const PBKDF2_ITERATIONS: u32 = 100_000;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("decryption failed: malformed ciphertext")]
    Malformed,
    #[error("decryption failed: authentication tag mismatch")]
    Decryption,
    #[error("ciphertext is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("plaintext is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// AES-256-GCM cipher keyed from a synchronized TPM's derived key.
pub struct NeuralCipher {
    key: [u8; 32],
    cipher: Aes256Gcm,
}

impl NeuralCipher {
    /// Construct from arbitrary key material. Keys shorter than 32 bytes are
    /// replaced by `SHA-256(input)`; longer keys are truncated to 32 bytes.
    pub fn new(key_material: &[u8]) -> Self {
        let key: [u8; 32] = if key_material.len() < 32 {
            Sha256::digest(key_material).into()
        } else {
            let mut buf = [0u8; 32];
            buf.copy_from_slice(&key_material[..32]);
            buf
        };
        let cipher = Aes256Gcm::new_from_slice(&key).expect("key is exactly 32 bytes");
        Self { key, cipher }
    }

    /// Encrypt a UTF-8 message, returning `base64(nonce ‖ tag ‖ ciphertext)`.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        // `aes-gcm` appends the tag to the ciphertext; split it back out so
        // the wire layout matches the normative nonce‖tag‖ciphertext order.
        let mut sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .expect("AES-256-GCM encryption is infallible for well-formed input");
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        let mut combined = Vec::with_capacity(NONCE_LEN + TAG_LEN + sealed.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&tag);
        combined.extend_from_slice(&sealed);

        BASE64.encode(combined)
    }

    /// Decrypt a `base64(nonce ‖ tag ‖ ciphertext)` blob produced by
    /// [`Self::encrypt`] (or an interoperable implementation of the same
    /// layout).
    pub fn decrypt(&self, blob: &str) -> Result<String, CipherError> {
        let combined = BASE64.decode(blob)?;
        if combined.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Malformed);
        }

        let nonce = Nonce::from_slice(&combined[..NONCE_LEN]);
        let tag = &combined[NONCE_LEN..NONCE_LEN + TAG_LEN];
        let ciphertext = &combined[NONCE_LEN + TAG_LEN..];

        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.as_ref())
            .map_err(|_| CipherError::Decryption)?;

        Ok(String::from_utf8(plaintext)?)
    }

    /// Upper-case hex of the first 4 bytes of `SHA-256(key)`.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.key)
    }
}

/// Upper-case hex of the first 4 bytes of `SHA-256(key)` — shared by the
/// cipher and by callers that only have the raw session key.
pub fn fingerprint(key: &[u8]) -> String {
    let digest = Sha256::digest(key);
    hex::encode_upper(&digest[..4])
}

/// Derive a key from a password via PBKDF2-HMAC-SHA256 (100,000 iterations,
/// 32-byte output). Not used by the sync protocol itself — useful for
/// encrypting locally persisted state with a user-supplied passphrase, the
/// way `derive_key_from_password` does in the reference implementation this
/// system was distilled from.
pub fn derive_key_from_password(password: &str, salt: Option<[u8; 16]>) -> ([u8; 32], [u8; 16]) {
    let salt = salt.unwrap_or_else(|| {
        let mut s = [0u8; 16];
        OsRng.fill_bytes(&mut s);
        s
    });

    let mut key = [0u8; 32];
    pbkdf2::<Hmac<Sha256>>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut key)
        .expect("PBKDF2 output length is fixed and valid");

    (key, salt)
}
