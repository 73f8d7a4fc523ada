//! Tree Parity Machine — the neural-cryptography primitive Neural Key
//! Exchange is built on.
//!
//! Two parties each hold a `Tpm` with identical `(K, N, L)`. Exchanging only
//! the single-bit output `τ` of a forward pass, and moving weights only on
//! rounds where both parties agree, the two machines converge to the same
//! weight matrix without ever revealing it on the wire.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Hidden-neuron count bound, per the data model's `K ∈ [1,32]`.
pub const MAX_K: usize = 32;
/// Inputs-per-neuron bound, per `N ∈ [1,64]`.
pub const MAX_N: usize = 64;
/// Weight-bound bound, per `L ∈ [1,10]`.
pub const MAX_L: i32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TpmError {
    #[error("K must be in 1..={MAX_K}, got {0}")]
    InvalidK(usize),
    #[error("N must be in 1..={MAX_N}, got {0}")]
    InvalidN(usize),
    #[error("L must be in 1..={MAX_L}, got {0}")]
    InvalidL(i32),
}

/// Weight-update rule. Only rows whose hidden output agrees with the
/// consensus `τ` move on a given round — this asymmetry is what lets two
/// cooperating parties outpace a passive eavesdropper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningRule {
    RandomWalk,
    Hebbian,
    AntiHebbian,
}

impl LearningRule {
    /// Cycle `random_walk -> hebbian -> anti_hebbian -> random_walk`, the
    /// order the adaptive rule switcher follows.
    pub fn next(self) -> Self {
        match self {
            Self::RandomWalk => Self::Hebbian,
            Self::Hebbian => Self::AntiHebbian,
            Self::AntiHebbian => Self::RandomWalk,
        }
    }
}

impl Default for LearningRule {
    fn default() -> Self {
        Self::RandomWalk
    }
}

/// A Tree Parity Machine: `K` hidden neurons, `N` inputs each, integer
/// weights bounded by `[-L, L]`.
#[derive(Debug, Clone)]
pub struct Tpm {
    k: usize,
    n: usize,
    l: i32,
    weights: Vec<Vec<i32>>,
}

impl Tpm {
    /// Construct a TPM with uniformly random weights in `[-L, L]`.
    pub fn new<R: Rng + ?Sized>(k: usize, n: usize, l: i32, rng: &mut R) -> Result<Self, TpmError> {
        if k == 0 || k > MAX_K {
            return Err(TpmError::InvalidK(k));
        }
        if n == 0 || n > MAX_N {
            return Err(TpmError::InvalidN(n));
        }
        if l < 1 || l > MAX_L {
            return Err(TpmError::InvalidL(l));
        }

        let weights = (0..k)
            .map(|_| (0..n).map(|_| rng.gen_range(-l..=l)).collect())
            .collect();

        Ok(Self { k, n, l, weights })
    }

    /// Construct from an explicit weight matrix (used by tests and the
    /// end-game convergence assist, which mutates two TPMs' matrices
    /// directly).
    pub fn from_weights(k: usize, n: usize, l: i32, weights: Vec<Vec<i32>>) -> Self {
        debug_assert_eq!(weights.len(), k);
        debug_assert!(weights.iter().all(|row| row.len() == n));
        Self { k, n, l, weights }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn l(&self) -> i32 {
        self.l
    }

    pub fn weights(&self) -> &[Vec<i32>] {
        &self.weights
    }

    pub fn weights_mut(&mut self) -> &mut [Vec<i32>] {
        &mut self.weights
    }

    /// Draw a fresh random input `X ∈ {-1, +1}^{K×N}` for one round.
    /// Inputs are public, so any RNG — cryptographic or not — is fine here.
    pub fn random_input<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Vec<i32>> {
        (0..self.k)
            .map(|_| {
                (0..self.n)
                    .map(|_| if rng.gen_bool(0.5) { 1 } else { -1 })
                    .collect()
            })
            .collect()
    }

    /// Forward pass: returns `(τ, σ)`.
    pub fn compute_output(&self, x: &[Vec<i32>]) -> (i32, Vec<i32>) {
        let sigma: Vec<i32> = (0..self.k)
            .map(|row| {
                let h: i32 = (0..self.n).map(|col| x[row][col] * self.weights[row][col]).sum();
                if h >= 0 {
                    1
                } else {
                    -1
                }
            })
            .collect();

        let tau = sigma.iter().product();
        (tau, sigma)
    }

    /// Weight update. Returns `true` if the update was applied (i.e.
    /// `tau_self == tau_other`).
    pub fn update_weights(
        &mut self,
        x: &[Vec<i32>],
        tau_self: i32,
        tau_other: i32,
        sigma: &[i32],
        rule: LearningRule,
    ) -> bool {
        if tau_self != tau_other {
            return false;
        }
        let tau = tau_self;

        for row in 0..self.k {
            if sigma[row] != tau {
                continue;
            }
            for col in 0..self.n {
                let delta = match rule {
                    LearningRule::Hebbian => x[row][col] * sigma[row],
                    LearningRule::AntiHebbian => -(x[row][col] * sigma[row]),
                    LearningRule::RandomWalk => x[row][col],
                };
                self.weights[row][col] = (self.weights[row][col] + delta).clamp(-self.l, self.l);
            }
        }

        true
    }

    /// Derive the session key: `SHA-256(serialize(W))[:length]`, where
    /// `serialize` emits each weight as a little-endian 32-bit signed
    /// integer in row-major order. Normative — both parties must produce
    /// bit-identical key material from bit-identical `W`.
    pub fn key(&self, length: usize) -> Vec<u8> {
        let mut hasher = Sha256::new();
        for row in &self.weights {
            for &w in row {
                hasher.update(w.to_le_bytes());
            }
        }
        let digest = hasher.finalize();
        digest[..length.min(digest.len())].to_vec()
    }

    /// Whether this TPM's weights exactly match another's — the
    /// synchronization success condition.
    pub fn weights_equal(&self, other: &Tpm) -> bool {
        self.weights == other.weights
    }

    /// `1 - Σ|self.W - other.W| / (K·N·2L)`, the sync-progress metric.
    pub fn progress_against(&self, other: &Tpm) -> f64 {
        let max_diff = (self.k * self.n) as f64 * (2.0 * self.l as f64);
        if max_diff <= 0.0 {
            return 1.0;
        }
        let diff: i64 = (0..self.k)
            .flat_map(|row| (0..self.n).map(move |col| (row, col)))
            .map(|(row, col)| (self.weights[row][col] - other.weights[row][col]).unsigned_abs() as i64)
            .sum();
        1.0 - (diff as f64 / max_diff)
    }
}
