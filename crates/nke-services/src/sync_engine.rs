//! SyncEngine — drives one session's Tree Parity Machine synchronization.
//!
//! Runs as a single `tokio::spawn`ed task per session (`Coordinator`
//! spawns it once both participants are attached). The per-round compute is
//! O(K·N) integer arithmetic; the only suspension points are the inter-round
//! delay and the broadcast send, matching the cooperative scheduling model
//! in the concurrency design.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use nke_core::frame::TpmConfig;
use nke_core::tpm::{LearningRule, Tpm};
use nke_core::{Frame, NeuralCipher};
use rand::rngs::ThreadRng;

use crate::error::SyncError;
use crate::session::Session;

/// Progress at or above this threshold triggers the end-game convergence
/// assist's direct-merge step.
const ASSIST_MERGE_THRESHOLD: f64 = 0.90;
/// Progress at or above this threshold triggers the assist's boosted-step
/// update.
const ASSIST_BOOST_THRESHOLD: f64 = 0.85;
/// Moving-average window for "has progress improved" detection.
const PROGRESS_AVG_WINDOW: usize = 50;
/// Minimum improvement (in moving average) required to reset the stuck
/// counter.
const IMPROVEMENT_EPSILON: f64 = 0.01;
/// Bound on the retained progress history.
const PROGRESS_HISTORY_CAP: usize = 200;
/// Progress history retained across a rule switch.
const PROGRESS_HISTORY_TRIM: usize = 20;

/// Tunables the coordinator passes in from [`nke_core::config::SyncConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SyncEngineConfig {
    pub inter_round_delay: Duration,
    pub max_rounds: u64,
}

/// Run synchronization for `session` to completion, cancellation, or the
/// round cap. Intended to be spawned as its own task; the coordinator
/// cancels it by aborting the returned `JoinHandle`.
pub async fn run_sync(session: Arc<Session>, config: SyncEngineConfig) -> Result<(), SyncError> {
    {
        let mut state = session.state().await;
        if state.is_synced || state.is_syncing {
            return Ok(());
        }
        state.is_syncing = true;
    }

    let result = run_sync_inner(&session, config).await;

    session.state().await.is_syncing = false;
    result
}

async fn run_sync_inner(session: &Arc<Session>, config: SyncEngineConfig) -> Result<(), SyncError> {
    if !session.is_ready().await {
        return Ok(());
    }

    session
        .broadcast(
            &Frame::SyncStart {
                session_id: session.session_id.clone(),
                tpm_config: session.tpm_config,
            },
            &[],
        )
        .await;

    let mut ids = session.participant_ids().await;
    ids.sort();
    if ids.len() < 2 {
        return Err(SyncError::ParticipantLost);
    }
    let (user_a, user_b) = (ids[0].clone(), ids[1].clone());

    let mut rng = rand::thread_rng();

    if session.show_attacker {
        let TpmConfig { k, n, l } = session.tpm_config;
        let attacker = Tpm::new(k, n, l, &mut rng).expect("session TPM config already validated");
        let mut state = session.state().await;
        let initial_progress = {
            let a = state.tpms.get(&user_a).expect("participant a present");
            attacker.progress_against(a)
        };
        state.attacker_tpm = Some(attacker);
        state.attacker_progress = initial_progress;
    }

    let mut round_num: u64 = 0;
    let mut learning_rule = LearningRule::default();
    let mut progress_history: VecDeque<f64> = VecDeque::with_capacity(PROGRESS_HISTORY_CAP);
    let mut best_progress: f64 = 0.0;
    let mut rounds_since_improvement: u64 = 0;
    let mut last_switch_round: u64 = 0;

    loop {
        if session.participant_count().await < 2 {
            return Err(SyncError::ParticipantLost);
        }
        round_num += 1;
        if round_num > config.max_rounds {
            session.broadcast(&Frame::error("sync round cap exceeded"), &[]).await;
            return Err(SyncError::RoundCapExceeded(config.max_rounds));
        }

        let outcome = run_round(session, &user_a, &user_b, &mut rng, learning_rule).await;

        progress_history.push_back(outcome.progress);
        if progress_history.len() > PROGRESS_HISTORY_CAP {
            progress_history.pop_front();
        }

        update_best_progress(
            &progress_history,
            outcome.progress,
            &mut best_progress,
            &mut rounds_since_improvement,
        );

        let switch_interval: u64 = if outcome.progress >= ASSIST_BOOST_THRESHOLD { 30 } else { 50 };
        if rounds_since_improvement >= switch_interval && (round_num - last_switch_round) >= switch_interval {
            learning_rule = learning_rule.next();
            rounds_since_improvement = 0;
            last_switch_round = round_num;
            tracing::debug!(
                session_id = %session.session_id,
                round = round_num,
                ?learning_rule,
                progress = outcome.progress,
                "switching learning rule"
            );
            while progress_history.len() > PROGRESS_HISTORY_TRIM {
                progress_history.pop_front();
            }
        }

        {
            let mut state = session.state().await;
            state.sync_round = round_num;
        }

        session
            .broadcast(
                &Frame::SyncProgress {
                    round: round_num,
                    agreed: outcome.agreed,
                    progress: outcome.progress,
                    tau_a: outcome.tau_a,
                    tau_b: outcome.tau_b,
                    learning_rule,
                    best_progress,
                    attacker_progress: outcome.attacker_progress,
                    attacker_tau: outcome.attacker_tau,
                    attacker_synced: outcome.attacker_synced,
                },
                &[],
            )
            .await;

        if outcome.weights_match {
            finish_sync(session, &user_a, round_num).await;
            return Ok(());
        }

        tokio::time::sleep(config.inter_round_delay).await;
    }
}

struct RoundOutcome {
    agreed: bool,
    progress: f64,
    tau_a: i32,
    tau_b: i32,
    weights_match: bool,
    attacker_progress: Option<f64>,
    attacker_tau: Option<i32>,
    attacker_synced: Option<bool>,
}

async fn run_round(
    session: &Arc<Session>,
    user_a: &str,
    user_b: &str,
    rng: &mut ThreadRng,
    rule: LearningRule,
) -> RoundOutcome {
    let mut state = session.state().await;

    let (k, n) = (session.tpm_config.k, session.tpm_config.n);
    let x = {
        let a = state.tpms.get(user_a).expect("participant a present");
        debug_assert_eq!((a.k(), a.n()), (k, n));
        a.random_input(rng)
    };

    let (tau_a, sigma_a) = state.tpms.get(user_a).unwrap().compute_output(&x);
    let (tau_b, sigma_b) = state.tpms.get(user_b).unwrap().compute_output(&x);
    let agreed = tau_a == tau_b;

    state.tpms.get_mut(user_a).unwrap().update_weights(&x, tau_a, tau_b, &sigma_a, rule);
    state.tpms.get_mut(user_b).unwrap().update_weights(&x, tau_b, tau_a, &sigma_b, rule);

    let (mut attacker_progress, mut attacker_tau, mut attacker_synced) = (None, None, None);
    if state.attacker_tpm.is_some() {
        let (tau_e, sigma_e) = state.attacker_tpm.as_ref().unwrap().compute_output(&x);
        if agreed {
            state
                .attacker_tpm
                .as_mut()
                .unwrap()
                .update_weights(&x, tau_e, tau_a, &sigma_e, rule);
        }
        let progress = state.attacker_tpm.as_ref().unwrap().progress_against(state.tpms.get(user_a).unwrap());
        let synced = state.attacker_tpm.as_ref().unwrap().weights_equal(state.tpms.get(user_a).unwrap());
        state.attacker_progress = progress;
        attacker_progress = Some(progress);
        attacker_tau = Some(tau_e);
        attacker_synced = Some(synced);
    }

    let mut progress = state.tpms.get(user_a).unwrap().progress_against(state.tpms.get(user_b).unwrap());
    let mut weights_match = state.tpms.get(user_a).unwrap().weights_equal(state.tpms.get(user_b).unwrap());

    if progress >= ASSIST_BOOST_THRESHOLD && !weights_match {
        apply_convergence_assist(&mut state, user_a, user_b, &x, tau_a, tau_b, &sigma_a, &sigma_b, agreed, rule, progress);
        progress = state.tpms.get(user_a).unwrap().progress_against(state.tpms.get(user_b).unwrap());
        weights_match = state.tpms.get(user_a).unwrap().weights_equal(state.tpms.get(user_b).unwrap());
    }

    RoundOutcome {
        agreed,
        progress,
        tau_a,
        tau_b,
        weights_match,
        attacker_progress,
        attacker_tau,
        attacker_synced,
    }
}

/// End-game convergence assist (spec §4.3). Deterministic and symmetric:
/// applying it to `(A, B)` or `(B, A)` produces identical resulting
/// matrices, since every step operates on `min`/`clip`, not on which side
/// is named first.
#[allow(clippy::too_many_arguments)]
fn apply_convergence_assist(
    state: &mut crate::session::SyncState,
    user_a: &str,
    user_b: &str,
    x: &[Vec<i32>],
    tau_a: i32,
    tau_b: i32,
    sigma_a: &[i32],
    sigma_b: &[i32],
    agreed: bool,
    rule: LearningRule,
    progress: f64,
) {
    let l = {
        let a = state.tpms.get(user_a).unwrap();
        a.l()
    };

    if progress >= ASSIST_MERGE_THRESHOLD {
        let (k, n) = {
            let a = state.tpms.get(user_a).unwrap();
            (a.k(), a.n())
        };
        for row in 0..k {
            for col in 0..n {
                let (wa, wb) = {
                    let a = state.tpms.get(user_a).unwrap();
                    let b = state.tpms.get(user_b).unwrap();
                    (a.weights()[row][col], b.weights()[row][col])
                };
                if (wa - wb).abs() == 1 {
                    let merged = wa.min(wb) + 1;
                    let merged = merged.clamp(-l, l);
                    state.tpms.get_mut(user_a).unwrap().weights_mut()[row][col] = merged;
                    state.tpms.get_mut(user_b).unwrap().weights_mut()[row][col] = merged;
                }
            }
        }
    }

    if agreed && progress >= ASSIST_BOOST_THRESHOLD {
        let step = if progress >= ASSIST_MERGE_THRESHOLD { 2 } else { 1 };
        boost_update(state.tpms.get_mut(user_a).unwrap(), x, tau_a, sigma_a, rule, step, l);
        boost_update(state.tpms.get_mut(user_b).unwrap(), x, tau_b, sigma_b, rule, step, l);
    }
}

fn boost_update(tpm: &mut Tpm, x: &[Vec<i32>], tau: i32, sigma: &[i32], rule: LearningRule, step: i32, l: i32) {
    if !matches!(rule, LearningRule::Hebbian | LearningRule::RandomWalk) {
        return;
    }
    let k = tpm.k();
    let n = tpm.n();
    for row in 0..k {
        if sigma[row] != tau {
            continue;
        }
        for col in 0..n {
            let delta = match rule {
                LearningRule::Hebbian => step * x[row][col] * sigma[row],
                LearningRule::RandomWalk => step * x[row][col],
                LearningRule::AntiHebbian => unreachable!("guarded above"),
            };
            tpm.weights_mut()[row][col] = (tpm.weights_mut()[row][col] + delta).clamp(-l, l);
        }
    }
}

fn update_best_progress(
    history: &VecDeque<f64>,
    latest: f64,
    best_progress: &mut f64,
    rounds_since_improvement: &mut u64,
) {
    if history.len() >= PROGRESS_AVG_WINDOW {
        let recent_avg: f64 = history.iter().rev().take(PROGRESS_AVG_WINDOW).sum::<f64>() / PROGRESS_AVG_WINDOW as f64;
        if recent_avg > *best_progress + IMPROVEMENT_EPSILON {
            *best_progress = recent_avg;
            *rounds_since_improvement = 0;
        } else {
            *rounds_since_improvement += 1;
        }
    } else if latest > *best_progress {
        *best_progress = latest;
        *rounds_since_improvement = 0;
    } else {
        *rounds_since_improvement += 1;
    }
}

async fn finish_sync(session: &Arc<Session>, user_a: &str, round_num: u64) {
    let fingerprint = {
        let mut state = session.state().await;
        let key = state.tpms.get(user_a).unwrap().key(32);
        let cipher = NeuralCipher::new(&key);
        let fingerprint = cipher.fingerprint();
        state.is_synced = true;
        state.shared_key = Some(key);
        state.cipher = Some(cipher);
        fingerprint
    };

    tracing::info!(session_id = %session.session_id, rounds = round_num, "synchronized");

    session
        .broadcast(
            &Frame::SyncComplete {
                rounds: round_num,
                key_fingerprint: fingerprint,
            },
            &[],
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::MockChannel;
    use nke_core::frame::TpmConfig;

    async fn synced_session(k: usize, n: usize, l: i32) -> Arc<Session> {
        let mut rng = rand::thread_rng();
        let session = Arc::new(Session::new("test0001".into(), TpmConfig { k, n, l }, true));
        let tpm_a = Tpm::new(k, n, l, &mut rng).unwrap();
        let tpm_b = Tpm::new(k, n, l, &mut rng).unwrap();
        session.add_participant("alice", Arc::new(MockChannel::new()), tpm_a).await;
        session.add_participant("bob", Arc::new(MockChannel::new()), tpm_b).await;
        session
    }

    #[tokio::test]
    async fn converges_within_round_cap_for_default_parameters() {
        let session = synced_session(3, 4, 3).await;
        let config = SyncEngineConfig {
            inter_round_delay: Duration::from_millis(0),
            max_rounds: 50_000,
        };

        let result = run_sync(session.clone(), config).await;
        assert!(result.is_ok());

        let state = session.state().await;
        assert!(state.is_synced);
        assert!(state.cipher.is_some());
        let a = state.tpms.get("alice").unwrap();
        let b = state.tpms.get("bob").unwrap();
        assert!(a.weights_equal(b));
    }

    #[tokio::test]
    async fn both_parties_agree_on_fingerprint() {
        let session = synced_session(3, 4, 3).await;
        let config = SyncEngineConfig {
            inter_round_delay: Duration::from_millis(0),
            max_rounds: 50_000,
        };
        run_sync(session.clone(), config).await.unwrap();

        let state = session.state().await;
        let a = state.tpms.get("alice").unwrap();
        let b = state.tpms.get("bob").unwrap();
        assert_eq!(a.key(32), b.key(32));
        assert_eq!(
            nke_core::cipher::fingerprint(&a.key(32)),
            nke_core::cipher::fingerprint(&b.key(32))
        );
    }

    #[test]
    fn convergence_assist_is_symmetric_in_argument_order() {
        let mut rng = rand::thread_rng();
        let tpm_a = Tpm::new(3, 4, 3, &mut rng).unwrap();
        let mut tpm_b = tpm_a.clone();
        tpm_b.weights_mut()[0][0] = (tpm_b.weights_mut()[0][0] + 1).clamp(-3, 3);

        // Direct-merge step depends only on min()/clip, not argument order.
        let k = tpm_a.k();
        let n = tpm_a.n();
        let mut forward_a = tpm_a.clone();
        let mut forward_b = tpm_b.clone();
        for row in 0..k {
            for col in 0..n {
                let (wa, wb) = (forward_a.weights()[row][col], forward_b.weights()[row][col]);
                if (wa - wb).abs() == 1 {
                    let merged = wa.min(wb) + 1;
                    forward_a.weights_mut()[row][col] = merged.clamp(-3, 3);
                    forward_b.weights_mut()[row][col] = merged.clamp(-3, 3);
                }
            }
        }

        let mut reverse_b = tpm_b.clone();
        let mut reverse_a = tpm_a.clone();
        for row in 0..k {
            for col in 0..n {
                let (wb, wa) = (reverse_b.weights()[row][col], reverse_a.weights()[row][col]);
                if (wb - wa).abs() == 1 {
                    let merged = wb.min(wa) + 1;
                    reverse_b.weights_mut()[row][col] = merged.clamp(-3, 3);
                    reverse_a.weights_mut()[row][col] = merged.clamp(-3, 3);
                }
            }
        }

        assert_eq!(forward_a.weights(), reverse_a.weights());
        assert_eq!(forward_b.weights(), reverse_b.weights());
    }
}
