use std::time::Duration;

use nke_core::frame::TpmConfig;
use nke_core::{Frame, NeuralCipher, NkeConfig};
use nke_services::Coordinator;

use crate::support::{recv_until, test_channel};

fn fast_config() -> NkeConfig {
    let mut config = NkeConfig::default();
    config.sync.inter_round_delay_ms = 0;
    config
}

async fn sync_both(coordinator: &Coordinator, session_id: &str) {
    let (alice_chan, mut alice_rx, _) = test_channel();
    let (bob_chan, mut bob_rx, _) = test_channel();

    coordinator
        .connect(session_id, "alice", alice_chan, TpmConfig::default())
        .await
        .unwrap();
    coordinator
        .connect(session_id, "bob", bob_chan, TpmConfig::default())
        .await
        .unwrap();

    let alice_done = tokio::time::timeout(
        Duration::from_secs(60),
        recv_until(&mut alice_rx, |f| matches!(f, Frame::SyncComplete { .. })),
    );
    let bob_done = tokio::time::timeout(
        Duration::from_secs(60),
        recv_until(&mut bob_rx, |f| matches!(f, Frame::SyncComplete { .. })),
    );

    let (alice_frame, bob_frame) = tokio::join!(alice_done, bob_done);
    let alice_frame = alice_frame.expect("alice timed out waiting for sync").unwrap();
    let bob_frame = bob_frame.expect("bob timed out waiting for sync").unwrap();

    match (alice_frame, bob_frame) {
        (Frame::SyncComplete { key_fingerprint: a, .. }, Frame::SyncComplete { key_fingerprint: b, .. }) => {
            assert_eq!(a, b, "both parties must agree on the session key fingerprint");
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn default_parameters_converge_and_agree_on_fingerprint() {
    let coordinator = Coordinator::new(&fast_config());
    sync_both(&coordinator, "test0001").await;
}

#[tokio::test]
async fn independently_derived_keys_interoperate_via_aes_gcm() {
    let coordinator = Coordinator::new(&fast_config());
    sync_both(&coordinator, "test0002").await;

    let session = coordinator.session("test0002").unwrap();
    let (key_alice, key_bob) = {
        let state = session.state().await;
        (
            state.tpms.get("alice").unwrap().key(32),
            state.tpms.get("bob").unwrap().key(32),
        )
    };
    assert_eq!(key_alice, key_bob);

    let cipher_a = NeuralCipher::new(&key_alice);
    let cipher_b = NeuralCipher::new(&key_bob);

    let ciphertext = cipher_a.encrypt("synchronized");
    assert_eq!(cipher_b.decrypt(&ciphertext).unwrap(), "synchronized");
}

#[tokio::test]
async fn message_relay_reaches_the_other_participant_only() {
    let coordinator = Coordinator::new(&fast_config());
    let (alice_chan, mut alice_rx, _) = test_channel();
    let (bob_chan, mut bob_rx, _) = test_channel();

    coordinator.connect("test0003", "alice", alice_chan, TpmConfig::default()).await.unwrap();
    coordinator.connect("test0003", "bob", bob_chan, TpmConfig::default()).await.unwrap();

    coordinator.relay_message("test0003", "alice", "cGF5bG9hZA==".to_string()).await;

    let relayed = tokio::time::timeout(
        Duration::from_secs(5),
        recv_until(&mut bob_rx, |f| matches!(f, Frame::Message { .. })),
    )
    .await
    .unwrap()
    .unwrap();

    match relayed {
        Frame::Message { sender_id, ciphertext, .. } => {
            assert_eq!(sender_id.as_deref(), Some("alice"));
            assert_eq!(ciphertext, "cGF5bG9hZA==");
        }
        _ => unreachable!(),
    }

    // Alice must never see her own relayed message echoed back.
    let echoed = tokio::time::timeout(
        Duration::from_millis(300),
        recv_until(&mut alice_rx, |f| matches!(f, Frame::Message { .. })),
    )
    .await;
    assert!(echoed.is_err(), "sender should not receive their own relayed message");
}
