use std::time::Duration;

use nke_core::frame::TpmConfig;
use nke_core::{Frame, NkeConfig};
use nke_services::{Coordinator, SessionError};

use crate::support::{recv_until, test_channel};

fn fast_config() -> NkeConfig {
    let mut config = NkeConfig::default();
    config.sync.inter_round_delay_ms = 0;
    config
}

#[tokio::test]
async fn session_create_returns_requested_tpm_config() {
    let coordinator = Coordinator::new(&fast_config());
    let tpm_config = TpmConfig { k: 5, n: 6, l: 4 };
    let session = coordinator.create_session("sess0001".to_string(), Some(tpm_config));

    assert_eq!(session.session_id, "sess0001");
    assert_eq!(session.tpm_config, tpm_config);
    assert_eq!(session.participant_count().await, 0);
}

#[tokio::test]
async fn third_participant_gets_session_full_error() {
    let coordinator = Coordinator::new(&fast_config());
    let (alice_chan, _alice_rx, _) = test_channel();
    let (bob_chan, _bob_rx, _) = test_channel();
    let (carol_chan, mut carol_rx, _) = test_channel();

    coordinator.connect("abcd1234", "alice", alice_chan, TpmConfig::default()).await.unwrap();
    coordinator.connect("abcd1234", "bob", bob_chan, TpmConfig::default()).await.unwrap();

    let result = coordinator.connect("abcd1234", "carol", carol_chan, TpmConfig::default()).await;
    assert!(matches!(result, Err(SessionError::SessionFull)));

    let error_frame = carol_rx.recv().await.unwrap();
    assert!(matches!(
        error_frame,
        Frame::Error { code: Some(ref c), .. } if c == "SESSION_FULL"
    ));
}

#[tokio::test]
async fn disconnect_notifies_remaining_participant_and_frees_session() {
    let coordinator = Coordinator::new(&fast_config());
    let (alice_chan, mut alice_rx, _) = test_channel();
    let (bob_chan, mut bob_rx, _) = test_channel();

    coordinator.connect("abcd1234", "alice", alice_chan, TpmConfig::default()).await.unwrap();
    coordinator.connect("abcd1234", "bob", bob_chan, TpmConfig::default()).await.unwrap();

    // Drain session_info/user_joined/sync_start noise before disconnecting.
    let _ = tokio::time::timeout(Duration::from_millis(200), alice_rx.recv()).await;

    coordinator.disconnect("abcd1234", "alice").await;

    let user_left = tokio::time::timeout(
        Duration::from_secs(5),
        recv_until(&mut bob_rx, |f| matches!(f, Frame::UserLeft { .. })),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(matches!(user_left, Frame::UserLeft { user_id } if user_id == "alice"));

    assert!(coordinator.session("abcd1234").is_some());
    coordinator.disconnect("abcd1234", "bob").await;
    assert!(coordinator.session("abcd1234").is_none());
}
