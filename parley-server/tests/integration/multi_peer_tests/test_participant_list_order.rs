use parley_core::ParticipantId;

use crate::integration::{init_tracing, spawn_test_server};
use crate::utils::{TestClient, listed_ids};

#[tokio::test]
async fn test_participant_list_in_arrival_order() {
    init_tracing();

    let (addr, _state) = spawn_test_server(None).await;

    let mut ana = TestClient::connect(addr, "ana", None).await.unwrap();
    let mut ben = TestClient::connect(addr, "ben", None).await.unwrap();
    let mut cleo = TestClient::connect(addr, "cleo", None).await.unwrap();

    ana.join("lesson-1").await.unwrap();
    let ben_list = ben.join("lesson-1").await.unwrap();
    let cleo_list = cleo.join("lesson-1").await.unwrap();

    assert_eq!(listed_ids(&ben_list), Some((vec!["ana".to_string()], false)));
    assert_eq!(
        listed_ids(&cleo_list),
        Some((vec!["ana".to_string(), "ben".to_string()], false))
    );

    // Existing members hear about newcomers in the order they arrived.
    let first = ana.recv_kind("join").await.unwrap();
    let second = ana.recv_kind("join").await.unwrap();
    assert_eq!(first.from_participant, ParticipantId::from("ben"));
    assert_eq!(second.from_participant, ParticipantId::from("cleo"));

    let from_cleo = ben.recv_kind("join").await.unwrap();
    assert_eq!(from_cleo.from_participant, ParticipantId::from("cleo"));

    // The newest member is never told about itself.
    cleo.expect_silence().await.unwrap();
}
