use parley_core::{ParticipantId, RoomId};

use crate::integration::{init_tracing, spawn_test_server};
use crate::utils::{TestClient, listed_ids};

#[tokio::test]
async fn test_single_participant_joins_room() {
    init_tracing();

    let (addr, state) = spawn_test_server(None).await;

    let mut alice = TestClient::connect(addr, "alice", None)
        .await
        .expect("Failed to connect");

    let list = alice.join("lesson-1").await.expect("No participant list");
    assert_eq!(list.to_participant, Some(ParticipantId::from("alice")));
    assert_eq!(listed_ids(&list), Some((vec![], false)));

    let members = state
        .registry
        .snapshot(&RoomId::from("lesson-1"))
        .await
        .expect("Room should exist");
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].participant_id, ParticipantId::from("alice"));
    assert!(state.signaling.is_connected(&ParticipantId::from("alice")));

    alice.close().await.expect("Failed to close");
}
