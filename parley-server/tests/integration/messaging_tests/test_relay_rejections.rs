use parley_core::{ErrorCode, MediaState, ParticipantId, RoomId, SignalBody};

use crate::integration::{create_test_registry, init_tracing, spawn_test_server};
use crate::utils::{TestClient, offer};

#[tokio::test]
async fn test_relay_to_departed_target_reports_target_not_found() {
    init_tracing();

    let (registry, signaling) = create_test_registry();
    let room = RoomId::from("lesson-1");
    let ana = ParticipantId::from("ana");
    let ben = ParticipantId::from("ben");

    registry.join(&room, &ana, MediaState::default()).await.unwrap();
    registry.join(&room, &ben, MediaState::default()).await.unwrap();
    registry.leave(&room, &ben, None).await;
    signaling.clear().await;

    registry.relay(offer("lesson-1", "ana", "ben", 1)).await;
    // Snapshot queues behind the relay, so the relay has been handled once it returns.
    registry.snapshot(&room).await.unwrap();

    let received = signaling.messages_for(&ana).await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].from_participant, ben);
    assert!(matches!(
        received[0].body,
        SignalBody::Error {
            code: ErrorCode::TargetNotFound,
            ..
        }
    ));
    assert!(signaling.messages_for(&ben).await.is_empty());
}

#[tokio::test]
async fn test_relay_from_non_member_is_rejected() {
    init_tracing();

    let (registry, signaling) = create_test_registry();
    let room = RoomId::from("lesson-1");
    let ana = ParticipantId::from("ana");
    let eve = ParticipantId::from("eve");

    registry.join(&room, &ana, MediaState::default()).await.unwrap();
    signaling.clear().await;

    registry.relay(offer("lesson-1", "eve", "ana", 1)).await;
    registry.snapshot(&room).await.unwrap();

    assert!(signaling.messages_for(&ana).await.is_empty());
    let received = signaling.messages_for(&eve).await;
    assert_eq!(received.len(), 1);
    assert!(matches!(
        received[0].body,
        SignalBody::Error {
            code: ErrorCode::NotInRoom,
            ..
        }
    ));
}

#[tokio::test]
async fn test_relay_into_unknown_room_is_rejected() {
    init_tracing();

    let (registry, signaling) = create_test_registry();

    registry.relay(offer("nowhere", "ana", "ben", 1)).await;

    let received = signaling.messages_for(&ParticipantId::from("ana")).await;
    assert_eq!(received.len(), 1);
    assert!(matches!(
        received[0].body,
        SignalBody::Error {
            code: ErrorCode::NotInRoom,
            ..
        }
    ));
    assert_eq!(registry.room_count(), 0);
}

#[tokio::test]
async fn test_server_only_messages_are_refused() {
    init_tracing();

    let (addr, _state) = spawn_test_server(None).await;

    let mut ana = TestClient::connect(addr, "ana", None).await.unwrap();
    ana.join("lesson-1").await.unwrap();

    let forged = parley_core::SignalMessage::error(
        RoomId::from("lesson-1"),
        ErrorCode::RoomClosed,
        "forged",
    );
    ana.send(&forged).await.unwrap();

    let reply = ana.recv_kind("error").await.unwrap();
    assert!(matches!(
        reply.body,
        SignalBody::Error {
            code: ErrorCode::BadRequest,
            ..
        }
    ));
}
