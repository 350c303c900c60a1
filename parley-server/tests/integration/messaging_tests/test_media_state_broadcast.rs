use parley_core::{MediaState, ParticipantId, RoomId, SignalBody};

use crate::integration::{create_test_registry, init_tracing};

#[tokio::test]
async fn test_media_state_change_reaches_others_and_snapshot() {
    init_tracing();

    let (registry, signaling) = create_test_registry();
    let room = RoomId::from("lesson-1");
    let ana = ParticipantId::from("ana");
    let ben = ParticipantId::from("ben");

    registry.join(&room, &ana, MediaState::default()).await.unwrap();
    registry.join(&room, &ben, MediaState::default()).await.unwrap();
    signaling.clear().await;

    let muted = MediaState {
        audio_enabled: false,
        screen_sharing: true,
        ..MediaState::default()
    };
    registry.update_media(&room, &ana, muted).await;

    let members = registry.snapshot(&room).await.unwrap();
    assert_eq!(members[0].participant_id, ana);
    assert_eq!(members[0].media, muted);

    let received = signaling.messages_for(&ben).await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].from_participant, ana);
    assert_eq!(received[0].body, SignalBody::MediaStateChanged { media: muted });
    assert!(signaling.messages_for(&ana).await.is_empty());
}

#[tokio::test]
async fn test_late_joiner_sees_current_media_state() {
    init_tracing();

    let (registry, _signaling) = create_test_registry();
    let room = RoomId::from("lesson-1");
    let ana = ParticipantId::from("ana");

    let camera_off = MediaState {
        video_enabled: false,
        ..MediaState::default()
    };
    registry.join(&room, &ana, camera_off).await.unwrap();

    let snapshot = registry
        .join(&room, &ParticipantId::from("ben"), MediaState::default())
        .await
        .unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(!snapshot[0].media.video_enabled);
}
