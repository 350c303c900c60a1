use parley_client::{MediaError, SessionError, SessionEvent};
use parley_core::{ParticipantId, RoomId};

use crate::integration::{init_tracing, spawn_test_relay, start_test_session, test_config};
use crate::utils::FakeMedia;

#[tokio::test]
async fn test_media_acquisition_failure_aborts_join() {
    init_tracing();

    let (addr, relay) = spawn_test_relay().await;
    let (session, mut events, _backends) =
        start_test_session(test_config(addr), FakeMedia::failing());

    let err = session
        .join_room(RoomId::from("r1"), ParticipantId::from("alice"), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Media(MediaError::AcquisitionFailed(_))
    ));

    events
        .wait_for(|e| matches!(e, SessionEvent::MediaError(MediaError::AcquisitionFailed(_))))
        .await;

    // Nothing reached the relay and the session is still usable.
    assert!(relay.registry.snapshot(&RoomId::from("r1")).await.is_none());
    session.leave_room().await;
    assert!(session.peers().await.is_empty());

    session.close().await;
    assert!(matches!(
        session.toggle_video().await,
        Err(SessionError::Closed)
    ));
}
