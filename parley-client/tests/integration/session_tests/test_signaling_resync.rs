use parley_client::{PeerState, SessionEvent};
use parley_core::{MediaState, ParticipantId, RoomId, SignalBody};

use super::is_state;
use crate::integration::{init_tracing, start_scripted_session};
use crate::utils::{participant_list, signal_from};

fn recording() -> SignalBody {
    SignalBody::MediaStateChanged {
        media: MediaState {
            recording: true,
            ..MediaState::default()
        },
    }
}

fn left(event: &SessionEvent, participant: &ParticipantId) -> bool {
    matches!(event, SessionEvent::ParticipantLeft { participant: p } if p == participant)
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resyncs_peer_records() {
    init_tracing();

    let room = RoomId::from("r1");
    let bob = ParticipantId::from("bob");
    let carol = ParticipantId::from("carol");

    let (session, mut events, backends, mut links) = start_scripted_session();
    session
        .join_room(room.clone(), ParticipantId::from("alice"), None)
        .await
        .unwrap();

    let mut relay = links.recv().await.unwrap();
    relay.recv_kind("join").await;
    relay.send(participant_list("r1", &["bob", "carol", "alice"], false));

    // Alice offers to both; only bob answers.
    loop {
        let offer = relay.recv_kind("offer").await;
        if offer.to_participant.as_ref() == Some(&bob) {
            assert_eq!(offer.seq, Some(1));
            break;
        }
    }
    relay.send(
        signal_from(
            "r1",
            "bob",
            "alice",
            SignalBody::Answer {
                sdp: "bob-answer".into(),
            },
        )
        .with_seq(1),
    );
    events
        .wait_for(|e| is_state(e, &bob, PeerState::Connected))
        .await;

    // The link drops; the channel reconnects and rejoins on its own.
    relay.drop_link();
    let mut relay = links.recv().await.unwrap();
    let rejoin = relay.recv_kind("join").await;
    assert_eq!(rejoin.room_id, room);

    // The relay never noticed: bob's live record stays, carol is gone.
    relay.send(participant_list("r1", &["bob", "alice"], true));
    relay.send(signal_from("r1", "bob", "alice", recording()));
    events
        .wait_for(|e| matches!(
            e,
            SessionEvent::RemoteMediaStateChanged { participant, media }
                if *participant == bob && media.recording
        ))
        .await;

    assert!(events.seen().iter().any(|e| left(e, &carol)));
    assert!(!events.seen().iter().any(|e| left(e, &bob)));
    assert_eq!(
        session.peers().await,
        vec![(bob.clone(), PeerState::Connected)]
    );
    assert_eq!(backends.created_for(&bob), 1);

    // Second drop; this time the relay had already processed the leave and
    // hands out a fresh list.
    relay.drop_link();
    let mut relay = links.recv().await.unwrap();
    relay.recv_kind("join").await;
    relay.send(participant_list("r1", &["bob", "alice"], false));

    let offer = relay.recv_kind("offer").await;
    assert_eq!(offer.to_participant, Some(bob.clone()));
    assert_eq!(offer.seq, Some(1));
    assert_eq!(backends.created_for(&bob), 2);
    assert_eq!(
        session.peer_state(&bob).await,
        Some(PeerState::OfferSent)
    );
    assert!(!events.drain().await.iter().any(|e| left(e, &bob)));
}
