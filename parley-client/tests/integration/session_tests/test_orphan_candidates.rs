use parley_client::{ClientConfig, SdpKind};
use parley_core::{IceCandidate, ParticipantId, RoomId, SignalBody};
use std::time::Duration;

use crate::integration::{init_tracing, start_scripted_session};
use crate::utils::{BackendCall, participant_list, signal_from};

fn candidate(n: u32) -> SignalBody {
    SignalBody::Candidate(IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000 typ host"),
        sdp_mid: Some("0".into()),
        sdp_m_line_index: Some(0),
    })
}

fn offer(sdp: &str) -> SignalBody {
    SignalBody::Offer { sdp: sdp.into() }
}

/// Calls that matter for ordering; track attachment happens at record creation.
fn negotiation_calls(calls: Vec<BackendCall>) -> Vec<BackendCall> {
    calls
        .into_iter()
        .filter(|c| !matches!(c, BackendCall::AttachTracks(_)))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_candidates_before_offer_are_fed_to_the_new_record() {
    init_tracing();

    let (session, _events, backends, mut links) = start_scripted_session();
    session
        .join_room(RoomId::from("r1"), ParticipantId::from("alice"), None)
        .await
        .unwrap();
    let mut relay = links.recv().await.unwrap();
    relay.recv_kind("join").await;
    relay.send(participant_list("r1", &["alice"], false));

    // Carol's candidates overtake her offer.
    relay.send(signal_from("r1", "carol", "alice", candidate(1)));
    relay.send(signal_from("r1", "carol", "alice", candidate(2)));
    relay.send(signal_from("r1", "carol", "alice", offer("carol-offer")).with_seq(1));

    let answer = relay.recv_kind("answer").await;
    assert_eq!(answer.to_participant, Some(ParticipantId::from("carol")));
    assert_eq!(answer.seq, Some(1));

    let carol = ParticipantId::from("carol");
    assert_eq!(backends.created_for(&carol), 1);
    assert_eq!(
        negotiation_calls(backends.calls_for(&carol)),
        vec![
            BackendCall::SetRemote(SdpKind::Offer, "carol-offer".into()),
            BackendCall::AddCandidate("candidate:1 1 udp 2122260223 10.0.0.1 5000 typ host".into()),
            BackendCall::AddCandidate("candidate:2 1 udp 2122260223 10.0.0.2 5000 typ host".into()),
            BackendCall::CreateAnswer,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unclaimed_candidates_expire() {
    init_tracing();

    let ttl = ClientConfig::default().pending_candidate_ttl;
    let (session, _events, backends, mut links) = start_scripted_session();
    session
        .join_room(RoomId::from("r1"), ParticipantId::from("alice"), None)
        .await
        .unwrap();
    let mut relay = links.recv().await.unwrap();
    relay.recv_kind("join").await;
    relay.send(participant_list("r1", &["alice"], false));

    relay.send(signal_from("r1", "carol", "alice", candidate(1)));
    // Let the session buffer it before the clock moves.
    tokio::time::sleep(Duration::from_millis(10)).await;

    tokio::time::advance(ttl + Duration::from_secs(1)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    relay.send(signal_from("r1", "carol", "alice", offer("carol-offer")).with_seq(1));
    relay.recv_kind("answer").await;

    let carol = ParticipantId::from("carol");
    assert_eq!(
        negotiation_calls(backends.calls_for(&carol)),
        vec![
            BackendCall::SetRemote(SdpKind::Offer, "carol-offer".into()),
            BackendCall::CreateAnswer,
        ]
    );

    // Candidates for a live record go straight to it.
    relay.send(signal_from("r1", "carol", "alice", candidate(3)));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        backends.calls_for(&carol).last(),
        Some(&BackendCall::AddCandidate(
            "candidate:3 1 udp 2122260223 10.0.0.3 5000 typ host".into()
        ))
    );
}
