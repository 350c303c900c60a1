use parley_client::{NegotiationRole, OfferOutcome, PeerState, SdpKind};

use crate::integration::{create_test_manager, init_tracing};
use crate::utils::BackendCall;

#[tokio::test]
async fn test_smaller_id_keeps_its_offer() {
    init_tracing();

    let (mut alice, calls) = create_test_manager("alice", "bob", NegotiationRole::Initiator);
    alice.start_offer().await.unwrap();

    let outcome = alice.handle_offer("bob-offer".into(), Some(1)).await.unwrap();

    assert_eq!(outcome, OfferOutcome::Ignored);
    assert_eq!(alice.state(), PeerState::OfferSent);
    assert_eq!(alice.role(), NegotiationRole::Initiator);
    assert_eq!(*calls.lock().unwrap(), vec![BackendCall::CreateOffer]);

    // Bob's answer to our offer still completes the negotiation.
    alice.handle_answer("bob-answer".into(), Some(1)).await.unwrap();
    assert_eq!(alice.state(), PeerState::Connecting);
}

#[tokio::test]
async fn test_larger_id_yields_and_answers() {
    init_tracing();

    let (mut bob, calls) = create_test_manager("bob", "alice", NegotiationRole::Initiator);
    bob.start_offer().await.unwrap();

    let outcome = bob.handle_offer("alice-offer".into(), Some(1)).await.unwrap();

    let OfferOutcome::Answer(answer) = outcome else {
        panic!("expected bob to answer");
    };
    assert_eq!(answer.seq, Some(1));
    assert_eq!(bob.state(), PeerState::AnswerSent);
    assert_eq!(bob.role(), NegotiationRole::Responder);
    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            BackendCall::CreateOffer,
            BackendCall::SetRemote(SdpKind::Offer, "alice-offer".into()),
            BackendCall::CreateAnswer,
        ]
    );

    bob.mark_answer_sent().unwrap();
    assert_eq!(bob.state(), PeerState::Connecting);
    assert!(bob.on_transport_connected().unwrap());
    assert_eq!(bob.state(), PeerState::Connected);
}
