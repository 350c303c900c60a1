use std::collections::HashSet;

use parley_core::{MediaState, ParticipantId, RoomId};

use crate::integration::{create_test_registry, init_tracing};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_are_totally_ordered() {
    init_tracing();

    let (registry, signaling) = create_test_registry();
    let room = RoomId::from("busy-room");

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let registry = registry.clone();
            let room = room.clone();
            tokio::spawn(async move {
                let participant = ParticipantId::from(format!("p{i:02}"));
                let snapshot = registry
                    .join(&room, &participant, MediaState::default())
                    .await
                    .expect("Join failed");
                (participant, snapshot)
            })
        })
        .collect();

    let mut sizes = HashSet::new();
    let mut results = Vec::new();
    for handle in handles {
        let (participant, snapshot) = handle.await.unwrap();
        assert!(!snapshot.iter().any(|p| p.participant_id == participant));
        sizes.insert(snapshot.len());
        results.push((participant, snapshot));
    }

    // Each joiner saw a distinct prefix of the final membership.
    assert_eq!(sizes, (0..20).collect::<HashSet<_>>());

    let members = registry.snapshot(&room).await.expect("Room should exist");
    assert_eq!(members.len(), 20);

    // Everyone learned about exactly the members that arrived after them.
    for (participant, snapshot) in &results {
        let joins = signaling
            .kinds_for(participant)
            .await
            .into_iter()
            .filter(|k| *k == "join")
            .count();
        assert_eq!(joins, 19 - snapshot.len(), "{participant} join count");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_join_and_leave_leaves_no_phantoms() {
    init_tracing();

    let (registry, _signaling) = create_test_registry();
    let room = RoomId::from("churn");

    for round in 0..10 {
        let stayer = ParticipantId::from(format!("stay-{round}"));
        let leaver = ParticipantId::from(format!("leave-{round}"));

        registry
            .join(&room, &leaver, MediaState::default())
            .await
            .unwrap();

        let leave = {
            let registry = registry.clone();
            let room = room.clone();
            let leaver = leaver.clone();
            tokio::spawn(async move { registry.leave(&room, &leaver, None).await })
        };
        let join = {
            let registry = registry.clone();
            let room = room.clone();
            let stayer = stayer.clone();
            tokio::spawn(async move {
                registry
                    .join(&room, &stayer, MediaState::default())
                    .await
                    .unwrap()
            })
        };

        leave.await.unwrap();
        join.await.unwrap();

        let members = registry.snapshot(&room).await.expect("Stayer keeps the room alive");
        let ids: Vec<_> = members.into_iter().map(|p| p.participant_id).collect();
        assert_eq!(ids, vec![stayer.clone()], "round {round}");

        registry.leave(&room, &stayer, None).await;
    }
}
