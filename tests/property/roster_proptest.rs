//! Property-based tests for roster derivation from presence state

use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use xfcall::shared::{ParticipantId, Roster};

fn presence_state(users: &[(String, usize)]) -> HashMap<String, Vec<serde_json::Value>> {
    users
        .iter()
        .map(|(user, tabs)| {
            let metas = (0..*tabs)
                .map(|i| json!({ "user_id": user, "online_at": format!("2026-10-18T10:00:0{}Z", i % 10) }))
                .collect();
            (user.clone(), metas)
        })
        .collect()
}

proptest! {
    #[test]
    fn test_roster_is_sorted_and_unique(
        users in prop::collection::vec(("[a-z]{1,8}", 1usize..4), 0..8),
    ) {
        let roster = Roster::from_presence_state(&presence_state(&users));
        let ids: Vec<&str> = roster.iter().map(ParticipantId::as_str).collect();

        let mut expected: Vec<&str> = users.iter().map(|(u, _)| u.as_str()).collect();
        expected.sort();
        expected.dedup();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn test_peers_exclude_local(
        users in prop::collection::vec("[a-z]{1,8}", 1..8),
        pick in any::<prop::sample::Index>(),
    ) {
        let state = presence_state(&users.iter().map(|u| (u.clone(), 1)).collect::<Vec<_>>());
        let roster = Roster::from_presence_state(&state);
        let local = ParticipantId::new(pick.get(&users).clone()).unwrap();

        let peers = roster.peers(&local);
        prop_assert!(roster.contains(&local));
        prop_assert!(!peers.contains(&local));
        prop_assert_eq!(peers.len(), roster.len() - 1);
    }
}

#[test]
fn test_missing_identity_falls_back_to_key_and_blank_is_dropped() {
    let mut state = HashMap::new();
    state.insert("alice".to_string(), vec![json!({ "user_id": "alice" })]);
    state.insert("dave".to_string(), vec![json!({ "online_at": "2026-10-18T10:00:00Z" })]);
    state.insert("blank".to_string(), vec![json!({ "user_id": "  " })]);

    let roster = Roster::from_presence_state(&state);
    let ids: Vec<&str> = roster.iter().map(ParticipantId::as_str).collect();
    assert_eq!(ids, vec!["alice", "dave"]);
}
