//! Property-based tests for signaling payload decoding
//!
//! Anything off the wire that is not a well-formed offer, answer or
//! candidate must be rejected rather than half-parsed.

use proptest::prelude::*;
use serde_json::json;
use xfcall::shared::{SignalKind, SignalingMessage};

fn id() -> impl Strategy<Value = String> {
    "[a-z]{1,10}"
}

proptest! {
    #[test]
    fn test_well_formed_offer_decodes(from in id(), target in id(), sdp in "v=0\r\n[a-z=0-9 ]{0,40}") {
        let payload = json!({
            "fromUserId": from,
            "targetUserId": target,
            "offer": { "type": "offer", "sdp": sdp },
        });
        let message = SignalingMessage::from_broadcast("offer", &payload).unwrap();
        prop_assert_eq!(message.kind(), SignalKind::Offer);
        prop_assert_eq!(message.sender().as_str(), from.as_str());
        prop_assert_eq!(message.target().as_str(), target.as_str());
    }

    #[test]
    fn test_missing_routing_field_is_rejected(from in id(), target in id(), drop_from in any::<bool>()) {
        let mut payload = json!({
            "fromUserId": from,
            "targetUserId": target,
            "answer": { "type": "answer", "sdp": "v=0\r\n" },
        });
        let field = if drop_from { "fromUserId" } else { "targetUserId" };
        payload.as_object_mut().unwrap().remove(field);
        prop_assert!(SignalingMessage::from_broadcast("answer", &payload).is_err());
    }

    #[test]
    fn test_description_type_must_match_event(from in id(), target in id()) {
        let payload = json!({
            "fromUserId": from,
            "targetUserId": target,
            "answer": { "type": "offer", "sdp": "v=0\r\n" },
        });
        prop_assert!(SignalingMessage::from_broadcast("answer", &payload).is_err());
    }

    #[test]
    fn test_unknown_events_are_rejected(event in "[a-z]{1,12}") {
        prop_assume!(SignalKind::from_event_name(&event).is_none());
        let payload = json!({ "fromUserId": "alice", "targetUserId": "bob" });
        prop_assert!(SignalingMessage::from_broadcast(&event, &payload).is_err());
    }

    #[test]
    fn test_arbitrary_json_strings_never_decode(text in ".*") {
        let payload = serde_json::Value::String(text);
        for event in ["offer", "answer", "candidate"] {
            prop_assert!(SignalingMessage::from_broadcast(event, &payload).is_err());
        }
    }
}

#[test]
fn test_empty_candidate_is_rejected() {
    let payload = json!({
        "fromUserId": "alice",
        "targetUserId": "bob",
        "candidate": { "candidate": "", "sdpMid": "0", "sdpMLineIndex": 0 },
    });
    assert!(SignalingMessage::from_broadcast("candidate", &payload).is_err());
}

#[test]
fn test_blank_sender_is_rejected() {
    let payload = json!({
        "fromUserId": " ",
        "targetUserId": "bob",
        "offer": { "type": "offer", "sdp": "v=0\r\n" },
    });
    assert!(SignalingMessage::from_broadcast("offer", &payload).is_err());
}
