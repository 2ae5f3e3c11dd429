//! Property-based tests for participant identities and the offer tie-break

use proptest::prelude::*;
use xfcall::shared::{ParticipantId, RoomId};

proptest! {
    #[test]
    fn test_exactly_one_side_initiates(
        a in "[a-z0-9-]{1,16}",
        b in "[a-z0-9-]{1,16}",
    ) {
        prop_assume!(a != b);
        let a = ParticipantId::new(a).unwrap();
        let b = ParticipantId::new(b).unwrap();
        prop_assert!(a.initiates_with(&b) != b.initiates_with(&a));
    }

    #[test]
    fn test_nobody_initiates_with_themselves(id in "[a-z0-9-]{1,16}") {
        let id = ParticipantId::new(id).unwrap();
        prop_assert!(!id.initiates_with(&id));
    }

    #[test]
    fn test_blank_identities_are_rejected(blank in "[ \t]{0,8}") {
        prop_assert!(ParticipantId::new(blank.clone()).is_err());
        prop_assert!(RoomId::new(blank).is_err());
    }

    #[test]
    fn test_topic_embeds_room(room in "[a-z0-9-]{1,24}") {
        let topic = RoomId::new(room.clone()).unwrap().topic("call");
        prop_assert_eq!(topic, format!("call:{}", room));
    }
}
