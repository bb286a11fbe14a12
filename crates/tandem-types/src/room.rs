//! Room identifiers.
//!
//! A room is the conversation between exactly two users, keyed by
//! `"{a}_{b}"`. Ids are not canonicalized: `alice_bob` and `bob_alice` are
//! different rooms, and clients must build them consistently.

pub const ROOM_SEPARATOR: char = '_';

/// Build the room id for two participants, in the order given.
pub fn room_id(a: &str, b: &str) -> String {
    format!("{a}{ROOM_SEPARATOR}{b}")
}

/// The other participant of `room_id` as seen by `me`.
///
/// Defined only when the id splits into exactly two segments and `me` is
/// one of them.
pub fn partner<'a>(room_id: &'a str, me: &str) -> Option<&'a str> {
    let mut parts = room_id.split(ROOM_SEPARATOR);
    let (first, second) = (parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    if first == me {
        Some(second)
    } else if second == me {
        Some(first)
    } else {
        None
    }
}

pub fn is_member(room_id: &str, username: &str) -> bool {
    partner(room_id, username).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partner_from_either_side() {
        assert_eq!(partner("alice_bob", "alice"), Some("bob"));
        assert_eq!(partner("alice_bob", "bob"), Some("alice"));
    }

    #[test]
    fn order_is_preserved() {
        assert_eq!(room_id("bob", "alice"), "bob_alice");
        assert_ne!(room_id("alice", "bob"), room_id("bob", "alice"));
    }

    #[test]
    fn non_member_has_no_partner() {
        assert_eq!(partner("alice_bob", "carol"), None);
        // substring of a member name is not membership
        assert_eq!(partner("joanna_bob", "ann"), None);
    }

    #[test]
    fn malformed_ids_have_no_partner() {
        assert_eq!(partner("alice", "alice"), None);
        assert_eq!(partner("a_b_c", "a"), None);
        assert_eq!(partner("", "alice"), None);
    }

    #[test]
    fn self_room_partners_with_self() {
        assert_eq!(partner("alice_alice", "alice"), Some("alice"));
    }
}
