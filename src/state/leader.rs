//! Leadership is a pure function of the latest room snapshot.
//!
//! Nothing here is cached: callers recompute on every snapshot, so a leader that disconnects is
//! replaced as soon as the remaining participants observe the next snapshot.

use crate::dao::models::RoomDocument;

/// Earliest-joined participant still marked connected, if any.
pub fn elect(room: &RoomDocument) -> Option<&str> {
    room.participants
        .iter()
        .filter(|(_, info)| info.is_connected)
        .min_by_key(|(_, info)| info.join_order)
        .map(|(id, _)| id.as_str())
}

/// Participant currently authoritative for `room`.
///
/// An explicit `leader_id` wins while it names a present, connected participant; otherwise the
/// leader is recomputed from join order.
pub fn current_leader(room: &RoomDocument) -> Option<&str> {
    let explicit = room.leader_id.as_deref().filter(|id| {
        room.participants
            .get(*id)
            .is_some_and(|participant| participant.is_connected)
    });
    explicit.or_else(|| elect(room))
}

pub fn is_leader(room: &RoomDocument, participant_id: &str) -> bool {
    current_leader(room) == Some(participant_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::ParticipantInfo;

    fn room_with(participants: &[(&str, u64, bool)]) -> RoomDocument {
        let mut room = RoomDocument::new("room-1", "science");
        for (id, join_order, is_connected) in participants {
            room.participants.insert(
                (*id).into(),
                ParticipantInfo {
                    username: id.to_uppercase(),
                    score: 0,
                    join_order: *join_order,
                    is_connected: *is_connected,
                },
            );
        }
        room
    }

    #[test]
    fn empty_room_has_no_leader() {
        let room = room_with(&[]);
        assert_eq!(current_leader(&room), None);
        assert!(!is_leader(&room, "anyone"));
    }

    #[test]
    fn earliest_connected_participant_leads() {
        let room = room_with(&[("b", 2, true), ("a", 1, true), ("c", 3, true)]);
        assert!(is_leader(&room, "a"));
        assert!(!is_leader(&room, "b"));
    }

    #[test]
    fn disconnected_leader_is_replaced() {
        let mut room = room_with(&[("a", 1, false), ("b", 2, true)]);
        room.leader_id = Some("a".into());
        assert!(is_leader(&room, "b"));
        assert!(!is_leader(&room, "a"));
    }

    #[test]
    fn explicit_leader_takes_precedence() {
        let mut room = room_with(&[("a", 1, true), ("b", 2, true)]);
        room.leader_id = Some("b".into());
        assert!(is_leader(&room, "b"));
        assert!(!is_leader(&room, "a"));

        room.leader_id = Some("ghost".into());
        assert!(is_leader(&room, "a"));
    }

    #[test]
    fn absent_participant_is_never_leader() {
        let room = room_with(&[("a", 1, true)]);
        assert!(!is_leader(&room, "z"));
    }
}
