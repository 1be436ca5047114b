use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::{CurrentState, RoomDocument, RoomStatus},
    state::leader::current_leader,
};

/// One line of the scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub participant_id: String,
    pub username: String,
    pub score: i64,
    pub is_connected: bool,
}

/// Read-only projection of a room served over HTTP and SSE.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub room_id: String,
    pub status: RoomStatus,
    pub genre: String,
    /// Game counter of the room.
    pub round: u64,
    pub current_quiz_index: usize,
    pub current_state: CurrentState,
    /// Leader derived from the snapshot, not the stored hint.
    pub leader_id: Option<String>,
    pub ranking: Vec<RankingEntry>,
    pub version: u64,
}

impl From<&RoomDocument> for RoomView {
    fn from(room: &RoomDocument) -> Self {
        Self {
            room_id: room.room_id.clone(),
            status: room.status,
            genre: room.genre.clone(),
            round: room.round,
            current_quiz_index: room.current_quiz_index,
            current_state: room.current_state.clone(),
            leader_id: current_leader(room).map(str::to_owned),
            ranking: room
                .ranking()
                .into_iter()
                .map(|(id, info)| RankingEntry {
                    participant_id: id.to_owned(),
                    username: info.username.clone(),
                    score: info.score,
                    is_connected: info.is_connected,
                })
                .collect(),
            version: room.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::ParticipantInfo;

    #[test]
    fn view_ranks_participants_and_derives_leader() {
        let mut room = RoomDocument::new("room-1", "science");
        for (id, order, score, connected) in [("a", 0, 10, false), ("b", 1, 30, true), ("c", 2, 10, true)] {
            room.participants.insert(
                id.into(),
                ParticipantInfo {
                    username: id.to_uppercase(),
                    score,
                    join_order: order,
                    is_connected: connected,
                },
            );
        }
        room.leader_id = Some("a".into());

        let view = RoomView::from(&room);
        assert_eq!(view.leader_id.as_deref(), Some("b"));
        let order: Vec<_> = view.ranking.iter().map(|entry| entry.participant_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["ranking"][0]["participantId"], "b");
    }
}
