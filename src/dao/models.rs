use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Room-level lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Participants are gathering; no question is live.
    Waiting,
    /// A question sequence is being played.
    InProgress,
    /// The last question has been settled; nothing else is honoured.
    Finished,
}

/// Outcome of the question that is currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// Nobody has been credited yet and the timer has not expired.
    Pending,
    /// A participant answered correctly first.
    Correct,
    /// The question timer expired.
    Timeout,
}

/// Per-question sub-state stored on the room document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurrentState {
    pub answer_status: AnswerStatus,
    pub is_revealed: bool,
    #[serde(default)]
    pub answerer_id: Option<String>,
}

impl CurrentState {
    /// Fresh state for a question nobody has answered yet.
    pub fn pending() -> Self {
        Self {
            answer_status: AnswerStatus::Pending,
            is_revealed: false,
            answerer_id: None,
        }
    }

    /// Revealed state after a participant won the question.
    pub fn solved_by(participant_id: impl Into<String>) -> Self {
        Self {
            answer_status: AnswerStatus::Correct,
            is_revealed: true,
            answerer_id: Some(participant_id.into()),
        }
    }

    /// Revealed state after the question timer expired.
    pub fn timed_out() -> Self {
        Self {
            answer_status: AnswerStatus::Timeout,
            is_revealed: true,
            answerer_id: None,
        }
    }
}

impl Default for CurrentState {
    fn default() -> Self {
        Self::pending()
    }
}

/// Per-room record for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub username: String,
    #[serde(default)]
    pub score: i64,
    /// Stable token handed out at room entry; lower joined earlier.
    pub join_order: u64,
    #[serde(default = "default_connected")]
    pub is_connected: bool,
}

fn default_connected() -> bool {
    true
}

/// The unit of synchronization: one document per room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDocument {
    pub room_id: String,
    pub status: RoomStatus,
    pub genre: String,
    /// Game counter, bumped each time a game starts. Question indices restart at 0 every round.
    #[serde(default)]
    pub round: u64,
    #[serde(default)]
    pub current_quiz_index: usize,
    #[serde(default)]
    pub current_state: CurrentState,
    /// Participants keyed by id, kept in join order.
    #[serde(default)]
    pub participants: IndexMap<String, ParticipantInfo>,
    #[serde(default)]
    pub leader_id: Option<String>,
    /// Next join-order token to hand out.
    #[serde(default)]
    pub next_join_order: u64,
    /// Incremented by the store on every committed write.
    #[serde(default)]
    pub version: u64,
}

impl RoomDocument {
    /// Build an empty waiting room for the given genre.
    pub fn new(room_id: impl Into<String>, genre: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            status: RoomStatus::Waiting,
            genre: genre.into(),
            round: 0,
            current_quiz_index: 0,
            current_state: CurrentState::pending(),
            participants: IndexMap::new(),
            leader_id: None,
            next_join_order: 0,
            version: 0,
        }
    }

    /// Number of participants still marked connected.
    pub fn connected_count(&self) -> usize {
        self.participants
            .values()
            .filter(|participant| participant.is_connected)
            .count()
    }

    /// Participants sorted by score (descending), ties broken by join order.
    pub fn ranking(&self) -> Vec<(&str, &ParticipantInfo)> {
        let mut ranked: Vec<_> = self
            .participants
            .iter()
            .map(|(id, info)| (id.as_str(), info))
            .collect();
        ranked.sort_by(|(_, a), (_, b)| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.join_order.cmp(&b.join_order))
        });
        ranked
    }
}

/// Kind of quiz item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    /// Pick one of the offered choices; judged by exact match.
    MultipleChoice,
    /// Free text; judged after case/whitespace normalisation.
    Input,
}

/// Immutable quiz content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub quiz_id: String,
    pub title: String,
    pub question: String,
    #[serde(rename = "type")]
    pub kind: QuizType,
    #[serde(default)]
    pub choices: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub acceptable_answers: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    pub genre: String,
}

/// Expected prior values a conditional write is checked against.
///
/// Every `Some` field must match the committed document for the write to apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Precondition {
    pub status: Option<RoomStatus>,
    pub round: Option<u64>,
    pub quiz_index: Option<usize>,
    pub answer_status: Option<AnswerStatus>,
    pub revealed: Option<bool>,
    pub version: Option<u64>,
    /// Participant that must be present in the room.
    pub participant: Option<String>,
}

impl Precondition {
    /// Unconditional write.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: RoomStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_round(mut self, round: u64) -> Self {
        self.round = Some(round);
        self
    }

    pub fn with_quiz_index(mut self, index: usize) -> Self {
        self.quiz_index = Some(index);
        self
    }

    pub fn with_answer_status(mut self, status: AnswerStatus) -> Self {
        self.answer_status = Some(status);
        self
    }

    pub fn with_revealed(mut self, revealed: bool) -> Self {
        self.revealed = Some(revealed);
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_participant(mut self, participant_id: impl Into<String>) -> Self {
        self.participant = Some(participant_id.into());
        self
    }

    /// Check the expectation against a committed document.
    pub fn holds(&self, room: &RoomDocument) -> bool {
        self.status.is_none_or(|status| room.status == status)
            && self.round.is_none_or(|round| room.round == round)
            && self
                .quiz_index
                .is_none_or(|index| room.current_quiz_index == index)
            && self
                .answer_status
                .is_none_or(|status| room.current_state.answer_status == status)
            && self
                .revealed
                .is_none_or(|revealed| room.current_state.is_revealed == revealed)
            && self.version.is_none_or(|version| room.version == version)
            && self
                .participant
                .as_ref()
                .is_none_or(|id| room.participants.contains_key(id))
    }
}

/// Field-level changes applied atomically to a room document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomPatch {
    pub status: Option<RoomStatus>,
    pub round: Option<u64>,
    pub current_quiz_index: Option<usize>,
    pub current_state: Option<CurrentState>,
    /// `Some(None)` clears the leader.
    pub leader_id: Option<Option<String>>,
    /// Added to an existing participant's score.
    pub score_increment: Option<(String, i64)>,
    /// Inserted, or replacing the existing record under the same id.
    pub upsert_participant: Option<(String, ParticipantInfo)>,
    pub remove_participant: Option<String>,
    pub set_connected: Option<(String, bool)>,
    pub next_join_order: Option<u64>,
    /// Zero every participant's score (room reset only).
    pub reset_scores: bool,
}

impl RoomPatch {
    /// Apply the patch in place. Does not touch `version`.
    pub fn apply(self, room: &mut RoomDocument) {
        if let Some(status) = self.status {
            room.status = status;
        }
        if let Some(round) = self.round {
            room.round = round;
        }
        if let Some(index) = self.current_quiz_index {
            room.current_quiz_index = index;
        }
        if let Some(state) = self.current_state {
            room.current_state = state;
        }
        if let Some(leader_id) = self.leader_id {
            room.leader_id = leader_id;
        }
        if let Some((id, info)) = self.upsert_participant {
            room.participants.insert(id, info);
        }
        if let Some(id) = self.remove_participant {
            room.participants.shift_remove(&id);
        }
        if let Some((id, connected)) = self.set_connected {
            if let Some(participant) = room.participants.get_mut(&id) {
                participant.is_connected = connected;
            }
        }
        if self.reset_scores {
            for participant in room.participants.values_mut() {
                participant.score = 0;
            }
        }
        if let Some((id, delta)) = self.score_increment {
            if let Some(participant) = room.participants.get_mut(&id) {
                participant.score += delta;
            }
        }
        if let Some(next) = self.next_join_order {
            room.next_join_order = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(name: &str, join_order: u64, score: i64) -> ParticipantInfo {
        ParticipantInfo {
            username: name.into(),
            score,
            join_order,
            is_connected: true,
        }
    }

    #[test]
    fn precondition_checks_every_expected_field() {
        let mut room = RoomDocument::new("room-1", "science");
        room.status = RoomStatus::InProgress;
        room.current_quiz_index = 2;
        room.participants
            .insert("alice".into(), participant("Alice", 0, 0));

        let expected = Precondition::none()
            .with_status(RoomStatus::InProgress)
            .with_quiz_index(2)
            .with_answer_status(AnswerStatus::Pending)
            .with_revealed(false)
            .with_participant("alice");
        assert!(expected.holds(&room));

        assert!(!expected.clone().with_quiz_index(3).holds(&room));
        assert!(!expected.clone().with_round(1).holds(&room));
        assert!(expected.clone().with_round(0).holds(&room));
        assert!(!expected.clone().with_participant("bob").holds(&room));
        assert!(!expected.with_version(7).holds(&room));
        assert!(Precondition::none().holds(&room));
    }

    #[test]
    fn patch_applies_score_after_reset() {
        let mut room = RoomDocument::new("room-1", "science");
        room.participants
            .insert("alice".into(), participant("Alice", 0, 30));
        room.participants.insert("bob".into(), participant("Bob", 1, 20));

        RoomPatch {
            reset_scores: true,
            score_increment: Some(("bob".into(), 10)),
            ..Default::default()
        }
        .apply(&mut room);

        assert_eq!(room.participants["alice"].score, 0);
        assert_eq!(room.participants["bob"].score, 10);
    }

    #[test]
    fn score_increment_for_unknown_participant_is_ignored() {
        let mut room = RoomDocument::new("room-1", "science");
        RoomPatch {
            score_increment: Some(("ghost".into(), 10)),
            ..Default::default()
        }
        .apply(&mut room);
        assert!(room.participants.is_empty());
    }

    #[test]
    fn ranking_orders_by_score_then_join_order() {
        let mut room = RoomDocument::new("room-1", "science");
        room.participants.insert("late".into(), participant("Late", 3, 20));
        room.participants
            .insert("early".into(), participant("Early", 1, 20));
        room.participants.insert("top".into(), participant("Top", 2, 40));

        let order: Vec<_> = room.ranking().into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec!["top", "early", "late"]);
    }

    #[test]
    fn room_document_uses_camel_case_fields() {
        let room = RoomDocument::new("room-1", "science");
        let value = serde_json::to_value(&room).unwrap();
        assert_eq!(value["currentQuizIndex"], 0);
        assert_eq!(value["status"], "waiting");
        assert_eq!(value["currentState"]["answerStatus"], "pending");
        assert_eq!(value["currentState"]["isRevealed"], false);
    }
}
