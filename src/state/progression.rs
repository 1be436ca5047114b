//! Room state machine: `waiting -> in_progress -> finished`, with each question going
//! `pending -> {correct | timeout} (revealed) -> advance`.
//!
//! Every transition more than one client may attempt is a conditional write on the room
//! document. `check_and_progress_game` is the only place that moves `current_quiz_index`.

use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    dao::{
        models::{AnswerStatus, CurrentState, Precondition, Quiz, RoomDocument, RoomPatch, RoomStatus},
        quiz_provider::QuizProvider,
        room_store::RoomStore,
        storage::StorageError,
    },
    error::EngineError,
    services::scoring::ScoringRules,
    state::{
        answer::is_correct,
        leader::is_leader,
        timer::{OnFire, Scheduler, TimerCoordinator},
    },
};

/// Result of a submission against the live question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// This submission won the question; `score` is the submitter's committed score.
    Accepted { score: i64 },
    /// Wrong answer while the question was still pending. The room is unchanged.
    Incorrect,
    /// The question is not accepting answers (already revealed, advanced or not running).
    Rejected,
}

/// An [`AnswerOutcome`] together with the round it was judged in and the room size then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgedAnswer {
    pub round: u64,
    pub participants: usize,
    pub outcome: AnswerOutcome,
}

/// Result of one `check_and_progress_game` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Moved to the question at `index`.
    Advanced { index: usize },
    /// The last question was settled; the room is finished.
    Finished,
    /// Nothing to do: the question is not revealed, the room is not running or another
    /// client progressed first.
    Idle,
    /// This client is not the leader of the room.
    NotLeader,
}

/// Game progression as seen from one participant's client.
pub struct GameEngine {
    participant_id: String,
    store: Arc<dyn RoomStore>,
    quizzes: Arc<dyn QuizProvider>,
    scheduler: Arc<dyn Scheduler>,
    timer: TimerCoordinator,
    rules: ScoringRules,
    reveal_hold: Duration,
    sequences: DashMap<String, Arc<[Quiz]>>,
    /// Question (round, index) whose progression is queued, per room.
    pending_progress: DashMap<String, (u64, usize)>,
}

impl GameEngine {
    pub fn new(
        participant_id: impl Into<String>,
        store: Arc<dyn RoomStore>,
        quizzes: Arc<dyn QuizProvider>,
        scheduler: Arc<dyn Scheduler>,
        config: &AppConfig,
    ) -> Arc<Self> {
        let timer = TimerCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&scheduler),
            config.timeouts.clone(),
        );
        Arc::new(Self {
            participant_id: participant_id.into(),
            store,
            quizzes,
            scheduler,
            timer,
            rules: config.scoring.clone(),
            reveal_hold: config.reveal_hold,
            sequences: DashMap::new(),
            pending_progress: DashMap::new(),
        })
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    pub fn timer(&self) -> &TimerCoordinator {
        &self.timer
    }

    async fn read_room(&self, room_id: &str) -> Result<RoomDocument, EngineError> {
        self.store
            .read(room_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(room_id.to_owned()))
    }

    /// Quiz sequence of `room_id`, fetched once and kept for the room's lifetime.
    async fn sequence(&self, room_id: &str) -> Result<Arc<[Quiz]>, EngineError> {
        if let Some(cached) = self.sequences.get(room_id) {
            return Ok(Arc::clone(cached.value()));
        }
        let fetched = self.quizzes.quiz_sequence(room_id).await?;
        self.sequences
            .insert(room_id.to_owned(), Arc::clone(&fetched));
        Ok(fetched)
    }

    /// Leader-only: open the next round on its first question and arm its timer.
    pub async fn start_game(self: &Arc<Self>, room_id: &str) -> Result<RoomDocument, EngineError> {
        let room = self.read_room(room_id).await?;
        if !is_leader(&room, &self.participant_id) {
            return Err(EngineError::InvalidState(
                "only the room leader can start the game".into(),
            ));
        }
        if room.status != RoomStatus::Waiting {
            return Err(EngineError::InvalidState(format!(
                "room `{room_id}` is not waiting"
            )));
        }
        if self.sequence(room_id).await?.is_empty() {
            return Err(EngineError::InvalidState(format!(
                "room `{room_id}` has no quizzes"
            )));
        }

        let committed = self
            .store
            .update(
                room_id,
                RoomPatch {
                    status: Some(RoomStatus::InProgress),
                    round: Some(room.round + 1),
                    current_quiz_index: Some(0),
                    current_state: Some(CurrentState::pending()),
                    ..Default::default()
                },
                Precondition::none()
                    .with_status(RoomStatus::Waiting)
                    .with_round(room.round),
            )
            .await?;

        info!(
            room_id,
            round = committed.round,
            participants = committed.participants.len(),
            "game started"
        );
        self.arm_question_timer(&committed);
        Ok(committed)
    }

    /// Judge `answer` for this client's participant and credit the first correct one.
    pub async fn submit_answer(
        &self,
        room_id: &str,
        answer: &str,
    ) -> Result<AnswerOutcome, EngineError> {
        self.judge_answer(room_id, answer)
            .await
            .map(|judged| judged.outcome)
    }

    /// Like [`GameEngine::submit_answer`], also reporting which round the answer counted for.
    pub async fn judge_answer(
        &self,
        room_id: &str,
        answer: &str,
    ) -> Result<JudgedAnswer, EngineError> {
        let room = self.read_room(room_id).await?;
        let judged = |outcome| JudgedAnswer {
            round: room.round,
            participants: room.participants.len(),
            outcome,
        };
        let round = room.round;
        if room.status != RoomStatus::InProgress
            || room.current_state.answer_status != AnswerStatus::Pending
        {
            debug!(room_id, participant = %self.participant_id, "question closed; answer rejected");
            return Ok(judged(AnswerOutcome::Rejected));
        }
        if !room.participants.contains_key(&self.participant_id) {
            return Err(EngineError::InvalidState(format!(
                "`{}` is not a participant of room `{room_id}`",
                self.participant_id
            )));
        }

        let index = room.current_quiz_index;
        let sequence = self.sequence(room_id).await?;
        let Some(quiz) = sequence.get(index) else {
            return Err(EngineError::InvalidState(format!(
                "room `{room_id}` points at missing quiz {index}"
            )));
        };

        if !is_correct(quiz, answer) {
            debug!(room_id, index, participant = %self.participant_id, "incorrect answer");
            return Ok(judged(AnswerOutcome::Incorrect));
        }

        let precondition = Precondition::none()
            .with_status(RoomStatus::InProgress)
            .with_round(round)
            .with_quiz_index(index)
            .with_answer_status(AnswerStatus::Pending)
            .with_participant(self.participant_id.clone());
        let patch = RoomPatch {
            current_state: Some(CurrentState::solved_by(self.participant_id.clone())),
            score_increment: Some((self.participant_id.clone(), self.rules.correct_answer_score)),
            ..Default::default()
        };

        match self.store.update(room_id, patch, precondition).await {
            Ok(committed) => {
                let score = committed
                    .participants
                    .get(&self.participant_id)
                    .map(|participant| participant.score)
                    .unwrap_or_default();
                info!(room_id, index, participant = %self.participant_id, score, "answer accepted");
                Ok(judged(AnswerOutcome::Accepted { score }))
            }
            Err(StorageError::PreconditionFailed { .. }) => {
                debug!(room_id, index, participant = %self.participant_id, "lost the answer race");
                Ok(judged(AnswerOutcome::Rejected))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Leader-only: leave a revealed question for the next one, or finish after the last.
    ///
    /// Safe to call redundantly; an unrevealed question or a lost race yields [`Progress::Idle`].
    pub fn check_and_progress_game(
        self: &Arc<Self>,
        room_id: &str,
    ) -> BoxFuture<'static, Result<Progress, EngineError>> {
        let engine = Arc::clone(self);
        let room_id = room_id.to_owned();
        Box::pin(async move { engine.progress(&room_id, None).await })
    }

    /// Progress the room, optionally only while `expected` (round, index) is still current.
    async fn progress(
        self: &Arc<Self>,
        room_id: &str,
        expected: Option<(u64, usize)>,
    ) -> Result<Progress, EngineError> {
        let room = self.read_room(room_id).await?;
        if !is_leader(&room, &self.participant_id) {
            return Ok(Progress::NotLeader);
        }
        if room.status != RoomStatus::InProgress || !room.current_state.is_revealed {
            return Ok(Progress::Idle);
        }
        if expected.is_some_and(|key| key != (room.round, room.current_quiz_index)) {
            debug!(room_id, round = room.round, index = room.current_quiz_index, "queued progression superseded");
            return Ok(Progress::Idle);
        }

        let index = room.current_quiz_index;
        let next = index + 1;
        let sequence = self.sequence(room_id).await?;
        let precondition = Precondition::none()
            .with_status(RoomStatus::InProgress)
            .with_round(room.round)
            .with_quiz_index(index)
            .with_revealed(true);

        let finishing = next >= sequence.len();
        let patch = if finishing {
            RoomPatch {
                status: Some(RoomStatus::Finished),
                ..Default::default()
            }
        } else {
            RoomPatch {
                current_quiz_index: Some(next),
                current_state: Some(CurrentState::pending()),
                ..Default::default()
            }
        };

        let committed = match self.store.update(room_id, patch, precondition).await {
            Ok(committed) => committed,
            Err(StorageError::PreconditionFailed { .. }) => {
                debug!(room_id, index, "room already progressed");
                return Ok(Progress::Idle);
            }
            Err(err) => return Err(err.into()),
        };

        if finishing {
            self.timer.disarm(room_id);
            info!(room_id, questions = sequence.len(), "game finished");
            Ok(Progress::Finished)
        } else {
            info!(room_id, index = next, "advanced to next question");
            self.arm_question_timer(&committed);
            Ok(Progress::Advanced { index: next })
        }
    }

    /// Arm the timeout of the live question when this client leads `room`.
    pub fn arm_question_timer(self: &Arc<Self>, room: &RoomDocument) -> bool {
        let engine = Arc::clone(self);
        let on_fire: OnFire = Box::new(move |revealed: RoomDocument| {
            Box::pin(async move {
                engine.schedule_progress(&revealed);
            })
        });
        self.timer
            .start_question_timer(room, is_leader(room, &self.participant_id), on_fire)
    }

    /// Schedule `check_and_progress_game` once the reveal hold of the current question elapses.
    ///
    /// At most one pending call per (room, round, question) in this process; only the leader
    /// schedules. The queued call does nothing once another question or round is current.
    pub fn schedule_progress(self: &Arc<Self>, room: &RoomDocument) -> bool {
        if room.status != RoomStatus::InProgress
            || !room.current_state.is_revealed
            || !is_leader(room, &self.participant_id)
        {
            return false;
        }

        let key = (room.round, room.current_quiz_index);
        match self.pending_progress.entry(room.room_id.clone()) {
            Entry::Occupied(entry) if *entry.get() == key => return false,
            Entry::Occupied(mut entry) => {
                entry.insert(key);
            }
            Entry::Vacant(entry) => {
                entry.insert(key);
            }
        }

        let engine = Arc::clone(self);
        let room_id = room.room_id.clone();
        let (round, index) = key;
        debug!(room_id = %room_id, round, index, hold_ms = self.reveal_hold.as_millis() as u64, "progress scheduled");
        self.scheduler.schedule(
            self.reveal_hold,
            Box::pin(async move {
                engine
                    .pending_progress
                    .remove_if(&room_id, |_, pending| *pending == key);
                if let Err(err) = engine.progress(&room_id, Some(key)).await {
                    warn!(room_id = %room_id, index, error = %err, "scheduled progression failed");
                }
            }),
        );
        true
    }

    /// Leader-only: bring a finished room back to waiting with every score zeroed.
    pub async fn reset_room(&self, room_id: &str) -> Result<RoomDocument, EngineError> {
        let room = self.read_room(room_id).await?;
        if !is_leader(&room, &self.participant_id) {
            return Err(EngineError::InvalidState(
                "only the room leader can reset the room".into(),
            ));
        }
        if room.status != RoomStatus::Finished {
            return Err(EngineError::InvalidState(format!(
                "room `{room_id}` is not finished"
            )));
        }

        let committed = self
            .store
            .update(
                room_id,
                RoomPatch {
                    status: Some(RoomStatus::Waiting),
                    current_quiz_index: Some(0),
                    current_state: Some(CurrentState::pending()),
                    reset_scores: true,
                    ..Default::default()
                },
                Precondition::none().with_status(RoomStatus::Finished),
            )
            .await?;

        self.timer.disarm(room_id);
        self.pending_progress.remove(room_id);
        info!(room_id, "room reset");
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::GenreTimeouts,
        dao::{
            models::{ParticipantInfo, QuizType},
            quiz_provider::StaticQuizProvider,
            room_store::MemoryRoomStore,
        },
        state::timer::TokioScheduler,
    };

    fn quiz(id: &str, answer: &str) -> Quiz {
        Quiz {
            quiz_id: id.into(),
            title: id.into(),
            question: format!("question {id}"),
            kind: QuizType::Input,
            choices: Vec::new(),
            correct_answer: answer.into(),
            acceptable_answers: Vec::new(),
            explanation: None,
            genre: "science".into(),
        }
    }

    fn config() -> AppConfig {
        AppConfig {
            timeouts: GenreTimeouts::new(Duration::from_secs(30)),
            reveal_hold: Duration::from_secs(3),
            ..AppConfig::default()
        }
    }

    async fn setup(quizzes: usize) -> (MemoryRoomStore, Arc<GameEngine>, Arc<GameEngine>) {
        let store = MemoryRoomStore::new();
        let mut room = RoomDocument::new("room-1", "science");
        for (order, id) in ["alice", "bob"].into_iter().enumerate() {
            room.participants.insert(
                id.into(),
                ParticipantInfo {
                    username: id.into(),
                    score: 0,
                    join_order: order as u64,
                    is_connected: true,
                },
            );
        }
        store.create(room).await.unwrap();

        let provider = StaticQuizProvider::new();
        provider.insert(
            "room-1",
            (0..quizzes).map(|i| quiz(&format!("q{i}"), "42")).collect(),
        );
        let provider: Arc<dyn QuizProvider> = Arc::new(provider);
        let shared: Arc<dyn RoomStore> = Arc::new(store.clone());
        let engine = |id: &str| {
            GameEngine::new(
                id,
                Arc::clone(&shared),
                Arc::clone(&provider),
                Arc::new(TokioScheduler),
                &config(),
            )
        };
        (store.clone(), engine("alice"), engine("bob"))
    }

    #[tokio::test(start_paused = true)]
    async fn only_leader_starts_and_empty_sequences_are_refused() {
        let (store, alice, bob) = setup(2).await;
        assert!(matches!(
            bob.start_game("room-1").await,
            Err(EngineError::InvalidState(_))
        ));

        let started = alice.start_game("room-1").await.unwrap();
        assert_eq!(started.status, RoomStatus::InProgress);
        assert!(alice.timer().is_armed("room-1", 0));

        let (_, empty_leader, _) = setup(0).await;
        assert!(matches!(
            empty_leader.start_game("room-1").await,
            Err(EngineError::InvalidState(_))
        ));
        assert_eq!(
            store.read("room-1").await.unwrap().unwrap().status,
            RoomStatus::InProgress
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_correct_answer_wins() {
        let (store, alice, bob) = setup(2).await;
        alice.start_game("room-1").await.unwrap();

        assert_eq!(
            bob.submit_answer("room-1", "41").await.unwrap(),
            AnswerOutcome::Incorrect
        );
        assert_eq!(
            bob.submit_answer("room-1", "42").await.unwrap(),
            AnswerOutcome::Accepted { score: 10 }
        );
        assert_eq!(
            alice.submit_answer("room-1", "42").await.unwrap(),
            AnswerOutcome::Rejected
        );

        let room = store.read("room-1").await.unwrap().unwrap();
        assert_eq!(room.current_state, CurrentState::solved_by("bob"));
        assert_eq!(room.participants["bob"].score, 10);
        assert_eq!(room.participants["alice"].score, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn progression_is_idle_until_revealed() {
        let (store, alice, bob) = setup(2).await;
        alice.start_game("room-1").await.unwrap();
        let before = store.read("room-1").await.unwrap().unwrap();

        assert_eq!(
            alice.check_and_progress_game("room-1").await.unwrap(),
            Progress::Idle
        );
        assert_eq!(
            alice.check_and_progress_game("room-1").await.unwrap(),
            Progress::Idle
        );
        assert_eq!(store.read("room-1").await.unwrap().unwrap(), before);

        bob.submit_answer("room-1", "42").await.unwrap();
        assert_eq!(
            bob.check_and_progress_game("room-1").await.unwrap(),
            Progress::NotLeader
        );
        assert_eq!(
            alice.check_and_progress_game("room-1").await.unwrap(),
            Progress::Advanced { index: 1 }
        );
        assert!(alice.timer().is_armed("room-1", 1));
    }

    #[tokio::test(start_paused = true)]
    async fn last_question_finishes_and_reset_zeroes_scores() {
        let (store, alice, _bob) = setup(1).await;
        alice.start_game("room-1").await.unwrap();
        alice.submit_answer("room-1", "42").await.unwrap();

        assert_eq!(
            alice.check_and_progress_game("room-1").await.unwrap(),
            Progress::Finished
        );
        assert!(!alice.timer().is_armed("room-1", 0));
        assert_eq!(
            alice.submit_answer("room-1", "42").await.unwrap(),
            AnswerOutcome::Rejected
        );

        let reset = alice.reset_room("room-1").await.unwrap();
        assert_eq!(reset.status, RoomStatus::Waiting);
        assert_eq!(reset.participants["alice"].score, 0);
        assert_eq!(store.read("room-1").await.unwrap().unwrap(), reset);
    }
}
