//! Per-question deferred timeout.
//!
//! A timer never trusts the snapshot it was armed with: when it fires it re-reads the room and
//! only writes if the question it was armed for is still live and unsolved. A question is
//! identified by the game round and its index, since indices restart at 0 with every game.
//! Timers are not cancelled; a superseded timer simply finds nothing to do.

use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::{
    config::GenreTimeouts,
    dao::{
        models::{AnswerStatus, CurrentState, Precondition, RoomDocument, RoomPatch, RoomStatus},
        room_store::RoomStore,
        storage::StorageError,
    },
};

/// Runs a task after a delay. Injected so tests can drive virtual time.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>);
}

/// [`Scheduler`] backed by `tokio::time::sleep` on a spawned task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }
}

/// Continuation invoked with the committed document after a timeout was written.
pub type OnFire = Box<dyn FnOnce(RoomDocument) -> BoxFuture<'static, ()> + Send>;

/// Question a timer belongs to: game round, then index within the round.
type QuestionKey = (u64, usize);

/// Arms at most one timer per (room, round, question index) in this process.
#[derive(Clone)]
pub struct TimerCoordinator {
    store: Arc<dyn RoomStore>,
    scheduler: Arc<dyn Scheduler>,
    timeouts: Arc<GenreTimeouts>,
    armed: Arc<DashMap<String, QuestionKey>>,
}

impl TimerCoordinator {
    pub fn new(
        store: Arc<dyn RoomStore>,
        scheduler: Arc<dyn Scheduler>,
        timeouts: GenreTimeouts,
    ) -> Self {
        Self {
            store,
            scheduler,
            timeouts: Arc::new(timeouts),
            armed: Arc::new(DashMap::new()),
        }
    }

    /// Whether a timer for `room_id` at `index` of the latest armed round is pending here.
    pub fn is_armed(&self, room_id: &str, index: usize) -> bool {
        self.armed
            .get(room_id)
            .is_some_and(|armed| armed.1 == index)
    }

    /// Forget any pending timer of `room_id`. A timer already scheduled still fires but its
    /// fire-time guard decides whether it writes.
    pub fn disarm(&self, room_id: &str) {
        self.armed.remove(room_id);
    }

    /// Schedule the timeout of the question that is current in `room`.
    ///
    /// No-op (returns `false`) unless `is_leader` holds, the room is in progress and no timer
    /// is already armed here for the same question.
    pub fn start_question_timer(&self, room: &RoomDocument, is_leader: bool, on_fire: OnFire) -> bool {
        if !is_leader || room.status != RoomStatus::InProgress {
            return false;
        }

        let round = room.round;
        let index = room.current_quiz_index;
        match self.armed.entry(room.room_id.clone()) {
            Entry::Occupied(entry) if *entry.get() == (round, index) => return false,
            Entry::Occupied(mut entry) => {
                entry.insert((round, index));
            }
            Entry::Vacant(entry) => {
                entry.insert((round, index));
            }
        }

        let timeout = self.timeouts.timeout_for(&room.genre);
        let room_id = room.room_id.clone();
        info!(
            room_id = %room_id,
            round,
            index,
            timeout_ms = timeout.as_millis() as u64,
            "question timer armed"
        );

        let coordinator = self.clone();
        self.scheduler.schedule(
            timeout,
            Box::pin(async move { coordinator.fire(room_id, (round, index), on_fire).await }),
        );
        true
    }

    async fn fire(self, room_id: String, key: QuestionKey, on_fire: OnFire) {
        self.armed.remove_if(&room_id, |_, armed| *armed == key);
        let (round, index) = key;

        let room = match self.store.read(&room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                debug!(room_id = %room_id, index, "room gone; timer superseded");
                return;
            }
            Err(err) => {
                warn!(room_id = %room_id, index, error = %err, "timer read failed");
                return;
            }
        };

        if room.status != RoomStatus::InProgress
            || room.round != round
            || room.current_quiz_index != index
        {
            debug!(
                room_id = %room_id,
                round,
                index,
                current_round = room.round,
                current = room.current_quiz_index,
                status = ?room.status,
                "question moved on; timer superseded"
            );
            return;
        }
        match room.current_state.answer_status {
            AnswerStatus::Correct => {
                debug!(room_id = %room_id, index, "question already solved; timer superseded");
                return;
            }
            AnswerStatus::Timeout => {
                debug!(room_id = %room_id, index, "question already timed out");
                return;
            }
            AnswerStatus::Pending => {}
        }

        let precondition = Precondition::none()
            .with_status(RoomStatus::InProgress)
            .with_round(round)
            .with_quiz_index(index)
            .with_answer_status(AnswerStatus::Pending);
        let patch = RoomPatch {
            current_state: Some(CurrentState::timed_out()),
            ..Default::default()
        };

        match self.store.update(&room_id, patch, precondition).await {
            Ok(committed) => {
                info!(room_id = %room_id, index, "question timed out");
                on_fire(committed).await;
            }
            Err(StorageError::PreconditionFailed { .. } | StorageError::NotFound { .. }) => {
                debug!(room_id = %room_id, index, "room changed under the timer; no write");
            }
            Err(err) => {
                warn!(room_id = %room_id, index, error = %err, "timeout write failed");
            }
        }
    }
}
