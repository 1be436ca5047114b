//! Per-client driver reacting to room snapshots.
//!
//! Every delivered snapshot is treated as the full truth: leadership is recomputed from it and
//! the leader (re)arms the question timer or schedules progression. Games are told apart by the
//! room's round, so a game is settled exactly once even when the store coalesced its `finished`
//! snapshot away and the next thing this client sees is a reset or an already restarted room.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{RoomDocument, RoomStatus},
        profile::ProfileStore,
        storage::StorageResult,
    },
    error::EngineError,
    services::{
        rank::{RankInfo, next_rank, rank_for, rank_up},
        rank_notice::{RankNoticeStore, RankUpNotice},
        scoring::{ExperienceGain, UserPerformance, total_experience},
    },
    state::{
        leader::is_leader,
        progression::{AnswerOutcome, GameEngine},
    },
};

/// Collaborators used when a game ends.
#[derive(Clone)]
pub struct Rewards {
    pub profiles: Arc<dyn ProfileStore>,
    pub notices: RankNoticeStore,
}

/// What this client earned for one finished game.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    /// Room round the game was played in.
    pub round: u64,
    pub gain: ExperienceGain,
    pub total_experience: u64,
    pub rank: RankInfo,
    pub ranked_up: bool,
    /// Experience still missing for the next tier, if any.
    pub to_next_rank: Option<u64>,
}

/// Local record of the round this client is following.
#[derive(Debug, Default)]
struct GameTally {
    round: u64,
    performance: UserPerformance,
    /// Room size at the latest observation of this round.
    participants: usize,
    member: bool,
    /// The round was seen running, so there is a game to settle.
    played: bool,
    settled: bool,
}

/// A round that ended and still has to be settled.
#[derive(Debug)]
struct Closing {
    round: u64,
    performance: UserPerformance,
    participants: usize,
}

impl GameTally {
    /// Follow `round` from now on, handing back the previous round if it was never settled.
    fn roll_to(&mut self, round: u64) -> Option<Closing> {
        if round <= self.round {
            return None;
        }
        let mut previous = std::mem::replace(
            self,
            GameTally {
                round,
                ..Default::default()
            },
        );
        previous.close()
    }

    /// Mark the round settled; `None` if it already was or this client never played it.
    fn close(&mut self) -> Option<Closing> {
        if self.settled || !self.played || !self.member {
            return None;
        }
        self.settled = true;
        Some(Closing {
            round: self.round,
            performance: self.performance,
            participants: self.participants,
        })
    }
}

struct SessionShared {
    engine: Arc<GameEngine>,
    room_id: String,
    rewards: Rewards,
    tally: Mutex<GameTally>,
    settlement: watch::Sender<Option<Settlement>>,
}

pub struct RoomSession {
    shared: Arc<SessionShared>,
    driver: JoinHandle<()>,
}

impl RoomSession {
    /// Subscribe to `room_id` and start reacting to its snapshots.
    pub async fn spawn(
        engine: Arc<GameEngine>,
        room_id: impl Into<String>,
        rewards: Rewards,
    ) -> StorageResult<Self> {
        let room_id = room_id.into();
        let subscription = engine.store().subscribe(&room_id).await?;
        let (settlement, _) = watch::channel(None);
        let shared = Arc::new(SessionShared {
            engine,
            room_id,
            rewards,
            tally: Mutex::new(GameTally::default()),
            settlement,
        });

        let driver = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                let mut snapshots = Box::pin(subscription.into_stream());
                while let Some(snapshot) = snapshots.next().await {
                    match snapshot {
                        Some(room) => shared.on_snapshot(&room).await,
                        None => debug!(room_id = %shared.room_id, "room absent"),
                    }
                }
                debug!(room_id = %shared.room_id, "room subscription ended");
            })
        };

        info!(room_id = %shared.room_id, participant = shared.engine.participant_id(), "room session started");
        Ok(Self { shared, driver })
    }

    pub fn room_id(&self) -> &str {
        &self.shared.room_id
    }

    pub fn engine(&self) -> &Arc<GameEngine> {
        &self.shared.engine
    }

    /// Submit an answer and keep the local performance tally of its round in step.
    pub async fn submit_answer(&self, answer: &str) -> Result<AnswerOutcome, EngineError> {
        let judged = self
            .shared
            .engine
            .judge_answer(&self.shared.room_id, answer)
            .await?;

        let rules = self.shared.engine.rules();
        let closing = {
            let mut tally = self.shared.tally();
            let closing = tally.roll_to(judged.round);
            if tally.round == judged.round {
                tally.participants = judged.participants;
                match judged.outcome {
                    AnswerOutcome::Accepted { .. } => tally.performance.record_correct(rules),
                    AnswerOutcome::Incorrect => tally.performance.record_miss(rules),
                    AnswerOutcome::Rejected => {}
                }
                if judged.outcome != AnswerOutcome::Rejected {
                    tally.played = true;
                    tally.member = true;
                }
            }
            closing
        };

        if let Some(closing) = closing {
            self.shared.settle(closing).await;
        }
        Ok(judged.outcome)
    }

    /// Tally of the round this client currently follows.
    pub fn performance(&self) -> UserPerformance {
        self.shared.tally().performance
    }

    /// Watch the latest settlement; `None` until a game this client played has finished.
    pub fn settlements(&self) -> watch::Receiver<Option<Settlement>> {
        self.shared.settlement.subscribe()
    }

    /// Stop reacting to snapshots. Timers already armed still fire and re-check the room.
    pub fn stop(self) {
        self.driver.abort();
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl SessionShared {
    fn tally(&self) -> MutexGuard<'_, GameTally> {
        self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Update the tally from `room` and collect every round that is over by now.
    fn observe(&self, room: &RoomDocument) -> Vec<Closing> {
        let mut tally = self.tally();
        let mut closings: Vec<_> = tally.roll_to(room.round).into_iter().collect();
        if room.round != tally.round {
            return closings;
        }

        tally.participants = room.participants.len();
        tally.member = room.participants.contains_key(self.engine.participant_id());
        match room.status {
            RoomStatus::InProgress => tally.played = true,
            // A reset room is past `finished` even when that snapshot never arrived.
            RoomStatus::Finished | RoomStatus::Waiting => closings.extend(tally.close()),
        }
        closings
    }

    async fn on_snapshot(&self, room: &RoomDocument) {
        for closing in self.observe(room) {
            self.settle(closing).await;
        }

        if room.status != RoomStatus::InProgress
            || !is_leader(room, self.engine.participant_id())
        {
            return;
        }
        if room.current_state.is_revealed {
            self.engine.schedule_progress(room);
        } else if self.engine.arm_question_timer(room) {
            debug!(room_id = %room.room_id, index = room.current_quiz_index, "timer taken over from snapshot");
        }
    }

    async fn settle(&self, closing: Closing) {
        let participant_id = self.engine.participant_id();
        let room_id = &self.room_id;
        let gain = total_experience(
            &closing.performance,
            closing.participants,
            self.engine.rules(),
        );

        let profiles = &self.rewards.profiles;
        let previous = match profiles.experience(participant_id).await {
            Ok(previous) => previous,
            Err(err) => {
                warn!(room_id = %room_id, error = %err, "failed to read profile experience");
                return;
            }
        };
        let total = match profiles.add_experience(participant_id, gain.exp_to_add).await {
            Ok(total) => total,
            Err(err) => {
                warn!(room_id = %room_id, error = %err, "failed to add experience");
                return;
            }
        };

        let promoted = rank_up(previous, total);
        if let Some(rank) = promoted {
            let notice = RankUpNotice::new(&rank, OffsetDateTime::now_utc());
            if let Err(err) = self.rewards.notices.record(&notice) {
                warn!(error = %err, rank = rank.name, "failed to store rank-up notice");
            }
        }

        let settlement = Settlement {
            round: closing.round,
            gain,
            total_experience: total,
            rank: rank_for(total),
            ranked_up: promoted.is_some(),
            to_next_rank: next_rank(total).map(|(_, missing)| missing),
        };
        info!(
            room_id = %room_id,
            participant = participant_id,
            round = closing.round,
            exp = gain.exp_to_add,
            solo = gain.is_solo_play,
            correct = gain.actual_correct_answers,
            rank = settlement.rank.name,
            "game settled"
        );
        self.settlement.send_replace(Some(settlement));
    }
}
