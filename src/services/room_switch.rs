//! Waiting-room membership: one client belongs to at most one room at a time.
//!
//! Joining or leaving rewrites the participant map and `leader_id` with a version-guarded write.
//! Unlike game transitions these writes are not re-derived by a later event, so a lost race is
//! retried a few times against a fresh read.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{ParticipantInfo, Precondition, RoomDocument, RoomPatch, RoomStatus},
        room_store::RoomStore,
        storage::StorageError,
    },
    error::EngineError,
    state::leader::current_leader,
};

const MEMBERSHIP_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined(RoomDocument),
    /// The client is still in another room; call [`RoomMembership::switch_to`] to move.
    SwitchRequired { current_room: String },
}

pub struct RoomMembership {
    store: Arc<dyn RoomStore>,
    participant_id: String,
    username: String,
    current: Mutex<Option<String>>,
}

impl RoomMembership {
    pub fn new(
        store: Arc<dyn RoomStore>,
        participant_id: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            store,
            participant_id: participant_id.into(),
            username: username.into(),
            current: Mutex::new(None),
        }
    }

    pub async fn current_room(&self) -> Option<String> {
        self.current.lock().await.clone()
    }

    /// Enter `room_id` unless the client already sits in a different room.
    ///
    /// Re-joining the current room marks the participant connected again.
    pub async fn join(&self, room_id: &str) -> Result<JoinOutcome, EngineError> {
        let mut current = self.current.lock().await;
        if let Some(other) = current.as_deref().filter(|other| *other != room_id) {
            debug!(from = other, to = room_id, "join refused; switch required");
            return Ok(JoinOutcome::SwitchRequired {
                current_room: other.to_owned(),
            });
        }

        let room = self.enter(room_id).await?;
        *current = Some(room_id.to_owned());
        Ok(JoinOutcome::Joined(room))
    }

    /// Leave the current room (if any) and enter `room_id`.
    pub async fn switch_to(&self, room_id: &str) -> Result<RoomDocument, EngineError> {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take().filter(|previous| previous != room_id) {
            if let Err(err) = self.exit(&previous).await {
                *current = Some(previous);
                return Err(err);
            }
            info!(from = %previous, to = room_id, "switching rooms");
        }

        let room = self.enter(room_id).await?;
        *current = Some(room_id.to_owned());
        Ok(room)
    }

    /// Leave the current room. Returns the room left, if any.
    pub async fn leave(&self) -> Result<Option<String>, EngineError> {
        let mut current = self.current.lock().await;
        let Some(room_id) = current.take() else {
            return Ok(None);
        };
        if let Err(err) = self.exit(&room_id).await {
            *current = Some(room_id);
            return Err(err);
        }
        Ok(Some(room_id))
    }

    async fn enter(&self, room_id: &str) -> Result<RoomDocument, EngineError> {
        let committed = self
            .write_membership(room_id, |room| {
                if room.status == RoomStatus::Finished {
                    return Err(EngineError::InvalidState(format!(
                        "room `{room_id}` has already finished"
                    )));
                }

                let mut patch = RoomPatch::default();
                if room.participants.contains_key(&self.participant_id) {
                    patch.set_connected = Some((self.participant_id.clone(), true));
                } else {
                    patch.upsert_participant = Some((
                        self.participant_id.clone(),
                        ParticipantInfo {
                            username: self.username.clone(),
                            score: 0,
                            join_order: room.next_join_order,
                            is_connected: true,
                        },
                    ));
                    patch.next_join_order = Some(room.next_join_order + 1);
                }
                Ok(Some(patch))
            })
            .await?;

        let Some(room) = committed else {
            return Err(EngineError::NotFound(room_id.to_owned()));
        };
        info!(
            room_id,
            participant = %self.participant_id,
            leader = room.leader_id.as_deref().unwrap_or("-"),
            "joined room"
        );
        Ok(room)
    }

    async fn exit(&self, room_id: &str) -> Result<(), EngineError> {
        let result = self
            .write_membership(room_id, |room| {
                if !room.participants.contains_key(&self.participant_id) {
                    return Ok(None);
                }
                let mut patch = RoomPatch::default();
                if room.status == RoomStatus::Waiting {
                    patch.remove_participant = Some(self.participant_id.clone());
                } else {
                    patch.set_connected = Some((self.participant_id.clone(), false));
                }
                Ok(Some(patch))
            })
            .await;

        match result {
            Ok(_) => {
                info!(room_id, participant = %self.participant_id, "left room");
                Ok(())
            }
            Err(EngineError::NotFound(_)) => {
                debug!(room_id, "room already gone on leave");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Apply the patch produced by `plan` with the recomputed leader, guarded on the version read.
    async fn write_membership<F>(
        &self,
        room_id: &str,
        plan: F,
    ) -> Result<Option<RoomDocument>, EngineError>
    where
        F: Fn(&RoomDocument) -> Result<Option<RoomPatch>, EngineError>,
    {
        for attempt in 1..=MEMBERSHIP_ATTEMPTS {
            let room = self
                .store
                .read(room_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(room_id.to_owned()))?;
            let Some(mut patch) = plan(&room)? else {
                return Ok(None);
            };

            let mut preview = room.clone();
            patch.clone().apply(&mut preview);
            patch.leader_id = Some(current_leader(&preview).map(str::to_owned));

            match self
                .store
                .update(room_id, patch, Precondition::none().with_version(room.version))
                .await
            {
                Ok(committed) => return Ok(Some(committed)),
                Err(StorageError::PreconditionFailed { .. }) => {
                    debug!(room_id, attempt, "membership write raced; retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(room_id, participant = %self.participant_id, "membership write kept losing races");
        Err(EngineError::Stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::room_store::MemoryRoomStore;

    async fn store_with_rooms(ids: &[&str]) -> Arc<dyn RoomStore> {
        let store = MemoryRoomStore::new();
        for id in ids {
            store.create(RoomDocument::new(*id, "science")).await.unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn joins_assign_increasing_order_and_first_leads() {
        let store = store_with_rooms(&["room-1"]).await;
        let alice = RoomMembership::new(store.clone(), "alice", "Alice");
        let bob = RoomMembership::new(store.clone(), "bob", "Bob");

        alice.join("room-1").await.unwrap();
        let JoinOutcome::Joined(room) = bob.join("room-1").await.unwrap() else {
            panic!("expected join");
        };

        assert_eq!(room.participants["alice"].join_order, 0);
        assert_eq!(room.participants["bob"].join_order, 1);
        assert_eq!(room.leader_id.as_deref(), Some("alice"));
        assert_eq!(room.next_join_order, 2);
    }

    #[tokio::test]
    async fn second_room_requires_switch() {
        let store = store_with_rooms(&["room-1", "room-2"]).await;
        let alice = RoomMembership::new(store.clone(), "alice", "Alice");
        let bob = RoomMembership::new(store.clone(), "bob", "Bob");
        alice.join("room-1").await.unwrap();
        bob.join("room-1").await.unwrap();

        assert_eq!(
            alice.join("room-2").await.unwrap(),
            JoinOutcome::SwitchRequired {
                current_room: "room-1".into()
            }
        );

        let joined = alice.switch_to("room-2").await.unwrap();
        assert_eq!(joined.leader_id.as_deref(), Some("alice"));
        assert_eq!(alice.current_room().await.as_deref(), Some("room-2"));

        let left = store.read("room-1").await.unwrap().unwrap();
        assert!(!left.participants.contains_key("alice"));
        assert_eq!(left.leader_id.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn leaving_a_running_game_only_disconnects() {
        let store = store_with_rooms(&["room-1"]).await;
        let alice = RoomMembership::new(store.clone(), "alice", "Alice");
        let bob = RoomMembership::new(store.clone(), "bob", "Bob");
        alice.join("room-1").await.unwrap();
        bob.join("room-1").await.unwrap();
        store
            .update(
                "room-1",
                RoomPatch {
                    status: Some(RoomStatus::InProgress),
                    ..Default::default()
                },
                Precondition::none(),
            )
            .await
            .unwrap();

        assert_eq!(alice.leave().await.unwrap().as_deref(), Some("room-1"));
        let room = store.read("room-1").await.unwrap().unwrap();
        assert!(!room.participants["alice"].is_connected);
        assert_eq!(room.leader_id.as_deref(), Some("bob"));

        alice.join("room-1").await.unwrap();
        let room = store.read("room-1").await.unwrap().unwrap();
        assert!(room.participants["alice"].is_connected);
        assert_eq!(room.participants["alice"].join_order, 0);
        assert_eq!(room.leader_id.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn finished_and_missing_rooms_refuse_joins() {
        let store = store_with_rooms(&["room-1"]).await;
        store
            .update(
                "room-1",
                RoomPatch {
                    status: Some(RoomStatus::Finished),
                    ..Default::default()
                },
                Precondition::none(),
            )
            .await
            .unwrap();
        let alice = RoomMembership::new(store, "alice", "Alice");

        assert!(matches!(
            alice.join("room-1").await,
            Err(EngineError::InvalidState(_))
        ));
        assert!(matches!(
            alice.join("nowhere").await,
            Err(EngineError::NotFound(_))
        ));
        assert_eq!(alice.current_room().await, None);
    }
}
