//! In-process room store backed by `watch` channels, used for local play and tests.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::dao::{
    models::{Precondition, RoomDocument, RoomPatch},
    room_store::{RoomStore, RoomSubscription, plan_update},
    storage::{StorageError, StorageResult},
};

/// Room store keeping every document in memory.
///
/// Each room owns a `watch` channel; the committed document is the channel value, so a
/// conditional write runs entirely under the channel's write lock.
#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    rooms: Arc<DashMap<String, watch::Sender<Option<RoomDocument>>>>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, room_id: &str) -> watch::Sender<Option<RoomDocument>> {
        self.rooms
            .entry(room_id.to_owned())
            .or_insert_with(|| watch::channel(None).0)
            .clone()
    }

    fn read_now(&self, room_id: &str) -> Option<RoomDocument> {
        self.rooms
            .get(room_id)
            .and_then(|slot| slot.borrow().clone())
    }

    fn create_now(&self, room: RoomDocument) -> StorageResult<()> {
        let room_id = room.room_id.clone();
        let created = self.slot(&room_id).send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(room);
            true
        });

        if created {
            Ok(())
        } else {
            Err(StorageError::AlreadyExists { room_id })
        }
    }

    fn update_now(
        &self,
        room_id: &str,
        patch: RoomPatch,
        precondition: &Precondition,
    ) -> StorageResult<RoomDocument> {
        let Some(slot) = self.rooms.get(room_id).map(|slot| slot.clone()) else {
            return Err(StorageError::not_found(room_id));
        };

        let mut outcome = Err(StorageError::not_found(room_id));
        slot.send_if_modified(|current| {
            match plan_update(room_id, current.as_ref(), patch, precondition) {
                Ok(next) => {
                    *current = Some(next.clone());
                    outcome = Ok(next);
                    true
                }
                Err(err) => {
                    outcome = Err(err);
                    false
                }
            }
        });
        outcome
    }

    fn delete_now(&self, room_id: &str) -> bool {
        let Some(slot) = self.rooms.get(room_id).map(|slot| slot.clone()) else {
            return false;
        };
        slot.send_replace(None).is_some()
    }
}

impl RoomStore for MemoryRoomStore {
    fn read(&self, room_id: &str) -> BoxFuture<'static, StorageResult<Option<RoomDocument>>> {
        let room = self.read_now(room_id);
        Box::pin(async move { Ok(room) })
    }

    fn create(&self, room: RoomDocument) -> BoxFuture<'static, StorageResult<()>> {
        let result = self.create_now(room);
        Box::pin(async move { result })
    }

    fn update(
        &self,
        room_id: &str,
        patch: RoomPatch,
        precondition: Precondition,
    ) -> BoxFuture<'static, StorageResult<RoomDocument>> {
        let result = self.update_now(room_id, patch, &precondition);
        Box::pin(async move { result })
    }

    fn delete(&self, room_id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let deleted = self.delete_now(room_id);
        Box::pin(async move { Ok(deleted) })
    }

    fn subscribe(&self, room_id: &str) -> BoxFuture<'static, StorageResult<RoomSubscription>> {
        let receiver = self.slot(room_id).subscribe();
        Box::pin(async move { Ok(RoomSubscription::from_receiver(receiver)) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
