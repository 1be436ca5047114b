#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::Duration;

use futures::{Stream, future::BoxFuture};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::warn;

use crate::dao::{
    models::{Precondition, RoomDocument, RoomPatch},
    storage::{StorageError, StorageResult},
};

pub use memory::MemoryRoomStore;

/// Attempts made by optimistic-concurrency backends before giving up on a contended document.
pub(crate) const MAX_CAS_ATTEMPTS: u32 = 5;

/// Abstraction over the document store holding one document per room.
///
/// `update` is a compare-and-swap: the patch is applied only if `precondition` holds against the
/// committed document at write time, and the committed document is returned.
pub trait RoomStore: Send + Sync {
    fn read(&self, room_id: &str) -> BoxFuture<'static, StorageResult<Option<RoomDocument>>>;
    fn create(&self, room: RoomDocument) -> BoxFuture<'static, StorageResult<()>>;
    fn update(
        &self,
        room_id: &str,
        patch: RoomPatch,
        precondition: Precondition,
    ) -> BoxFuture<'static, StorageResult<RoomDocument>>;
    fn delete(&self, room_id: &str) -> BoxFuture<'static, StorageResult<bool>>;
    fn subscribe(&self, room_id: &str) -> BoxFuture<'static, StorageResult<RoomSubscription>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Check `precondition` against the committed document and compute the next committed value.
pub(crate) fn plan_update(
    room_id: &str,
    current: Option<&RoomDocument>,
    patch: RoomPatch,
    precondition: &Precondition,
) -> StorageResult<RoomDocument> {
    let Some(current) = current else {
        return Err(StorageError::not_found(room_id));
    };
    if !precondition.holds(current) {
        return Err(StorageError::precondition_failed(room_id));
    }

    let mut next = current.clone();
    patch.apply(&mut next);
    next.version = current.version + 1;
    Ok(next)
}

/// Live view on one room document. `None` means the room does not exist (anymore).
///
/// Only the latest value is kept; intermediate versions may be skipped. Dropping the
/// subscription unsubscribes.
pub struct RoomSubscription {
    receiver: watch::Receiver<Option<RoomDocument>>,
    poller: Option<JoinHandle<()>>,
}

impl RoomSubscription {
    pub(crate) fn from_receiver(receiver: watch::Receiver<Option<RoomDocument>>) -> Self {
        Self {
            receiver,
            poller: None,
        }
    }

    /// Latest value without waiting.
    pub fn latest(&self) -> Option<RoomDocument> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next committed change. Returns `None` once the store side is gone.
    pub async fn changed(&mut self) -> Option<Option<RoomDocument>> {
        self.receiver.changed().await.ok()?;
        let snapshot = self.receiver.borrow_and_update().clone();
        Some(snapshot)
    }

    /// Stream of snapshots, starting with the current one.
    pub fn into_stream(mut self) -> impl Stream<Item = Option<RoomDocument>> + Send + 'static {
        async_stream::stream! {
            let initial = self.receiver.borrow_and_update().clone();
            yield initial;
            while self.receiver.changed().await.is_ok() {
                let snapshot = self.receiver.borrow_and_update().clone();
                yield snapshot;
            }
        }
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

/// Subscription for backends without a push channel: poll `fetch` and publish new versions.
pub(crate) fn polling_subscription<F>(
    room_id: String,
    every: Duration,
    fetch: F,
) -> RoomSubscription
where
    F: Fn() -> BoxFuture<'static, StorageResult<Option<RoomDocument>>> + Send + 'static,
{
    let (tx, rx) = watch::channel(None);
    let poller = tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = ticker.tick() => {}
            }

            match fetch().await {
                Ok(latest) => {
                    tx.send_if_modified(|current| {
                        let seen = current.as_ref().map(|room: &RoomDocument| room.version);
                        let fresh = latest.as_ref().map(|room| room.version);
                        if seen == fresh {
                            return false;
                        }
                        *current = latest;
                        true
                    });
                }
                Err(err) => warn!(room_id = %room_id, error = %err, "room poll failed"),
            }
        }
    });

    RoomSubscription {
        receiver: rx,
        poller: Some(poller),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{RoomStatus, RoomPatch};

    #[test]
    fn plan_update_bumps_version_and_applies_patch() {
        let room = RoomDocument::new("room-1", "science");
        let next = plan_update(
            "room-1",
            Some(&room),
            RoomPatch {
                status: Some(RoomStatus::InProgress),
                ..Default::default()
            },
            &Precondition::none().with_status(RoomStatus::Waiting),
        )
        .unwrap();

        assert_eq!(next.status, RoomStatus::InProgress);
        assert_eq!(next.version, room.version + 1);
    }

    #[test]
    fn plan_update_reports_missing_and_stale_rooms() {
        let missing = plan_update("room-1", None, RoomPatch::default(), &Precondition::none());
        assert!(matches!(missing, Err(StorageError::NotFound { .. })));

        let room = RoomDocument::new("room-1", "science");
        let stale = plan_update(
            "room-1",
            Some(&room),
            RoomPatch::default(),
            &Precondition::none().with_status(RoomStatus::Finished),
        );
        assert!(matches!(stale, Err(StorageError::PreconditionFailed { .. })));
    }
}
