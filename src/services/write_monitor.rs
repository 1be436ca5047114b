//! Opt-in recorder of room document writes, for inspecting write traffic while debugging.
//!
//! The monitor is an ordinary value: the process owns one in [`crate::state::AppState`] and tests
//! build their own. Nothing is recorded until [`WriteMonitor::start`] is called.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::future::BoxFuture;
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::info;
use utoipa::ToSchema;

use crate::dao::{
    models::{Precondition, RoomDocument, RoomPatch},
    room_store::{RoomStore, RoomSubscription},
    storage::{StorageError, StorageResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WriteOperation {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Committed,
    PreconditionFailed,
    NotFound,
    Failed,
}

impl WriteOutcome {
    fn of<T>(result: &StorageResult<T>) -> Self {
        match result {
            Ok(_) => WriteOutcome::Committed,
            Err(StorageError::PreconditionFailed { .. }) => WriteOutcome::PreconditionFailed,
            Err(StorageError::NotFound { .. }) => WriteOutcome::NotFound,
            Err(_) => WriteOutcome::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteRecord {
    /// RFC 3339 timestamp.
    pub at: String,
    pub room_id: String,
    pub operation: WriteOperation,
    pub outcome: WriteOutcome,
}

/// Per-room counters by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomWriteTotals {
    pub committed: u64,
    pub precondition_failed: u64,
    pub not_found: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteReport {
    pub active: bool,
    pub started_at: Option<String>,
    /// Most recent writes, oldest first.
    pub records: Vec<WriteRecord>,
    /// Records evicted to stay within capacity. Totals still count them.
    pub dropped: u64,
    pub totals: BTreeMap<String, RoomWriteTotals>,
}

/// Records kept per session by [`WriteMonitor::new`].
pub const DEFAULT_RECORD_CAPACITY: usize = 10_000;

#[derive(Default)]
struct MonitorState {
    active: bool,
    started_at: Option<OffsetDateTime>,
    records: VecDeque<WriteRecord>,
    dropped: u64,
    totals: BTreeMap<String, RoomWriteTotals>,
}

pub struct WriteMonitor {
    capacity: usize,
    state: Mutex<MonitorState>,
}

impl Default for WriteMonitor {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RECORD_CAPACITY)
    }
}

impl WriteMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` records; older ones are evicted first.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(MonitorState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin a fresh recording session, discarding earlier records.
    pub fn start(&self) {
        let mut state = self.lock();
        state.active = true;
        state.started_at = Some(OffsetDateTime::now_utc());
        state.records.clear();
        state.dropped = 0;
        state.totals.clear();
        info!("write monitor started");
    }

    /// Stop recording. Records are kept until the next `start`.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.active = false;
        info!(records = state.records.len(), "write monitor stopped");
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn record(&self, room_id: &str, operation: WriteOperation, outcome: WriteOutcome) {
        let mut state = self.lock();
        if !state.active {
            return;
        }
        let totals = state.totals.entry(room_id.to_owned()).or_default();
        match outcome {
            WriteOutcome::Committed => totals.committed += 1,
            WriteOutcome::PreconditionFailed => totals.precondition_failed += 1,
            WriteOutcome::NotFound => totals.not_found += 1,
            WriteOutcome::Failed => totals.failed += 1,
        }

        if state.records.len() == self.capacity {
            state.records.pop_front();
            state.dropped += 1;
        }
        state.records.push_back(WriteRecord {
            at: rfc3339(OffsetDateTime::now_utc()),
            room_id: room_id.to_owned(),
            operation,
            outcome,
        });
    }

    pub fn export(&self) -> WriteReport {
        let state = self.lock();
        WriteReport {
            active: state.active,
            started_at: state.started_at.map(rfc3339),
            records: state.records.iter().cloned().collect(),
            dropped: state.dropped,
            totals: state.totals.clone(),
        }
    }
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// [`RoomStore`] decorator reporting every write to a [`WriteMonitor`].
#[derive(Clone)]
pub struct MonitoredRoomStore {
    inner: Arc<dyn RoomStore>,
    monitor: Arc<WriteMonitor>,
}

impl MonitoredRoomStore {
    pub fn new(inner: Arc<dyn RoomStore>, monitor: Arc<WriteMonitor>) -> Self {
        Self { inner, monitor }
    }

    fn observe<T: Send + 'static>(
        &self,
        room_id: &str,
        operation: WriteOperation,
        write: BoxFuture<'static, StorageResult<T>>,
    ) -> BoxFuture<'static, StorageResult<T>> {
        let monitor = Arc::clone(&self.monitor);
        let room_id = room_id.to_owned();
        Box::pin(async move {
            let result = write.await;
            monitor.record(&room_id, operation, WriteOutcome::of(&result));
            result
        })
    }
}

impl RoomStore for MonitoredRoomStore {
    fn read(&self, room_id: &str) -> BoxFuture<'static, StorageResult<Option<RoomDocument>>> {
        self.inner.read(room_id)
    }

    fn create(&self, room: RoomDocument) -> BoxFuture<'static, StorageResult<()>> {
        let room_id = room.room_id.clone();
        self.observe(&room_id, WriteOperation::Create, self.inner.create(room))
    }

    fn update(
        &self,
        room_id: &str,
        patch: RoomPatch,
        precondition: Precondition,
    ) -> BoxFuture<'static, StorageResult<RoomDocument>> {
        self.observe(
            room_id,
            WriteOperation::Update,
            self.inner.update(room_id, patch, precondition),
        )
    }

    fn delete(&self, room_id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        self.observe(room_id, WriteOperation::Delete, self.inner.delete(room_id))
    }

    fn subscribe(&self, room_id: &str) -> BoxFuture<'static, StorageResult<RoomSubscription>> {
        self.inner.subscribe(room_id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{models::RoomStatus, room_store::MemoryRoomStore};

    fn monitored() -> (MonitoredRoomStore, Arc<WriteMonitor>) {
        let monitor = Arc::new(WriteMonitor::new());
        let store = MonitoredRoomStore::new(Arc::new(MemoryRoomStore::new()), monitor.clone());
        (store, monitor)
    }

    #[tokio::test]
    async fn nothing_is_recorded_before_start() {
        let (store, monitor) = monitored();
        store
            .create(RoomDocument::new("room-1", "science"))
            .await
            .unwrap();

        let report = monitor.export();
        assert!(!report.active);
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn writes_are_counted_per_room_and_outcome() {
        let (store, monitor) = monitored();
        monitor.start();
        store
            .create(RoomDocument::new("room-1", "science"))
            .await
            .unwrap();
        store
            .update(
                "room-1",
                RoomPatch::default(),
                Precondition::none().with_status(RoomStatus::Finished),
            )
            .await
            .unwrap_err();
        store
            .update("room-2", RoomPatch::default(), Precondition::none())
            .await
            .unwrap_err();
        store.read("room-1").await.unwrap();
        monitor.stop();
        store.delete("room-1").await.unwrap();

        let report = monitor.export();
        assert!(!report.active);
        assert_eq!(report.records.len(), 3);
        assert_eq!(
            report.totals["room-1"],
            RoomWriteTotals {
                committed: 1,
                precondition_failed: 1,
                ..Default::default()
            }
        );
        assert_eq!(report.totals["room-2"].not_found, 1);
    }

    #[test]
    fn isolated_monitors_do_not_share_records() {
        let first = WriteMonitor::new();
        let second = WriteMonitor::new();
        first.start();
        second.start();
        first.record("room-1", WriteOperation::Update, WriteOutcome::Committed);

        assert_eq!(first.export().records.len(), 1);
        assert!(second.export().records.is_empty());

        first.start();
        assert!(first.export().records.is_empty());
    }

    #[test]
    fn records_are_capped_but_totals_stay_exact() {
        let monitor = WriteMonitor::with_capacity(2);
        monitor.start();
        for outcome in [
            WriteOutcome::Committed,
            WriteOutcome::PreconditionFailed,
            WriteOutcome::Committed,
        ] {
            monitor.record("room-1", WriteOperation::Update, outcome);
        }

        let report = monitor.export();
        assert_eq!(report.dropped, 1);
        let kept: Vec<_> = report.records.iter().map(|record| record.outcome).collect();
        assert_eq!(
            kept,
            vec![WriteOutcome::PreconditionFailed, WriteOutcome::Committed]
        );
        assert_eq!(report.totals["room-1"].committed, 2);
        assert_eq!(report.totals["room-1"].precondition_failed, 1);

        monitor.start();
        let report = monitor.export();
        assert_eq!(report.dropped, 0);
        assert!(report.totals.is_empty());
    }
}
