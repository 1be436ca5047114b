pub mod answer;
pub mod leader;
pub mod progression;
pub mod timer;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::room_store::RoomStore,
    error::AppError,
    services::write_monitor::{MonitoredRoomStore, WriteMonitor},
};

pub use self::progression::{AnswerOutcome, GameEngine, JudgedAnswer, Progress};
pub use self::timer::{Scheduler, TimerCoordinator, TokioScheduler};

pub type SharedState = Arc<AppState>;

/// Central application state: the installed room store, degraded flag, write monitor and config.
pub struct AppState {
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    degraded: watch::Sender<bool>,
    monitor: Arc<WriteMonitor>,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            room_store: RwLock::new(None),
            degraded: degraded_tx,
            monitor: Arc::new(WriteMonitor::new()),
            config,
        })
    }

    /// Obtain a handle to the current room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current room store or a `503` while degraded.
    pub async fn require_room_store(&self) -> Result<Arc<dyn RoomStore>, AppError> {
        self.room_store()
            .await
            .ok_or_else(|| AppError::ServiceUnavailable("room store not connected".into()))
    }

    /// Install a backend, wrapped so its writes reach the write monitor, and leave degraded mode.
    pub async fn install_room_store(&self, store: Arc<dyn RoomStore>) {
        let monitored: Arc<dyn RoomStore> =
            Arc::new(MonitoredRoomStore::new(store, Arc::clone(&self.monitor)));
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(monitored);
        }
        self.update_degraded(false);
    }

    /// Remove the current room store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    pub fn monitor(&self) -> &Arc<WriteMonitor> {
        &self.monitor
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{models::RoomDocument, room_store::MemoryRoomStore};

    #[tokio::test]
    async fn installing_a_store_leaves_degraded_mode_and_monitors_writes() {
        let state = AppState::new(AppConfig::default());
        let mut degraded = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(state.require_room_store().await.is_err());

        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(degraded.has_changed().unwrap());
        assert!(!*degraded.borrow_and_update());

        state.monitor().start();
        let store = state.require_room_store().await.unwrap();
        store
            .create(RoomDocument::new("room-1", "science"))
            .await
            .unwrap();
        assert_eq!(state.monitor().export().records.len(), 1);

        state.clear_room_store().await;
        assert!(state.is_degraded());
    }
}
