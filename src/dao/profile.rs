//! Boundary to the external profile store holding cumulative experience per user.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::storage::StorageResult;

pub trait ProfileStore: Send + Sync {
    /// Cumulative experience of `user_id` (0 for unknown users).
    fn experience(&self, user_id: &str) -> BoxFuture<'static, StorageResult<u64>>;
    /// Add `amount` and return the new cumulative experience.
    fn add_experience(&self, user_id: &str, amount: u64) -> BoxFuture<'static, StorageResult<u64>>;
}

#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    experience: Arc<DashMap<String, u64>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn experience(&self, user_id: &str) -> BoxFuture<'static, StorageResult<u64>> {
        let current = self.experience.get(user_id).map(|exp| *exp).unwrap_or(0);
        Box::pin(async move { Ok(current) })
    }

    fn add_experience(&self, user_id: &str, amount: u64) -> BoxFuture<'static, StorageResult<u64>> {
        let total = {
            let mut entry = self.experience.entry(user_id.to_owned()).or_insert(0);
            *entry = entry.saturating_add(amount);
            *entry
        };
        Box::pin(async move { Ok(total) })
    }
}
