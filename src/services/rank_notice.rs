//! Best-effort, at-most-once rank-up message that survives a restart of the client.

use std::{
    fs,
    io::{self, ErrorKind},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::services::rank::RankInfo;

/// Notices older than this are dropped unread.
const NOTICE_TTL: Duration = Duration::hours(24);

#[derive(Debug, Error)]
pub enum NoticeError {
    #[error("failed to access rank notice file")]
    Io(#[from] io::Error),
    #[error("failed to encode rank notice")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankUpNotice {
    pub message: String,
    pub new_rank: String,
    /// Unix time in milliseconds.
    pub timestamp: i64,
}

impl RankUpNotice {
    pub fn new(rank: &RankInfo, now: OffsetDateTime) -> Self {
        Self {
            message: format!("Rank up! You are now {}.", rank.name),
            new_rank: rank.name.to_owned(),
            timestamp: unix_millis(now),
        }
    }

    fn is_expired(&self, now: OffsetDateTime) -> bool {
        i128::from(unix_millis(now) - self.timestamp) > NOTICE_TTL.whole_milliseconds()
    }
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// File-backed slot holding at most one pending notice.
#[derive(Debug, Clone)]
pub struct RankNoticeStore {
    path: PathBuf,
}

impl RankNoticeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Persist `notice`, replacing any unread one.
    pub fn record(&self, notice: &RankUpNotice) -> Result<(), NoticeError> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec(notice)?)?;
        debug!(path = %self.path.display(), rank = %notice.new_rank, "rank notice stored");
        Ok(())
    }

    /// Read and clear the pending notice. Expired or unreadable notices are discarded.
    pub fn take(&self, now: OffsetDateTime) -> Result<Option<RankUpNotice>, NoticeError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        fs::remove_file(&self.path)?;

        let notice = match serde_json::from_slice::<RankUpNotice>(&contents) {
            Ok(notice) => notice,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "discarding unreadable rank notice");
                return Ok(None);
            }
        };

        if notice.is_expired(now) {
            debug!(rank = %notice.new_rank, "discarding expired rank notice");
            return Ok(None);
        }
        Ok(Some(notice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rank::rank_for;

    fn scratch_store() -> RankNoticeStore {
        RankNoticeStore::new(
            std::env::temp_dir().join(format!("rank-notice-{}.json", uuid::Uuid::new_v4())),
        )
    }

    #[test]
    fn notice_is_delivered_once() {
        let store = scratch_store();
        let now = OffsetDateTime::now_utc();
        let notice = RankUpNotice::new(&rank_for(300), now);
        store.record(&notice).unwrap();

        assert_eq!(store.take(now).unwrap(), Some(notice));
        assert_eq!(store.take(now).unwrap(), None);
    }

    #[test]
    fn stale_notice_is_dropped() {
        let store = scratch_store();
        let then = OffsetDateTime::now_utc();
        store
            .record(&RankUpNotice::new(&rank_for(100), then))
            .unwrap();

        let later = then + Duration::hours(25);
        assert_eq!(store.take(later).unwrap(), None);
        assert_eq!(store.take(then).unwrap(), None);
    }

    #[test]
    fn corrupt_notice_is_dropped() {
        let store = scratch_store();
        fs::write(&store.path, b"not json").unwrap();
        assert_eq!(store.take(OffsetDateTime::now_utc()).unwrap(), None);
        assert!(!store.path.exists());
    }
}
