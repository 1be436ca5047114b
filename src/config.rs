//! Application-level configuration loading: genre timeouts, scoring rules and client settings.

use std::{
    collections::HashMap,
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

use crate::services::scoring::ScoringRules;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_ROOM_CONFIG_PATH";
/// Timeout used for genres missing from the table.
const DEFAULT_QUESTION_TIMEOUT: Duration = Duration::from_millis(30_000);
const DEFAULT_REVEAL_HOLD: Duration = Duration::from_millis(3_000);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_NOTICE_PATH: &str = "data/rank_notice.json";

/// Static genre → question duration table with a fallback for unknown genres.
#[derive(Debug, Clone, PartialEq)]
pub struct GenreTimeouts {
    table: HashMap<String, Duration>,
    fallback: Duration,
}

impl GenreTimeouts {
    /// Empty table answering `fallback` for every genre.
    pub fn new(fallback: Duration) -> Self {
        Self {
            table: HashMap::new(),
            fallback,
        }
    }

    pub fn with_genre(mut self, genre: impl Into<String>, timeout: Duration) -> Self {
        self.table.insert(genre.into(), timeout);
        self
    }

    /// Duration of one question of `genre`.
    pub fn timeout_for(&self, genre: &str) -> Duration {
        self.table.get(genre).copied().unwrap_or(self.fallback)
    }
}

impl Default for GenreTimeouts {
    fn default() -> Self {
        Self::new(DEFAULT_QUESTION_TIMEOUT)
            .with_genre("math", Duration::from_millis(45_000))
            .with_genre("speed", Duration::from_millis(15_000))
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub timeouts: GenreTimeouts,
    pub scoring: ScoringRules,
    /// How long a revealed answer stays up before the leader moves on.
    pub reveal_hold: Duration,
    /// Subscription polling cadence for stores without push notifications.
    pub poll_interval: Duration,
    pub quizzes_path: Option<PathBuf>,
    pub notice_path: PathBuf,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        Self::load_from(&resolve_config_path())
    }

    fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        genres = app_config.timeouts.table.len(),
                        "loaded room configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde_as(as = "HashMap<_, DurationMilliSeconds<u64>>")]
    genre_timeouts: HashMap<String, Duration>,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    default_timeout_ms: Duration,
    scoring: ScoringRules,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    reveal_hold_ms: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    poll_interval_ms: Duration,
    quizzes_path: Option<PathBuf>,
    notice_path: PathBuf,
}

impl Default for RawConfig {
    fn default() -> Self {
        let timeouts = GenreTimeouts::default();
        Self {
            genre_timeouts: timeouts.table,
            default_timeout_ms: timeouts.fallback,
            scoring: ScoringRules::default(),
            reveal_hold_ms: DEFAULT_REVEAL_HOLD,
            poll_interval_ms: DEFAULT_POLL_INTERVAL,
            quizzes_path: None,
            notice_path: PathBuf::from(DEFAULT_NOTICE_PATH),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            timeouts: GenreTimeouts {
                table: value.genre_timeouts,
                fallback: value.default_timeout_ms,
            },
            scoring: value.scoring,
            reveal_hold: value.reveal_hold_ms,
            poll_interval: value.poll_interval_ms,
            quizzes_path: value.quizzes_path,
            notice_path: value.notice_path,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_genre_uses_fallback() {
        let timeouts = GenreTimeouts::new(Duration::from_secs(20))
            .with_genre("history", Duration::from_secs(30));
        assert_eq!(timeouts.timeout_for("history"), Duration::from_secs(30));
        assert_eq!(timeouts.timeout_for("unknown"), Duration::from_secs(20));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"genreTimeouts": {"history": 30000}, "scoring": {"penaltyMagnitude": 3}}"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(
            config.timeouts.timeout_for("history"),
            Duration::from_millis(30_000)
        );
        assert_eq!(config.timeouts.timeout_for("math"), DEFAULT_QUESTION_TIMEOUT);
        assert_eq!(config.scoring.penalty_magnitude, 3);
        assert_eq!(config.scoring.correct_answer_score, 10);
        assert_eq!(config.reveal_hold, DEFAULT_REVEAL_HOLD);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from(Path::new("/definitely/not/here.json"));
        assert_eq!(config.timeouts, GenreTimeouts::default());
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }
}
