use std::{env, time::Duration};

use super::error::{CouchDaoError, CouchResult};

const BASE_URL_VAR: &str = "COUCH_BASE_URL";
const DATABASE_VAR: &str = "COUCH_DB";
const USERNAME_VAR: &str = "COUCH_USERNAME";
const PASSWORD_VAR: &str = "COUCH_PASSWORD";

/// Where room documents live in CouchDB and how often subscriptions poll them.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    /// Basic-auth pair, only used when both halves are set.
    pub credentials: Option<(String, String)>,
    pub poll_interval: Duration,
}

impl CouchConfig {
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            credentials: None,
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Read `COUCH_BASE_URL` and `COUCH_DB`, plus optional `COUCH_USERNAME`/`COUCH_PASSWORD`.
    pub fn from_env() -> CouchResult<Self> {
        let mut config = Self::new(required(BASE_URL_VAR)?, required(DATABASE_VAR)?);
        config.credentials = env::var(USERNAME_VAR).ok().zip(env::var(PASSWORD_VAR).ok());
        Ok(config)
    }
}

fn required(var: &'static str) -> CouchResult<String> {
    env::var(var).map_err(|_| CouchDaoError::MissingEnvVar { var })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::storage::StorageError;

    #[test]
    fn new_config_polls_twice_a_second_without_credentials() {
        let config = CouchConfig::new("http://localhost:5984", "rooms")
            .with_poll_interval(Duration::from_millis(200));
        assert_eq!(config.database, "rooms");
        assert!(config.credentials.is_none());
        assert_eq!(config.poll_interval, Duration::from_millis(200));
        assert_eq!(
            CouchConfig::new("http://localhost:5984", "rooms").poll_interval,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn contention_errors_name_the_room_document() {
        let err = CouchDaoError::Contended {
            doc_id: "room:abc".into(),
            attempts: 3,
        };
        assert!(err.to_string().contains("room:abc"));
        match StorageError::from(err) {
            StorageError::Unavailable { message, .. } => assert!(message.contains("room:abc")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
