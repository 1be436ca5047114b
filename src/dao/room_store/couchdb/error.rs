use reqwest::StatusCode;
use thiserror::Error;

pub type CouchResult<T> = Result<T, CouchDaoError>;

/// What went wrong talking to the CouchDB database holding room documents.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    #[error("room store setting `{var}` is not set")]
    MissingEnvVar { var: &'static str },
    #[error("could not build the HTTP client for the room database")]
    HttpClient {
        #[source]
        source: reqwest::Error,
    },
    /// Probing or creating the room database failed at the transport level.
    #[error("room database `{database}` could not be {action}")]
    Database {
        database: String,
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("room database `{database}` answered {status}")]
    DatabaseStatus {
        database: String,
        status: StatusCode,
    },
    /// The request for a room document (or the database itself) never got an answer.
    #[error("request for `{doc_id}` failed")]
    Transport {
        doc_id: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("`{doc_id}` answered {status}")]
    UnexpectedStatus { doc_id: String, status: StatusCode },
    #[error("`{doc_id}` does not hold a readable room document")]
    Decode {
        doc_id: String,
        #[source]
        source: reqwest::Error,
    },
    /// Every conditional write lost against a newer `_rev`.
    #[error("room document `{doc_id}` still contended after {attempts} attempt(s)")]
    Contended { doc_id: String, attempts: u32 },
}
