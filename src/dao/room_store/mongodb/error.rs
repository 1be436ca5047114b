use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build the room store client")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("room database unreachable after {attempts} ping attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("room database health ping failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to load room `{room_id}`")]
    LoadRoom {
        room_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save room `{room_id}`")]
    SaveRoom {
        room_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete room `{room_id}`")]
    DeleteRoom {
        room_id: String,
        #[source]
        source: MongoError,
    },
    #[error("room `{room_id}` still contended after {attempts} attempt(s)")]
    Contended { room_id: String, attempts: u32 },
}
