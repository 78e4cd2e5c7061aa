use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB backend, tagged with the operation that failed.
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
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save game `{code}`")]
    SaveGame {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load game `{code}`")]
    LoadGame {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete game `{code}`")]
    DeleteGame {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save player `{name_key}` of game `{code}`")]
    SavePlayer {
        code: String,
        name_key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load players of game `{code}`")]
    LoadPlayers {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete player `{name_key}` of game `{code}`")]
    DeletePlayer {
        code: String,
        name_key: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to record answer for game `{code}`")]
    RecordAnswer {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load answers of game `{code}`")]
    LoadAnswers {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to sweep stale games")]
    SweepGames {
        #[source]
        source: MongoError,
    },
}
