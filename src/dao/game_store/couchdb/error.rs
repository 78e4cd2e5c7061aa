//! Failures of the CouchDB game store.

use reqwest::StatusCode;
use thiserror::Error;

/// Result of a CouchDB document call.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Why a game, player or answer document could not be read or written.
///
/// Document-level variants carry the document id (`game::CODE`, `player::CODE:key`,
/// `response::CODE:id`) or the id prefix of a listing.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    #[error("CouchDB game store needs `{var}` to be set")]
    MissingEnvVar { var: &'static str },
    #[error("could not build the CouchDB HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The quiz database could not be reached.
    #[error("quiz database `{database}` is unreachable")]
    DatabaseQuery {
        database: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("could not create quiz database `{database}`")]
    DatabaseCreate {
        database: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("quiz database `{database}` answered with status {status}")]
    DatabaseStatus {
        database: String,
        status: StatusCode,
    },
    #[error("request for `{doc}` could not be sent")]
    RequestSend {
        doc: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request for `{doc}` failed with status {status}")]
    RequestStatus { doc: String, status: StatusCode },
    #[error("response for `{doc}` is not valid JSON")]
    DecodeResponse {
        doc: String,
        #[source]
        source: reqwest::Error,
    },
    /// A listed document is not a game, player or answer record of the expected shape.
    #[error("stored record under `{doc}` does not match its model")]
    MalformedRecord {
        doc: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::storage::StorageError;

    #[test]
    fn messages_name_the_document() {
        let err = CouchDaoError::RequestStatus {
            doc: "player::ABC234:616461".into(),
            status: StatusCode::CONFLICT,
        };
        assert_eq!(
            err.to_string(),
            "request for `player::ABC234:616461` failed with status 409 Conflict"
        );
        let storage: StorageError = err.into();
        assert_eq!(
            storage.to_string(),
            "game store unavailable: request for `player::ABC234:616461` failed with status 409 Conflict"
        );
    }

    #[test]
    fn malformed_listing_keeps_its_prefix() {
        let source = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err = CouchDaoError::MalformedRecord {
            doc: "response::ABC234:".into(),
            source,
        };
        assert!(err.to_string().contains("response::ABC234:"));
    }
}
