use std::error::Error;
use thiserror::Error;

/// Result of a game store call.
pub type StorageResult<T> = Result<T, StorageError>;

/// A game store could not load or save games, players or answers.
///
/// Sessions keep running on their in-memory state when this happens; the backend error stays
/// attached as the source for logs.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("game store unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn backend_error_is_kept_as_source() {
        let err = StorageError::unavailable(
            "connection refused".into(),
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert_eq!(err.to_string(), "game store unavailable: connection refused");
        let source = err.source().unwrap();
        assert!(source.is::<io::Error>());
    }
}
