//! Error types for pinboard components.
//!
//! Repository, color table, queue and cache operations return
//! [`Result`] with a typed [`Error`]. The CLI converts these into
//! user-facing messages with `anyhow` context.

/// Result type for pinboard operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the pin store and the image pipeline.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Bad input rejected before anything is persisted.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Operation addressed an unknown pin.
    #[error("pin not found: {id}")]
    NotFound { id: String },

    /// Storage hiccup that is worth retrying.
    #[error("transient storage error on '{filename}': {source}")]
    TransientStorage {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    /// Artifact request that will never succeed (corrupt data, exhausted retries).
    #[error("artifact '{filename}' failed permanently: {reason}")]
    PermanentArtifact { filename: String, reason: String },

    /// Internal invariant broken; logged, never silently repaired.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    /// SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a permanent artifact error.
    pub fn permanent(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PermanentArtifact {
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    /// Classify an I/O failure on an artifact.
    ///
    /// Malformed names and data can never succeed on retry; everything else
    /// (full disk, permissions flapping, interrupted writes) is treated as
    /// transient.
    pub fn storage(filename: impl Into<String>, source: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let filename = filename.into();
        match source.kind() {
            ErrorKind::InvalidInput | ErrorKind::InvalidData | ErrorKind::Unsupported => {
                Self::PermanentArtifact {
                    filename,
                    reason: source.to_string(),
                }
            },
            _ => Self::TransientStorage { filename, source },
        }
    }

    /// Whether the artifact queue should retry after this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientStorage { .. } => true,
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_storage_error_classification() {
        let err = Error::storage("a.jpg", io::Error::other("disk full"));
        assert!(err.is_transient());

        let err = Error::storage("a.jpg", io::Error::new(io::ErrorKind::InvalidInput, "bad"));
        assert!(!err.is_transient());
        assert!(matches!(err, Error::PermanentArtifact { .. }));
    }

    #[test]
    fn test_validation_is_not_transient() {
        assert!(!Error::validation("blank").is_transient());
        assert!(!Error::not_found("x").is_transient());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(Error::not_found("abc").to_string(), "pin not found: abc");
        assert_eq!(
            Error::permanent("x.jpg", "corrupt").to_string(),
            "artifact 'x.jpg' failed permanently: corrupt"
        );
    }
}
