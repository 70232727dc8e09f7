use std::path::PathBuf;
use thiserror::Error;

/// Top-level error returned by the public coordinator and worker entry points.
#[derive(Error, Debug)]
pub enum CoatplanError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Job queue unavailable: {0}")]
    QueueUnavailable(#[source] crate::queue::QueueError),

    #[error("Surface detection failed: {0}")]
    DetectionFailure(#[from] crate::detection::DetectionError),

    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[source] crate::db::DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CoatplanError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<crate::db::DatabaseError> for CoatplanError {
    fn from(err: crate::db::DatabaseError) -> Self {
        match err {
            crate::db::DatabaseError::Conflict(message) => Self::PersistenceConflict(message),
            other => Self::Database(other),
        }
    }
}

impl From<crate::queue::QueueError> for CoatplanError {
    fn from(err: crate::queue::QueueError) -> Self {
        match err {
            crate::queue::QueueError::NotFound(id) => Self::not_found("job", id),
            other => Self::QueueUnavailable(other),
        }
    }
}

/// Caller-side mistakes. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("File size {size} exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Duplicate area number '{0}' in analysis result")]
    DuplicateAreaNumber(String),

    #[error("Analysis cannot start: {0}")]
    AnalysisGated(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write object '{path}': {source}")]
    WriteObject {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read object '{path}': {source}")]
    ReadObject {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete object '{path}': {source}")]
    DeleteObject {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Write location is unknown, expired or already used")]
    WriteLocationExpired,

    #[error("Content type '{actual}' does not match write location ('{expected}')")]
    ContentTypeMismatch { expected: String, actual: String },
}

pub type Result<T> = std::result::Result<T, CoatplanError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseError;
    use crate::queue::QueueError;

    #[test]
    fn test_database_conflict_maps_to_persistence_conflict() {
        let err: CoatplanError = DatabaseError::Conflict("area A1 taken".to_string()).into();
        assert!(matches!(err, CoatplanError::PersistenceConflict(m) if m == "area A1 taken"));
    }

    #[test]
    fn test_queue_errors_map_to_taxonomy() {
        let err: CoatplanError = QueueError::NotFound("job-1".to_string()).into();
        assert!(matches!(err, CoatplanError::NotFound { kind: "job", .. }));

        let err: CoatplanError = QueueError::Unavailable(DatabaseError::LockPoisoned).into();
        assert!(matches!(err, CoatplanError::QueueUnavailable(_)));
    }

    #[test]
    fn test_validation_messages() {
        let err = ValidationError::PayloadTooLarge {
            size: 60,
            limit: 50,
        };
        assert_eq!(err.to_string(), "File size 60 exceeds limit of 50 bytes");
    }
}
