use thiserror::Error;

use crate::db::DatabaseError;
use crate::detection::DetectionError;
use crate::error::{CoatplanError, StorageError, ValidationError};
use crate::intake::IntakeError;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Artifact '{0}' not found")]
    ArtifactNotFound(String),

    /// Intake refused the upload; the record is already marked `failed`.
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Surface detection failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Intake failed: {0}")]
    Intake(#[from] IntakeError),

    #[error("Persistence conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[source] DatabaseError),
}

impl AnalysisError {
    /// Whether another attempt could succeed without outside intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::Detection(DetectionError::Malformed(_)) => false,
            AnalysisError::Detection(_) => true,
            AnalysisError::Storage(StorageError::ObjectNotFound(_)) => false,
            AnalysisError::Storage(_) => true,
            // Only scanner outages reach here; content problems become UploadRejected.
            AnalysisError::Intake(_) => true,
            AnalysisError::Database(_) => true,
            AnalysisError::ArtifactNotFound(_)
            | AnalysisError::UploadRejected(_)
            | AnalysisError::Validation(_)
            | AnalysisError::Conflict(_) => false,
        }
    }
}

impl From<DatabaseError> for AnalysisError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Conflict(message) => AnalysisError::Conflict(message),
            other => AnalysisError::Database(other),
        }
    }
}

impl From<AnalysisError> for CoatplanError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::ArtifactNotFound(id) => CoatplanError::not_found("artifact", id),
            AnalysisError::UploadRejected(reason) => {
                CoatplanError::Validation(ValidationError::AnalysisGated(reason))
            }
            AnalysisError::Validation(e) => CoatplanError::Validation(e),
            AnalysisError::Detection(e) => CoatplanError::DetectionFailure(e),
            AnalysisError::Storage(e) => CoatplanError::Storage(e),
            AnalysisError::Intake(e) => {
                CoatplanError::DetectionFailure(DetectionError::Unavailable(e.to_string()))
            }
            AnalysisError::Conflict(message) => CoatplanError::PersistenceConflict(message),
            AnalysisError::Database(e) => CoatplanError::Database(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(AnalysisError::Detection(DetectionError::Unavailable("down".into())).is_retryable());
        assert!(!AnalysisError::Detection(DetectionError::Malformed("bad".into())).is_retryable());
        assert!(!AnalysisError::Validation(ValidationError::DuplicateAreaNumber("A1".into()))
            .is_retryable());
        assert!(!AnalysisError::Conflict("taken".into()).is_retryable());
        assert!(AnalysisError::Intake(IntakeError::Scanner("timeout".into())).is_retryable());
        assert!(!AnalysisError::Storage(StorageError::ObjectNotFound("k".into())).is_retryable());
    }

    #[test]
    fn test_database_conflict_becomes_conflict() {
        let err: AnalysisError = DatabaseError::Conflict("area clash".into()).into();
        assert!(matches!(err, AnalysisError::Conflict(_)));
        let top: CoatplanError = err.into();
        assert!(matches!(top, CoatplanError::PersistenceConflict(_)));
    }

    #[test]
    fn test_missing_artifact_maps_to_not_found() {
        let top: CoatplanError = AnalysisError::ArtifactNotFound("a1".into()).into();
        assert!(matches!(top, CoatplanError::NotFound { kind: "artifact", .. }));
    }
}
