//! Caller-facing upload lifecycle: initiate, confirm, poll, list, delete.

pub mod coordinator;

pub use coordinator::{
    ArtifactPage, ConfirmedUpload, DeletedArtifact, InitiatedUpload, Pagination, UploadCoordinator,
    UploadLimits, UploadStatusSnapshot, DEFAULT_MAX_FILE_SIZE, DEFAULT_WRITE_TTL,
};
