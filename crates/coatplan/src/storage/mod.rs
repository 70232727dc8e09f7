//! Object storage collaborator.
//!
//! The pipeline only needs four things from a blob store: a time-limited,
//! single-use write location for one key, a way to read the bytes back for
//! intake, deletion, and a deterministic public URL.

pub mod filesystem;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StorageError;
use crate::model::MimeKind;

pub use filesystem::LocalObjectStorage;

/// A write location scoped to exactly one key and content type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteLocation {
    pub url: String,
    pub token: String,
    pub key: String,
    pub content_type: String,
    pub expires_at: DateTime<Utc>,
}

pub trait ObjectStorage: Send + Sync {
    fn issue_write_location(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<WriteLocation, StorageError>;

    /// Uploads bytes against a previously issued write location.
    /// Rejects unknown, expired or already used tokens.
    fn put_object(
        &self,
        token: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError>;

    fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Deleting a key that does not exist succeeds.
    fn delete_object(&self, key: &str) -> Result<(), StorageError>;

    fn public_url(&self, key: &str) -> String;
}

/// Builds `blueprints/<random>.<ext>` from a collision-resistant token.
pub fn generate_storage_key(kind: MimeKind) -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("blueprints/{}.{}", &token[..24], kind.extension())
}

/// Rejects keys that could escape the storage root.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.starts_with('\\')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|segment| segment == ".." || segment == "." || segment.is_empty());
    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
