use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use moka::sync::Cache;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::StorageError;

use super::{validate_key, ObjectStorage, WriteLocation};

const MAX_OUTSTANDING_GRANTS: u64 = 100_000;

#[derive(Debug, Clone)]
struct WriteGrant {
    key: String,
    content_type: String,
    expires: Instant,
}

/// Blob store backed by a local directory.
///
/// Write locations are single-use tokens held in a TTL cache; the upload URL
/// embeds the token so a client can PUT directly against it. Requested
/// lifetimes are capped at the cache's `max_ttl`.
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
    upload_base_url: String,
    max_ttl: Duration,
    grants: Cache<String, WriteGrant>,
}

impl LocalObjectStorage {
    pub fn new<P: AsRef<Path>>(
        root: P,
        public_base_url: &str,
        upload_base_url: &str,
        max_ttl: Duration,
    ) -> Self {
        let grants = Cache::builder()
            .max_capacity(MAX_OUTSTANDING_GRANTS)
            .time_to_live(max_ttl)
            .build();
        Self {
            root: root.as_ref().to_path_buf(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            upload_base_url: upload_base_url.trim_end_matches('/').to_string(),
            max_ttl,
            grants,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Writes next to the target, then renames into place so readers never
    /// observe a half-written object.
    fn write_atomically(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let parent = path.parent().unwrap_or(&self.root);
        self.ensure_directory(parent)?;

        let staging = parent.join(format!(".upload-{}", uuid::Uuid::new_v4().simple()));
        let write_err = |e| StorageError::WriteObject {
            path: path.to_path_buf(),
            source: e,
        };

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)
            .map_err(write_err)?;
        file.write_all(bytes).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        if let Err(e) = std::fs::rename(&staging, path) {
            let _ = std::fs::remove_file(&staging);
            return Err(write_err(e));
        }
        Ok(())
    }
}

impl ObjectStorage for LocalObjectStorage {
    fn issue_write_location(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<WriteLocation, StorageError> {
        validate_key(key)?;
        let ttl = ttl.min(self.max_ttl);

        let token = URL_SAFE_NO_PAD.encode(uuid::Uuid::new_v4().as_bytes());
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));

        self.grants.insert(
            token.clone(),
            WriteGrant {
                key: key.to_string(),
                content_type: content_type.to_string(),
                expires: Instant::now() + ttl,
            },
        );

        log::debug!("Issued write location for {} (ttl {:?})", key, ttl);

        Ok(WriteLocation {
            url: format!("{}/{}?token={}", self.upload_base_url, key, token),
            token,
            key: key.to_string(),
            content_type: content_type.to_string(),
            expires_at,
        })
    }

    fn put_object(
        &self,
        token: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        // Single use: the grant is consumed whether or not the write succeeds.
        let grant = self
            .grants
            .remove(token)
            .ok_or(StorageError::WriteLocationExpired)?;
        if Instant::now() >= grant.expires {
            return Err(StorageError::WriteLocationExpired);
        }
        if !grant.content_type.eq_ignore_ascii_case(content_type) {
            return Err(StorageError::ContentTypeMismatch {
                expected: grant.content_type,
                actual: content_type.to_string(),
            });
        }

        let path = self.object_path(&grant.key)?;
        self.write_atomically(&path, bytes)
    }

    fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::ObjectNotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::ReadObject { path, source: e }),
        }
    }

    fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteObject { path, source: e }),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}
