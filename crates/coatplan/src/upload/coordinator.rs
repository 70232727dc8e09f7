use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::analysis::CostRates;
use crate::db::{artifact_repo, surface_repo, Database};
use crate::error::{CoatplanError, Result, ValidationError};
use crate::model::{
    AnalysisStatus, AnalysisSummary, Artifact, DocumentMetadata, MimeKind, Surface, UploadStatus,
    VirusScanStatus,
};
use crate::queue::{JobPayload, JobQueue, JobStatus, QueueError};
use crate::sanitize;
use crate::storage::{self, ObjectStorage, WriteLocation};

/// 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
pub const DEFAULT_WRITE_TTL: Duration = Duration::from_secs(3600);

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_file_size: u64,
    pub write_ttl: Duration,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            write_ttl: DEFAULT_WRITE_TTL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedUpload {
    pub write_location: WriteLocation,
    pub artifact_id: String,
    pub storage_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedUpload {
    pub job_id: String,
}

/// Read-only projection of an artifact for status polling.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusSnapshot {
    pub artifact_id: String,
    pub upload_status: UploadStatus,
    pub analysis_status: AnalysisStatus,
    pub virus_scan_status: VirusScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_results: Option<AnalysisSummary>,
    pub public_url: String,
    /// Absent once the queue has garbage-collected the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current: u32,
    pub pages: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPage {
    pub items: Vec<Artifact>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedArtifact {
    pub artifact_id: String,
    pub surfaces_removed: usize,
}

/// Caller-facing upload operations. Every call is scoped to the owner.
pub struct UploadCoordinator {
    db: Database,
    storage: Arc<dyn ObjectStorage>,
    queue: JobQueue,
    limits: UploadLimits,
}

impl UploadCoordinator {
    pub fn new(
        db: Database,
        storage: Arc<dyn ObjectStorage>,
        queue: JobQueue,
        limits: UploadLimits,
    ) -> Self {
        Self {
            db,
            storage,
            queue,
            limits,
        }
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// Creates a pending artifact and a write location for its bytes.
    pub fn initiate_upload(
        &self,
        owner_id: &str,
        project_id: &str,
        mime_type: &str,
        declared_name: &str,
        declared_size: u64,
    ) -> Result<InitiatedUpload> {
        require("ownerId", owner_id)?;
        require("projectId", project_id)?;
        require("fileName", declared_name)?;

        if declared_size > self.limits.max_file_size {
            return Err(ValidationError::PayloadTooLarge {
                size: declared_size,
                limit: self.limits.max_file_size,
            }
            .into());
        }
        let kind = MimeKind::from_mime(mime_type)
            .ok_or_else(|| ValidationError::UnsupportedMediaType(mime_type.to_string()))?;

        let storage_key = storage::generate_storage_key(kind);
        // Issued first: an unused grant just expires, a record without one would linger.
        let write_location =
            self.storage
                .issue_write_location(&storage_key, kind.mime_type(), self.limits.write_ttl)?;

        let artifact = Artifact::new_pending(
            owner_id,
            project_id,
            &storage_key,
            declared_name,
            kind,
            declared_size,
        );
        artifact_repo::insert(&self.db, &artifact)?;

        log::info!(
            "Initiated upload {} ({}, {} bytes) as {}",
            artifact.id,
            sanitize::redact_file_name(declared_name),
            declared_size,
            sanitize::hash_key(&storage_key)
        );

        Ok(InitiatedUpload {
            write_location,
            artifact_id: artifact.id,
            storage_key,
        })
    }

    /// Moves the upload to `processing` and enqueues its analysis job.
    ///
    /// A second confirm for the same artifact fails with `PersistenceConflict`.
    pub fn confirm_upload(&self, artifact_id: &str, owner_id: &str) -> Result<ConfirmedUpload> {
        let artifact = self.owned(artifact_id, owner_id)?;

        if !artifact_repo::transition_upload(
            &self.db,
            &artifact.id,
            UploadStatus::Pending,
            UploadStatus::Processing,
        )? {
            let current = artifact_repo::find_by_id(&self.db, &artifact.id)?
                .map(|a| a.upload_status)
                .unwrap_or(artifact.upload_status);
            return Err(CoatplanError::PersistenceConflict(format!(
                "upload of artifact {} is '{}', expected 'pending'",
                artifact.id,
                current.as_str()
            )));
        }

        let payload = JobPayload::analyze(&artifact.id, &artifact.owner_id, &artifact.original_name);
        let job_id = match self.queue.enqueue(&payload, self.queue.default_options()) {
            Ok(id) => id,
            Err(e) => {
                self.revert_confirm(&artifact.id);
                return Err(e.into());
            }
        };
        artifact_repo::set_job_id(&self.db, &artifact.id, &job_id)?;

        log::info!("Confirmed upload {}; analysis job {}", artifact.id, job_id);
        Ok(ConfirmedUpload { job_id })
    }

    pub fn get_status(&self, artifact_id: &str, owner_id: &str) -> Result<UploadStatusSnapshot> {
        let artifact = self.owned(artifact_id, owner_id)?;

        let job = match artifact.job_id.as_deref() {
            Some(job_id) => match self.queue.get_job_status(job_id) {
                Ok(status) => Some(status),
                Err(QueueError::NotFound(_)) => None,
                Err(e) => {
                    log::warn!("Job status unavailable for artifact {}: {}", artifact.id, e);
                    None
                }
            },
            None => None,
        };

        Ok(UploadStatusSnapshot {
            public_url: self.storage.public_url(&artifact.storage_key),
            artifact_id: artifact.id,
            upload_status: artifact.upload_status,
            analysis_status: artifact.analysis_status,
            virus_scan_status: artifact.virus_scan_status,
            processing_error: artifact.processing_error,
            analysis_error: artifact.analysis_error,
            metadata: artifact.metadata,
            analysis_results: artifact.analysis_results,
            job,
        })
    }

    /// One page of the owner's artifacts in a project, newest first.
    pub fn list_artifacts(
        &self,
        owner_id: &str,
        project_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<ArtifactPage> {
        require("projectId", project_id)?;
        let page = page.unwrap_or(DEFAULT_PAGE);
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if page < 1 {
            return Err(invalid("page", "must be at least 1".to_string()));
        }
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(invalid("limit", format!("must be between 1 and {}", MAX_LIMIT)));
        }

        let offset = u64::from(page - 1) * u64::from(limit);
        let (items, total) =
            artifact_repo::list_for_project(&self.db, owner_id, project_id, limit, offset)?;

        Ok(ArtifactPage {
            items,
            pagination: Pagination {
                current: page,
                pages: total.div_ceil(u64::from(limit)),
                total,
            },
        })
    }

    /// Deletes the blob, then the record and every surface it produced.
    /// If the blob cannot be deleted the record is left untouched.
    pub fn delete_artifact(&self, artifact_id: &str, owner_id: &str) -> Result<DeletedArtifact> {
        let artifact = self.owned(artifact_id, owner_id)?;

        self.storage.delete_object(&artifact.storage_key)?;

        let surfaces_removed = artifact_repo::delete_with_surfaces(&self.db, &artifact.id)?
            .ok_or_else(|| CoatplanError::not_found("artifact", artifact_id))?;

        if let Some(job_id) = artifact.job_id.as_deref() {
            match self.queue.cancel(job_id) {
                Ok(_) | Err(QueueError::NotFound(_)) => {}
                Err(e) => log::warn!("Could not cancel job {} of deleted artifact: {}", job_id, e),
            }
        }

        log::info!(
            "Deleted artifact {} with {} surface row(s)",
            artifact.id,
            surfaces_removed
        );
        Ok(DeletedArtifact {
            artifact_id: artifact.id,
            surfaces_removed,
        })
    }

    /// Re-prices one persisted surface with new rates.
    pub fn recalculate_costs(
        &self,
        surface_id: &str,
        owner_id: &str,
        rates: &CostRates,
    ) -> Result<Surface> {
        let mut surface = surface_repo::find_by_id(&self.db, surface_id)?
            .ok_or_else(|| CoatplanError::not_found("surface", surface_id))?;
        if artifact_repo::find_owned(&self.db, &surface.artifact_id, owner_id)?.is_none() {
            return Err(CoatplanError::not_found("surface", surface_id));
        }

        surface.update_cost_estimates(rates);
        if !surface_repo::update_costs(&self.db, &surface.id, &surface.cost_estimates)? {
            return Err(CoatplanError::not_found("surface", surface_id));
        }
        Ok(surface)
    }

    /// Another owner's artifact is reported exactly like a missing one.
    fn owned(&self, artifact_id: &str, owner_id: &str) -> Result<Artifact> {
        artifact_repo::find_owned(&self.db, artifact_id, owner_id)?
            .ok_or_else(|| CoatplanError::not_found("artifact", artifact_id))
    }

    fn revert_confirm(&self, artifact_id: &str) {
        match artifact_repo::transition_upload(
            &self.db,
            artifact_id,
            UploadStatus::Processing,
            UploadStatus::Pending,
        ) {
            Ok(true) => log::warn!("Enqueue failed; upload {} is pending again", artifact_id),
            Ok(false) => {}
            Err(e) => log::error!("Could not revert upload {} to pending: {}", artifact_id, e),
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty".to_string()));
    }
    Ok(())
}

fn invalid(field: &'static str, reason: String) -> CoatplanError {
    ValidationError::InvalidField { field, reason }.into()
}
