use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info_span;

use crate::analysis::{self, CostRates};
use crate::broadcast::AnalysisPhase;
use crate::db::{artifact_repo, surface_repo, Database};
use crate::detection::SurfaceDetector;
use crate::error::{CoatplanError, StorageError, ValidationError};
use crate::intake::{self, MalwareScanner, ScanVerdict};
use crate::model::{AnalysisSummary, UploadStatus, VirusScanResult, VirusScanStatus};
use crate::sanitize;
use crate::storage::ObjectStorage;

use super::context::AnalysisContext;
use super::error::AnalysisError;
use super::progress::{NoopProgress, ProgressEvent, ProgressReporter};

/// Result of one successful analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub artifact_id: String,
    pub generation_id: String,
    pub surface_count: u32,
    pub summary: AnalysisSummary,
}

/// Drives one artifact through intake and the analysis state machine.
///
/// Only the worker holding the artifact's job mutates its record and surfaces.
pub struct AnalysisWorker {
    db: Database,
    storage: Arc<dyn ObjectStorage>,
    detector: Arc<dyn SurfaceDetector>,
    scanner: Arc<dyn MalwareScanner>,
    rates: CostRates,
}

impl AnalysisWorker {
    pub fn new(
        db: Database,
        storage: Arc<dyn ObjectStorage>,
        detector: Arc<dyn SurfaceDetector>,
        scanner: Arc<dyn MalwareScanner>,
        rates: CostRates,
    ) -> Self {
        Self {
            db,
            storage,
            detector,
            scanner,
            rates,
        }
    }

    pub fn rates(&self) -> &CostRates {
        &self.rates
    }

    /// Analyzes one artifact outside of any job.
    pub fn run_analysis(&self, artifact_id: &str) -> Result<AnalysisOutcome, CoatplanError> {
        self.run(artifact_id, None, &NoopProgress)
            .map_err(CoatplanError::from)
    }

    /// Runs intake (if the upload is still processing) and then analysis.
    ///
    /// Errors after analysis started leave the record `failed` with the
    /// message; surfaces of an earlier successful run stay attached. A run
    /// superseded by a later start of the same artifact changes nothing.
    pub fn run(
        &self,
        artifact_id: &str,
        job_id: Option<&str>,
        progress: &dyn ProgressReporter,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let artifact = artifact_repo::find_by_id(&self.db, artifact_id)?
            .ok_or_else(|| AnalysisError::ArtifactNotFound(artifact_id.to_string()))?;
        let mut ctx = AnalysisContext::new(artifact, job_id);

        let file_name = sanitize::redact_file_name(&ctx.artifact.original_name);
        let _analysis_span = info_span!("analysis",
            artifact_id = %ctx.artifact.id,
            job_id = job_id.unwrap_or("-"),
            generation = %ctx.generation_id,
            file_name = %file_name,
        )
        .entered();

        if ctx.artifact.upload_status == UploadStatus::Processing {
            let _step = info_span!("intake").entered();
            progress.report(ProgressEvent::Phase {
                phase: AnalysisPhase::Intake,
                message: "Scanning and inspecting upload...".to_string(),
            });
            if let Err(e) = self.step_intake(&mut ctx) {
                progress.report(ProgressEvent::Failed {
                    error: e.to_string(),
                });
                return Err(e);
            }
        }

        if let Err(e) = self.step_start(&ctx) {
            progress.report(ProgressEvent::Failed {
                error: e.to_string(),
            });
            return Err(e);
        }

        match self.analyze(&mut ctx, progress) {
            Ok(outcome) => {
                progress.report(ProgressEvent::Completed {
                    surface_count: outcome.surface_count,
                });
                log::info!(
                    "Analysis of artifact {} completed with {} surface(s)",
                    outcome.artifact_id,
                    outcome.surface_count
                );
                Ok(outcome)
            }
            Err(e) => {
                let message = e.to_string();
                match artifact_repo::fail_analysis(
                    &self.db,
                    &ctx.artifact.id,
                    &ctx.generation_id,
                    &message,
                ) {
                    Ok(true) => {}
                    Ok(false) => log::warn!(
                        "Run {} of artifact {} was superseded; record left untouched",
                        ctx.generation_id,
                        ctx.artifact.id
                    ),
                    Err(db_err) => log::error!(
                        "Failed to record analysis failure for {}: {}",
                        ctx.artifact.id,
                        db_err
                    ),
                }
                progress.report(ProgressEvent::Failed {
                    error: message.clone(),
                });
                log::warn!("Analysis of artifact {} failed: {}", ctx.artifact.id, message);
                Err(e)
            }
        }
    }

    fn analyze(
        &self,
        ctx: &mut AnalysisContext,
        progress: &dyn ProgressReporter,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        {
            let _step = info_span!("detect").entered();
            progress.report(ProgressEvent::Phase {
                phase: AnalysisPhase::Detecting,
                message: "Detecting surfaces...".to_string(),
            });
            self.step_detect(ctx)?;
        }

        {
            let _step = info_span!("classify").entered();
            progress.report(ProgressEvent::Phase {
                phase: AnalysisPhase::Classifying,
                message: "Assigning treatments...".to_string(),
            });
            self.step_classify(ctx);
        }

        {
            let _step = info_span!("plan").entered();
            progress.report(ProgressEvent::Phase {
                phase: AnalysisPhase::Planning,
                message: "Planning preparation and costs...".to_string(),
            });
            self.step_plan(ctx);
        }

        {
            let _step = info_span!("group").entered();
            progress.report(ProgressEvent::Phase {
                phase: AnalysisPhase::Grouping,
                message: "Grouping adjacent areas...".to_string(),
            });
            let links = analysis::group_adjacent_surfaces(&mut ctx.surfaces);
            log::debug!("Linked {} adjacent pair(s)", links);
        }

        {
            let _step = info_span!("persist").entered();
            progress.report(ProgressEvent::Phase {
                phase: AnalysisPhase::Persisting,
                message: "Saving surfaces...".to_string(),
            });
            self.step_persist(ctx)?;
        }

        let summary = ctx.summary.clone().unwrap_or_default();
        Ok(AnalysisOutcome {
            artifact_id: ctx.artifact.id.clone(),
            generation_id: ctx.generation_id.clone(),
            surface_count: summary.surface_count,
            summary,
        })
    }

    /// Sniff, scan and probe the uploaded bytes, then complete the upload.
    fn step_intake(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        let id = ctx.artifact.id.clone();

        let bytes = match self.storage.get_object(&ctx.artifact.storage_key) {
            Ok(bytes) => bytes,
            Err(StorageError::ObjectNotFound(_)) => {
                return Err(self.reject_upload(&id, "object not found".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let Some(kind) = ctx.artifact.mime_kind() else {
            let reason = format!("unsupported media type '{}'", ctx.artifact.mime_type);
            return Err(self.reject_upload(&id, reason));
        };
        if let Err(e) = intake::verify_content_type(kind, &bytes) {
            return Err(self.reject_upload(&id, e.to_string()));
        }

        artifact_repo::record_scan(&self.db, &id, VirusScanStatus::Scanning, None)?;
        let verdict = match self.scanner.scan(&bytes) {
            Ok(verdict) => verdict,
            Err(e) => {
                artifact_repo::record_scan(&self.db, &id, VirusScanStatus::Pending, None)?;
                return Err(e.into());
            }
        };
        match verdict {
            ScanVerdict::Clean => {
                let result = VirusScanResult {
                    scanned_at: Utc::now(),
                    is_clean: true,
                    threat_details: None,
                };
                artifact_repo::record_scan(&self.db, &id, VirusScanStatus::Clean, Some(&result))?;
            }
            ScanVerdict::Infected { threat } => {
                let result = VirusScanResult {
                    scanned_at: Utc::now(),
                    is_clean: false,
                    threat_details: Some(threat.clone()),
                };
                artifact_repo::record_scan(
                    &self.db,
                    &id,
                    VirusScanStatus::Infected,
                    Some(&result),
                )?;
                return Err(self.reject_upload(&id, format!("malware detected: {}", threat)));
            }
        }

        let metadata = match intake::probe_metadata(kind, &bytes) {
            Ok(metadata) => metadata,
            Err(e) => return Err(self.reject_upload(&id, e.to_string())),
        };
        if !artifact_repo::complete_upload(&self.db, &id, &metadata)? {
            return Err(AnalysisError::Conflict(format!(
                "upload of artifact {} left processing during intake",
                id
            )));
        }
        log::info!("Upload of artifact {} completed intake", id);

        ctx.artifact = artifact_repo::find_by_id(&self.db, &id)?
            .ok_or_else(|| AnalysisError::ArtifactNotFound(id.clone()))?;
        Ok(())
    }

    /// Marks the upload failed and returns the permanent error for the job.
    fn reject_upload(&self, id: &str, reason: String) -> AnalysisError {
        if let Err(e) = artifact_repo::fail_upload(&self.db, id, &reason) {
            return e.into();
        }
        log::warn!("Upload of artifact {} rejected: {}", id, reason);
        AnalysisError::UploadRejected(reason)
    }

    fn step_start(&self, ctx: &AnalysisContext) -> Result<(), AnalysisError> {
        if let Some(reason) = ctx.artifact.analysis_gate() {
            return Err(ValidationError::AnalysisGated(reason).into());
        }
        if !artifact_repo::start_analysis(&self.db, &ctx.artifact.id, &ctx.generation_id)? {
            return Err(ValidationError::AnalysisGated(
                "upload is no longer completed and clean".to_string(),
            )
            .into());
        }
        Ok(())
    }

    fn step_detect(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        let observations = self.detector.detect(&ctx.artifact)?;
        for observation in &observations {
            observation.validate()?;
        }
        analysis::ensure_unique_area_numbers(&observations)?;
        log::debug!("Detector returned {} observation(s)", observations.len());
        ctx.observations = observations;
        Ok(())
    }

    fn step_classify(&self, ctx: &mut AnalysisContext) {
        ctx.surfaces = ctx
            .observations
            .iter()
            .map(|o| {
                analysis::classify(
                    o,
                    &ctx.artifact.project_id,
                    &ctx.artifact.id,
                    &ctx.generation_id,
                )
            })
            .collect();
    }

    fn step_plan(&self, ctx: &mut AnalysisContext) {
        for surface in &mut ctx.surfaces {
            analysis::plan(surface, &self.rates);
        }
    }

    fn step_persist(&self, ctx: &mut AnalysisContext) -> Result<(), AnalysisError> {
        let summary = analysis::summarize(&ctx.surfaces);
        surface_repo::commit_generation(
            &self.db,
            &ctx.artifact.id,
            &ctx.generation_id,
            &ctx.surfaces,
            &summary,
        )?;
        ctx.summary = Some(summary);
        Ok(())
    }
}
