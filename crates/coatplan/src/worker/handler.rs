use thiserror::Error;

use crate::broadcast::AnalysisProgressBroadcaster;
use crate::pipeline::{AnalysisWorker, BroadcastProgress, NoopProgress};
use crate::queue::{ClaimedJob, JobPayload};

/// How a failed attempt should be treated by the queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Another attempt may succeed; retried with backoff.
    #[error("{0}")]
    Transient(String),

    /// Goes straight to terminal `failed`.
    #[error("{0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            HandlerError::Transient(m) | HandlerError::Permanent(m) => m,
        }
    }
}

pub trait JobHandler: Send + Sync {
    fn handle(&self, job: &ClaimedJob) -> Result<(), HandlerError>;
}

/// Runs `AnalyzeArtifact` jobs through the analysis worker.
pub struct AnalysisJobHandler {
    worker: AnalysisWorker,
    progress: Option<AnalysisProgressBroadcaster>,
}

impl AnalysisJobHandler {
    pub fn new(worker: AnalysisWorker) -> Self {
        Self {
            worker,
            progress: None,
        }
    }

    /// Publishes each run's phases on `broadcaster`.
    pub fn with_progress(worker: AnalysisWorker, broadcaster: AnalysisProgressBroadcaster) -> Self {
        Self {
            worker,
            progress: Some(broadcaster),
        }
    }
}

impl JobHandler for AnalysisJobHandler {
    fn handle(&self, job: &ClaimedJob) -> Result<(), HandlerError> {
        match &job.payload {
            JobPayload::AnalyzeArtifact { artifact_id, .. } => {
                let result = match &self.progress {
                    Some(broadcaster) => {
                        let progress = BroadcastProgress::new(broadcaster, artifact_id, Some(&job.id));
                        self.worker.run(artifact_id, Some(&job.id), &progress)
                    }
                    None => self.worker.run(artifact_id, Some(&job.id), &NoopProgress),
                };

                result.map(|_| ()).map_err(|e| {
                    if e.is_retryable() {
                        HandlerError::Transient(e.to_string())
                    } else {
                        HandlerError::Permanent(e.to_string())
                    }
                })
            }
        }
    }
}
