use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::backoff::RetryPolicy;

/// The fixed payload schema shared by the enqueuer and the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    AnalyzeArtifact {
        artifact_id: String,
        owner_id: String,
        file_name: String,
    },
}

impl JobPayload {
    pub fn analyze(artifact_id: &str, owner_id: &str, file_name: &str) -> Self {
        JobPayload::AnalyzeArtifact {
            artifact_id: artifact_id.to_string(),
            owner_id: owner_id.to_string(),
            file_name: file_name.to_string(),
        }
    }

    pub fn artifact_id(&self) -> &str {
        match self {
            JobPayload::AnalyzeArtifact { artifact_id, .. } => artifact_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(JobState::Waiting),
            "active" => Some(JobState::Active),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            _ => None,
        }
    }

    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Waiting, Active) | (Active, Completed) | (Active, Failed) | (Active, Waiting)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-job delivery options. Lower priority numbers are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    pub priority: i32,
    pub timeout: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 1,
            timeout: Duration::from_secs(300),
        }
    }
}

/// What callers may observe about a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: String,
    pub state: JobState,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// A job leased to one worker. Acknowledgements must present the lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    pub id: String,
    pub payload: JobPayload,
    /// 1-based attempt number of this delivery.
    pub attempt: u32,
    /// Retry policy fixed when the job was enqueued.
    pub retry: RetryPolicy,
    pub lease_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Rescheduled; the next delivery is not before `delay` from now.
    Retrying { attempt: u32, delay: Duration },
    /// Terminal. Not retried again.
    Failed { attempts: u32 },
    /// The lease had already expired or moved on; nothing changed.
    LeaseLost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_tagged() {
        let payload = JobPayload::analyze("a-1", "o-1", "plan.pdf");
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "analyze_artifact");
        assert_eq!(json["artifact_id"], "a-1");

        let back: JobPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.artifact_id(), "a-1");
    }

    #[test]
    fn test_unknown_payload_type_rejected() {
        let result: Result<JobPayload, _> =
            serde_json::from_str(r#"{"type":"reindex","artifact_id":"a"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_state_transitions() {
        use JobState::*;
        assert!(Waiting.can_transition_to(Active));
        assert!(Active.can_transition_to(Waiting));
        assert!(!Waiting.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Waiting));
        assert!(Completed.is_terminal() && Failed.is_terminal());
        assert!(!Active.is_terminal());
    }
}
