//! Analysis progress broadcaster for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Step of the per-artifact analysis state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisPhase {
    Received,
    Intake,
    Detecting,
    Classifying,
    Planning,
    Grouping,
    Persisting,
    Done,
    Failed,
}

impl AnalysisPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, AnalysisPhase::Done | AnalysisPhase::Failed)
    }
}

impl std::fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisPhase::Received => write!(f, "Received"),
            AnalysisPhase::Intake => write!(f, "Checking upload"),
            AnalysisPhase::Detecting => write!(f, "Detecting surfaces"),
            AnalysisPhase::Classifying => write!(f, "Classifying"),
            AnalysisPhase::Planning => write!(f, "Planning preparation"),
            AnalysisPhase::Grouping => write!(f, "Grouping adjacent areas"),
            AnalysisPhase::Persisting => write!(f, "Saving"),
            AnalysisPhase::Done => write!(f, "Done"),
            AnalysisPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress event for one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisProgressEvent {
    pub artifact_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub phase: AnalysisPhase,
    /// Human-readable message describing current activity.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Set on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_count: Option<u32>,
    /// Set on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisProgressEvent {
    pub fn new(artifact_id: &str, job_id: Option<&str>, phase: AnalysisPhase, message: &str) -> Self {
        Self {
            artifact_id: artifact_id.to_string(),
            job_id: job_id.map(str::to_string),
            phase,
            message: message.to_string(),
            timestamp: Utc::now(),
            surface_count: None,
            error: None,
        }
    }
}

/// Fans analysis progress out to any number of subscribers.
#[derive(Clone)]
pub struct AnalysisProgressBroadcaster {
    sender: Arc<broadcast::Sender<AnalysisProgressEvent>>,
}

impl AnalysisProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, event: AnalysisProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisProgressEvent> {
        self.sender.subscribe()
    }

    /// Starts tracking one run and announces it as received.
    pub fn start(&self, artifact_id: &str, job_id: Option<&str>) -> AnalysisProgressTracker {
        let tracker = AnalysisProgressTracker {
            artifact_id: artifact_id.to_string(),
            job_id: job_id.map(str::to_string),
            sender: Arc::clone(&self.sender),
        };
        tracker.update_phase(AnalysisPhase::Received, "Analysis job received");
        tracker
    }
}

impl Default for AnalysisProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Tracks progress for a single analysis run.
pub struct AnalysisProgressTracker {
    artifact_id: String,
    job_id: Option<String>,
    sender: Arc<broadcast::Sender<AnalysisProgressEvent>>,
}

impl AnalysisProgressTracker {
    fn event(&self, phase: AnalysisPhase, message: &str) -> AnalysisProgressEvent {
        AnalysisProgressEvent::new(&self.artifact_id, self.job_id.as_deref(), phase, message)
    }

    pub fn update_phase(&self, phase: AnalysisPhase, message: &str) {
        let _ = self.sender.send(self.event(phase, message));
    }

    pub fn completed(&self, surface_count: u32) {
        let mut event = self.event(AnalysisPhase::Done, "Analysis completed");
        event.surface_count = Some(surface_count);
        let _ = self.sender.send(event);
    }

    pub fn failed(&self, error: &str) {
        let mut event = self.event(AnalysisPhase::Failed, "Analysis failed");
        event.error = Some(error.to_string());
        let _ = self.sender.send(event);
    }
}
