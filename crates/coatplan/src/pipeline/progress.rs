use crate::broadcast::{AnalysisPhase, AnalysisProgressBroadcaster, AnalysisProgressTracker};

/// Events emitted by the analysis worker during a run.
pub enum ProgressEvent {
    Phase { phase: AnalysisPhase, message: String },
    Completed { surface_count: u32 },
    Failed { error: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges worker events onto the broadcast channel.
pub struct BroadcastProgress {
    tracker: AnalysisProgressTracker,
}

impl BroadcastProgress {
    pub fn new(
        broadcaster: &AnalysisProgressBroadcaster,
        artifact_id: &str,
        job_id: Option<&str>,
    ) -> Self {
        Self {
            tracker: broadcaster.start(artifact_id, job_id),
        }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase { phase, message } => self.tracker.update_phase(phase, &message),
            ProgressEvent::Completed { surface_count } => self.tracker.completed(surface_count),
            ProgressEvent::Failed { error } => self.tracker.failed(&error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_progress_forwards_events() {
        let broadcaster = AnalysisProgressBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();
        let progress = BroadcastProgress::new(&broadcaster, "a1", Some("j1"));

        progress.report(ProgressEvent::Phase {
            phase: AnalysisPhase::Detecting,
            message: "Detecting surfaces...".to_string(),
        });
        progress.report(ProgressEvent::Completed { surface_count: 3 });

        let phases: Vec<AnalysisPhase> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.phase)
            .collect();
        assert_eq!(phases.last(), Some(&AnalysisPhase::Done));
        assert!(phases.contains(&AnalysisPhase::Detecting));
    }
}
