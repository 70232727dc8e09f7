//! Broadcasting for real-time analysis progress.
//!
//! Subscribers observe phases as they happen; durable status always lives on
//! the artifact record.

pub mod analysis_progress;

pub use analysis_progress::{
    AnalysisPhase, AnalysisProgressBroadcaster, AnalysisProgressEvent, AnalysisProgressTracker,
};
