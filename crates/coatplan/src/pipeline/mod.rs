pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use context::AnalysisContext;
pub use error::AnalysisError;
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runner::{AnalysisOutcome, AnalysisWorker};
