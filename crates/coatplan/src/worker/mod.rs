pub mod handler;
pub mod pool;

pub use handler::{AnalysisJobHandler, HandlerError, JobHandler};
pub use pool::{JobOutcome, WorkerPool};

