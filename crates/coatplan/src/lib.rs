pub mod analysis;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod detection;
pub mod error;
pub mod intake;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod sanitize;
pub mod storage;
pub mod telemetry;
pub mod upload;
pub mod worker;

pub use analysis::CostRates;
pub use broadcast::{AnalysisPhase, AnalysisProgressBroadcaster, AnalysisProgressEvent};
pub use config::{load_config, Config};
pub use db::Database;
pub use detection::{RawObservation, SidecarDetector, SurfaceDetector};
pub use error::{CoatplanError, ConfigError, Result, StorageError, ValidationError};
pub use model::{Artifact, Surface};
pub use pipeline::{AnalysisOutcome, AnalysisWorker};
pub use queue::{JobOptions, JobPayload, JobQueue, JobState, JobStatus, RetryPolicy};
pub use storage::{LocalObjectStorage, ObjectStorage};
pub use upload::{UploadCoordinator, UploadLimits};
pub use worker::{AnalysisJobHandler, JobOutcome, WorkerPool};
