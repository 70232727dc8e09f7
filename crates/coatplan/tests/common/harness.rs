//! Test harness wiring the whole upload and analysis pipeline on a temp dir.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use coatplan::detection::DetectionError;
use coatplan::intake::NoopScanner;
use coatplan::model::Artifact;
use coatplan::queue::{FailOutcome, ManualClock, SystemClock};
use coatplan::upload::InitiatedUpload;
use coatplan::worker::JobHandler;
use coatplan::{
    AnalysisJobHandler, AnalysisProgressBroadcaster, AnalysisWorker, CostRates, Database,
    JobOptions, JobQueue, LocalObjectStorage, ObjectStorage, RawObservation, RetryPolicy,
    SurfaceDetector, UploadCoordinator, UploadLimits, WorkerPool,
};

pub const BASE_DELAY: Duration = Duration::from_millis(100);
pub const LEASE_TIMEOUT: Duration = Duration::from_secs(30);
pub const OWNER: &str = "owner-1";
pub const PROJECT: &str = "project-1";

/// One scripted detector response.
#[derive(Debug, Clone)]
pub enum Script {
    Surfaces(Vec<RawObservation>),
    Unavailable(String),
    Malformed(String),
}

/// Replays scripted responses in order; the last one repeats forever.
#[derive(Default)]
pub struct ScriptedDetector {
    scripts: Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Drops anything still scripted and replays `script` from now on.
    pub fn replace(&self, script: Script) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.clear();
        scripts.push_back(script);
    }

    pub fn returns(&self, observations: Vec<RawObservation>) {
        self.push(Script::Surfaces(observations));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SurfaceDetector for ScriptedDetector {
    fn detect(&self, _artifact: &Artifact) -> Result<Vec<RawObservation>, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.len() > 1 {
                scripts.pop_front()
            } else {
                scripts.front().cloned()
            }
        };
        match script {
            None => Ok(Vec::new()),
            Some(Script::Surfaces(observations)) => Ok(observations),
            Some(Script::Unavailable(message)) => Err(DetectionError::Unavailable(message)),
            Some(Script::Malformed(message)) => Err(DetectionError::Malformed(message)),
        }
    }
}

/// What a single manual delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Idle,
    Completed {
        job_id: String,
        attempt: u32,
    },
    Retrying {
        job_id: String,
        attempt: u32,
        delay: Duration,
    },
    Failed {
        job_id: String,
        attempts: u32,
        error: String,
    },
    LeaseLost,
}

pub struct TestHarness {
    pub temp_dir: TempDir,
    pub db: Database,
    pub storage: Arc<LocalObjectStorage>,
    pub clock: Arc<ManualClock>,
    pub queue: JobQueue,
    pub coordinator: UploadCoordinator,
    pub detector: Arc<ScriptedDetector>,
    pub broadcaster: AnalysisProgressBroadcaster,
    handler: AnalysisJobHandler,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_limits(UploadLimits::default())
    }

    pub fn with_limits(limits: UploadLimits) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::open(&temp_dir.path().join("coatplan.db")).expect("open database");
        let storage = Arc::new(LocalObjectStorage::new(
            temp_dir.path().join("blobs"),
            "https://cdn.example.test",
            "https://upload.example.test",
            limits.write_ttl,
        ));
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let queue = JobQueue::with_clock(
            db.clone(),
            "artifact-analysis",
            RetryPolicy {
                max_attempts: 3,
                base_delay: BASE_DELAY,
            },
            JobOptions {
                priority: 1,
                timeout: LEASE_TIMEOUT,
            },
            clock.clone(),
        );
        let coordinator =
            UploadCoordinator::new(db.clone(), storage.clone(), queue.clone(), limits);
        let detector = Arc::new(ScriptedDetector::default());
        let broadcaster = AnalysisProgressBroadcaster::default();
        let handler = AnalysisJobHandler::with_progress(
            analysis_worker(&db, &storage, &detector),
            broadcaster.clone(),
        );

        Self {
            temp_dir,
            db,
            storage,
            clock,
            queue,
            coordinator,
            detector,
            broadcaster,
            handler,
        }
    }

    pub fn worker(&self) -> AnalysisWorker {
        analysis_worker(&self.db, &self.storage, &self.detector)
    }

    /// Initiates an upload and writes `bytes` to the issued location, without confirming.
    pub fn stage(&self, mime_type: &str, file_name: &str, bytes: &[u8]) -> InitiatedUpload {
        let initiated = self
            .coordinator
            .initiate_upload(OWNER, PROJECT, mime_type, file_name, bytes.len() as u64)
            .expect("initiate upload");
        self.storage
            .put_object(
                &initiated.write_location.token,
                &initiated.write_location.content_type,
                bytes,
            )
            .expect("put object");
        initiated
    }

    /// Full client side of an upload. Returns `(artifact_id, job_id)`.
    pub fn upload(&self, mime_type: &str, file_name: &str, bytes: &[u8]) -> (String, String) {
        let initiated = self.stage(mime_type, file_name, bytes);
        let confirmed = self
            .coordinator
            .confirm_upload(&initiated.artifact_id, OWNER)
            .expect("confirm upload");
        (initiated.artifact_id, confirmed.job_id)
    }

    /// Claims and handles one job the way a pool worker would. Does not move the clock.
    pub fn deliver_next(&self) -> Delivery {
        self.queue.reclaim_expired().expect("reclaim");
        let Some(job) = self.queue.claim_next().expect("claim") else {
            return Delivery::Idle;
        };

        match self.handler.handle(&job) {
            Ok(()) => {
                if self.queue.complete(&job).expect("complete") {
                    Delivery::Completed {
                        job_id: job.id,
                        attempt: job.attempt,
                    }
                } else {
                    Delivery::LeaseLost
                }
            }
            Err(e) => match self
                .queue
                .fail(&job, e.message(), e.is_retryable())
                .expect("fail")
            {
                FailOutcome::Retrying { attempt, delay } => Delivery::Retrying {
                    job_id: job.id,
                    attempt,
                    delay,
                },
                FailOutcome::Failed { attempts } => Delivery::Failed {
                    job_id: job.id,
                    attempts,
                    error: e.message().to_string(),
                },
                FailOutcome::LeaseLost => Delivery::LeaseLost,
            },
        }
    }

    /// Delivers until the queue is idle, jumping the clock over each backoff.
    pub fn run_until_idle(&self) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        loop {
            let delivery = self.deliver_next();
            match &delivery {
                Delivery::Idle => return deliveries,
                Delivery::Retrying { delay, .. } => self.clock.advance(*delay),
                _ => {}
            }
            deliveries.push(delivery);
        }
    }

    pub fn artifact(&self, artifact_id: &str) -> Artifact {
        coatplan::db::artifact_repo::find_by_id(&self.db, artifact_id)
            .expect("query artifact")
            .expect("artifact exists")
    }

    /// A threaded pool on a real clock, sharing this harness's database and storage.
    pub fn spawn_pool(&self, workers: usize, base_delay: Duration) -> (JobQueue, WorkerPool) {
        let queue = JobQueue::with_clock(
            self.db.clone(),
            "artifact-analysis",
            RetryPolicy {
                max_attempts: 3,
                base_delay,
            },
            JobOptions {
                priority: 1,
                timeout: LEASE_TIMEOUT,
            },
            Arc::new(SystemClock),
        );
        let handler = Arc::new(AnalysisJobHandler::with_progress(
            self.worker(),
            self.broadcaster.clone(),
        ));
        let pool = WorkerPool::new(queue.clone(), handler, workers, Duration::from_millis(5));
        (queue, pool)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn analysis_worker(
    db: &Database,
    storage: &Arc<LocalObjectStorage>,
    detector: &Arc<ScriptedDetector>,
) -> AnalysisWorker {
    AnalysisWorker::new(
        db.clone(),
        storage.clone(),
        detector.clone(),
        Arc::new(NoopScanner),
        CostRates::default(),
    )
}
