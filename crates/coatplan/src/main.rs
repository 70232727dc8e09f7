//! `coatplan-worker`: consumes the analysis queue until interrupted.
//!
//! Usage: `coatplan-worker [CONFIG]` (defaults to `~/.coatplan/config.json`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use coatplan::intake::NoopScanner;
use coatplan::{
    load_config, telemetry, AnalysisJobHandler, AnalysisProgressBroadcaster, AnalysisWorker,
    Database, JobOutcome, JobQueue, LocalObjectStorage, ObjectStorage, SidecarDetector, WorkerPool,
};

const RESULT_POLL: Duration = Duration::from_millis(500);
const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".coatplan").join("config.json"))
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("coatplan-worker: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(default_config_path)
        .ok_or("no config path given and no home directory found")?;
    let config = load_config(&config_path)?;

    telemetry::init(&config.logging)?;
    info!("Starting coatplan-worker v{}", env!("CARGO_PKG_VERSION"));

    let db = Database::open(&config.database.path)?;
    let storage: Arc<dyn ObjectStorage> = Arc::new(LocalObjectStorage::new(
        &config.storage.root,
        &config.storage.public_base_url,
        &config.storage.upload_base_url,
        config.storage.write_ttl(),
    ));

    let worker = AnalysisWorker::new(
        db.clone(),
        Arc::clone(&storage),
        Arc::new(SidecarDetector::new(Arc::clone(&storage))),
        Arc::new(NoopScanner),
        config.costs.rates(),
    );
    let handler = Arc::new(AnalysisJobHandler::with_progress(
        worker,
        AnalysisProgressBroadcaster::default(),
    ));

    let queue = JobQueue::new(
        db,
        &config.queue.name,
        config.queue.retry_policy(),
        config.queue.job_options(),
    );
    let pool = WorkerPool::new(
        queue.clone(),
        handler,
        config.workers.count,
        config.queue.poll_interval(),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))?;
    }

    let mut last_purge: Option<Instant> = None;
    while !shutdown.load(Ordering::Relaxed) {
        if let Some(outcome) = pool.recv_result_timeout(RESULT_POLL) {
            log_outcome(&outcome);
        }

        if last_purge.map_or(true, |t| t.elapsed() >= PURGE_INTERVAL) {
            if let Err(e) = queue.purge_terminal(config.queue.retention()) {
                warn!("Failed to purge finished jobs: {}", e);
            }
            last_purge = Some(Instant::now());
        }
    }

    pool.shutdown();
    pool.wait();
    info!("coatplan-worker stopped");
    Ok(())
}

fn log_outcome(outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Completed { job_id, attempt } => {
            info!("Job {} completed on attempt {}", job_id, attempt)
        }
        JobOutcome::Retrying {
            job_id,
            attempt,
            delay,
            error,
        } => warn!(
            "Job {} attempt {} failed, next try in {:?}: {}",
            job_id, attempt, delay, error
        ),
        JobOutcome::Failed {
            job_id,
            attempts,
            error,
        } => error!("Job {} failed after {} attempt(s): {}", job_id, attempts, error),
        JobOutcome::LeaseLost { job_id } => warn!("Job {} lost its lease", job_id),
    }
}
