use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::queue::{ClaimedJob, FailOutcome, JobQueue, QueueError};

use super::handler::JobHandler;

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        job_id: String,
        attempt: u32,
    },
    Retrying {
        job_id: String,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    Failed {
        job_id: String,
        attempts: u32,
        error: String,
    },
    /// The lease expired while the handler ran; the acknowledgement was ignored.
    LeaseLost {
        job_id: String,
    },
}

impl JobOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            JobOutcome::Completed { job_id, .. }
            | JobOutcome::Retrying { job_id, .. }
            | JobOutcome::Failed { job_id, .. }
            | JobOutcome::LeaseLost { job_id } => job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. } | JobOutcome::Failed { .. })
    }
}

/// Independent consumers polling one queue.
pub struct WorkerPool {
    result_receiver: Receiver<JobOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns `worker_count` threads consuming `queue`.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(
        queue: JobQueue,
        handler: Arc<dyn JobHandler>,
        worker_count: usize,
        poll_interval: Duration,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (result_sender, result_receiver) = bounded::<JobOutcome>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let worker_queue = queue.clone();
            let worker_handler = Arc::clone(&handler);
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);

            let handle = thread::spawn(move || {
                run_worker(
                    worker_id,
                    worker_queue,
                    worker_handler,
                    result_tx,
                    shutdown_flag,
                    poll_interval,
                );
            });

            workers.push(handle);
        }

        info!("Started {} workers on queue '{}'", worker_count, queue.name());

        Self {
            result_receiver,
            workers,
            shutdown,
        }
    }

    pub fn try_recv_result(&self) -> Option<JobOutcome> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<JobOutcome> {
        self.result_receiver.recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<JobOutcome> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        // Unblocks any worker waiting to hand over a result
        drop(self.result_receiver);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    result_sender: Sender<JobOutcome>,
    shutdown: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        if let Err(e) = queue.reclaim_expired() {
            warn!("Worker {} could not reclaim expired leases: {}", worker_id, e);
        }

        let job = match queue.claim_next() {
            Ok(Some(job)) => job,
            Ok(None) => {
                thread::sleep(poll_interval);
                continue;
            }
            // Already parked as failed by the queue
            Err(QueueError::InvalidPayload(_)) => continue,
            Err(e) => {
                error!("Worker {} could not poll queue: {}", worker_id, e);
                thread::sleep(poll_interval);
                continue;
            }
        };

        debug!(
            "Worker {} processing job {} (attempt {}/{})",
            worker_id, job.id, job.attempt, job.retry.max_attempts
        );

        let Some(outcome) = settle(&queue, &job, handler.handle(&job)) else {
            continue;
        };

        if let Err(e) = result_sender.send(outcome) {
            debug!("Worker {} result channel closed: {}", worker_id, e);
            break;
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Acknowledges the attempt against its lease. `None` if the queue could not be reached;
/// the lease then expires and the job is redelivered.
fn settle(
    queue: &JobQueue,
    job: &ClaimedJob,
    result: Result<(), super::handler::HandlerError>,
) -> Option<JobOutcome> {
    let job_id = job.id.clone();
    match result {
        Ok(()) => match queue.complete(job) {
            Ok(true) => Some(JobOutcome::Completed {
                job_id,
                attempt: job.attempt,
            }),
            Ok(false) => Some(JobOutcome::LeaseLost { job_id }),
            Err(e) => {
                error!("Failed to acknowledge job {}: {}", job.id, e);
                None
            }
        },
        Err(handler_err) => {
            let error = handler_err.message().to_string();
            match queue.fail(job, &error, handler_err.is_retryable()) {
                Ok(FailOutcome::Retrying { attempt, delay }) => Some(JobOutcome::Retrying {
                    job_id,
                    attempt,
                    delay,
                    error,
                }),
                Ok(FailOutcome::Failed { attempts }) => Some(JobOutcome::Failed {
                    job_id,
                    attempts,
                    error,
                }),
                Ok(FailOutcome::LeaseLost) => Some(JobOutcome::LeaseLost { job_id }),
                Err(e) => {
                    error!("Failed to record failure of job {}: {}", job.id, e);
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    use crate::db::Database;
    use crate::queue::{JobOptions, JobPayload, JobState, RetryPolicy};
    use crate::worker::handler::HandlerError;

    const WAIT: Duration = Duration::from_secs(10);
    const POLL: Duration = Duration::from_millis(5);

    struct CountingHandler {
        calls: AtomicU32,
        result: Result<(), HandlerError>,
    }

    impl CountingHandler {
        fn new(result: Result<(), HandlerError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                result,
            })
        }
    }

    impl JobHandler for CountingHandler {
        fn handle(&self, _job: &ClaimedJob) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn queue() -> JobQueue {
        JobQueue::new(
            Database::open_in_memory().unwrap(),
            "test",
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
            },
            JobOptions::default(),
        )
    }

    fn payload(n: u32) -> JobPayload {
        JobPayload::analyze(&format!("artifact-{}", n), "owner", "plan.pdf")
    }

    #[test]
    fn test_worker_pool_creation() {
        let pool = WorkerPool::new(queue(), CountingHandler::new(Ok(())), 2, POLL);

        assert!(!pool.is_shutdown());

        pool.shutdown();
        assert!(pool.is_shutdown());

        pool.wait();
    }

    #[test]
    fn test_jobs_are_completed() {
        let queue = queue();
        let handler = CountingHandler::new(Ok(()));
        let ids: Vec<String> = (0..3)
            .map(|n| queue.enqueue(&payload(n), JobOptions::default()).unwrap())
            .collect();

        let pool = WorkerPool::new(queue.clone(), handler.clone(), 2, POLL);
        let mut done: Vec<String> = (0..3)
            .map(|_| pool.recv_result_timeout(WAIT).expect("outcome"))
            .map(|o| {
                assert!(matches!(o, JobOutcome::Completed { attempt: 1, .. }));
                o.job_id().to_string()
            })
            .collect();
        pool.shutdown();
        pool.wait();

        done.sort();
        let mut expected = ids;
        expected.sort();
        assert_eq!(done, expected);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(queue.count(JobState::Completed).unwrap(), 3);
    }

    #[test]
    fn test_transient_failure_is_attempted_three_times() {
        let queue = queue();
        let handler = CountingHandler::new(Err(HandlerError::Transient("detector down".into())));
        let id = queue.enqueue(&payload(1), JobOptions::default()).unwrap();

        let pool = WorkerPool::new(queue.clone(), handler.clone(), 1, POLL);
        let outcomes: Vec<JobOutcome> = (0..3)
            .map(|_| pool.recv_result_timeout(WAIT).expect("outcome"))
            .collect();
        // Give the worker a chance to (wrongly) pick it up again
        thread::sleep(Duration::from_millis(100));
        pool.shutdown();
        pool.wait();

        assert!(matches!(
            &outcomes[0],
            JobOutcome::Retrying { attempt: 1, delay, .. } if *delay == Duration::from_millis(10)
        ));
        assert!(matches!(
            &outcomes[1],
            JobOutcome::Retrying { attempt: 2, delay, .. } if *delay == Duration::from_millis(20)
        ));
        assert_eq!(
            outcomes[2],
            JobOutcome::Failed {
                job_id: id.clone(),
                attempts: 3,
                error: "detector down".to_string(),
            }
        );
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);

        let status = queue.get_job_status(&id).unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.attempts, 3);
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let queue = queue();
        let handler = CountingHandler::new(Err(HandlerError::Permanent("gated".into())));
        let id = queue.enqueue(&payload(1), JobOptions::default()).unwrap();

        let pool = WorkerPool::new(queue.clone(), handler.clone(), 1, POLL);
        let outcome = pool.recv_result_timeout(WAIT).expect("outcome");
        pool.shutdown();
        pool.wait();

        assert_eq!(
            outcome,
            JobOutcome::Failed {
                job_id: id,
                attempts: 1,
                error: "gated".to_string(),
            }
        );
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}
