//! Durable job queue.
//!
//! Jobs live in the `jobs` table of the shared database, so they survive
//! restarts. Delivery is at-least-once: a job is leased to one worker at a
//! time; a failed attempt or an expired lease reschedules it with exponential
//! backoff until `max_attempts` is reached, after which it stays `failed`.

pub mod backoff;
pub mod clock;
pub mod job;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::db::{job_repo, Database, DatabaseError};

pub use backoff::RetryPolicy;
pub use clock::{Clock, ManualClock, SystemClock};
pub use job::{ClaimedJob, FailOutcome, JobOptions, JobPayload, JobState, JobStatus};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue backing store unavailable: {0}")]
    Unavailable(#[from] DatabaseError),

    #[error("Job '{0}' not found")]
    NotFound(String),

    #[error("Job payload is invalid: {0}")]
    InvalidPayload(String),
}

const TIMEOUT_MESSAGE: &str = "job exceeded its timeout without acknowledgement";

/// An explicitly constructed queue; many can coexist on one database.
#[derive(Clone)]
pub struct JobQueue {
    db: Database,
    name: String,
    policy: RetryPolicy,
    defaults: JobOptions,
    clock: Arc<dyn Clock>,
}

impl JobQueue {
    pub fn new(db: Database, name: &str, policy: RetryPolicy, defaults: JobOptions) -> Self {
        Self::with_clock(db, name, policy, defaults, Arc::new(SystemClock))
    }

    pub fn with_clock(
        db: Database,
        name: &str,
        policy: RetryPolicy,
        defaults: JobOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            name: name.to_string(),
            policy,
            defaults,
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn default_options(&self) -> JobOptions {
        self.defaults
    }

    /// Adds a job, visible to workers immediately. Returns the job identifier.
    pub fn enqueue(&self, payload: &JobPayload, options: JobOptions) -> Result<String, QueueError> {
        let id = uuid::Uuid::new_v4().to_string();
        let payload_json = serde_json::to_string(payload)
            .map_err(|e| QueueError::InvalidPayload(e.to_string()))?;

        job_repo::insert(
            &self.db,
            &job_repo::NewJob {
                id: &id,
                queue: &self.name,
                payload: &payload_json,
                priority: options.priority,
                max_attempts: self.policy.max_attempts,
                backoff_base_ms: duration_ms(self.policy.base_delay),
                timeout_ms: duration_ms(options.timeout),
            },
            self.clock.now_ms(),
        )?;

        log::debug!(
            "Enqueued job {} on '{}' for artifact {} (priority {})",
            id,
            self.name,
            payload.artifact_id(),
            options.priority
        );
        Ok(id)
    }

    pub fn get_job_status(&self, id: &str) -> Result<JobStatus, QueueError> {
        let row = job_repo::find_by_id(&self.db, id)?
            .filter(|row| row.queue == self.name)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        let state = JobState::parse(&row.state).ok_or_else(|| {
            QueueError::Unavailable(DatabaseError::UnknownValue {
                column: "state",
                value: row.state.clone(),
            })
        })?;
        Ok(JobStatus {
            id: row.id,
            state,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            last_error: row.last_error,
        })
    }

    /// Best-effort: removes a waiting job. Returns `false` when the job is
    /// already active or finished; active jobs are never interrupted.
    pub fn cancel(&self, id: &str) -> Result<bool, QueueError> {
        if job_repo::find_by_id(&self.db, id)?
            .filter(|row| row.queue == self.name)
            .is_none()
        {
            return Err(QueueError::NotFound(id.to_string()));
        }
        let removed = job_repo::delete_waiting(&self.db, id)?;
        if removed {
            log::info!("Cancelled waiting job {}", id);
        }
        Ok(removed)
    }

    /// Leases the next runnable job, if any.
    pub fn claim_next(&self) -> Result<Option<ClaimedJob>, QueueError> {
        let lease_id = uuid::Uuid::new_v4().to_string();
        let Some(row) = job_repo::claim_next(&self.db, &self.name, &lease_id, self.clock.now_ms())?
        else {
            return Ok(None);
        };

        let payload: JobPayload = match serde_json::from_str(&row.payload) {
            Ok(payload) => payload,
            Err(e) => {
                // Nothing can ever run it; park it as failed instead of retrying.
                let reason = format!("undecodable payload: {}", e);
                job_repo::fail(&self.db, &row.id, &lease_id, &reason, self.clock.now_ms())?;
                log::error!("Job {} has an invalid payload: {}", row.id, e);
                return Err(QueueError::InvalidPayload(reason));
            }
        };

        Ok(Some(ClaimedJob {
            id: row.id,
            payload,
            attempt: row.attempts,
            retry: stored_policy(row.max_attempts, row.backoff_base_ms),
            lease_id,
        }))
    }

    /// Acknowledges success. Returns `false` if the lease was lost meanwhile.
    pub fn complete(&self, job: &ClaimedJob) -> Result<bool, QueueError> {
        let acked = job_repo::complete(&self.db, &job.id, &job.lease_id, self.clock.now_ms())?;
        if !acked {
            log::warn!("Late completion for job {} ignored: lease lost", job.id);
        }
        Ok(acked)
    }

    /// Records a failed attempt. Retryable failures are rescheduled with
    /// backoff until attempts are exhausted; others fail terminally at once.
    pub fn fail(
        &self,
        job: &ClaimedJob,
        error: &str,
        retryable: bool,
    ) -> Result<FailOutcome, QueueError> {
        self.settle_failure(
            &job.id,
            &job.lease_id,
            job.attempt,
            job.retry,
            error,
            retryable,
        )
    }

    /// Returns expired leases to the queue as failed attempts. Called by every
    /// worker poll so a crashed worker's job is eventually redelivered.
    pub fn reclaim_expired(&self) -> Result<usize, QueueError> {
        let expired = job_repo::find_expired_leases(&self.db, &self.name, self.clock.now_ms())?;
        let mut reclaimed = 0;
        for row in expired {
            let Some(lease_id) = row.lease_id.as_deref() else {
                continue;
            };
            let outcome = self.settle_failure(
                &row.id,
                lease_id,
                row.attempts,
                stored_policy(row.max_attempts, row.backoff_base_ms),
                TIMEOUT_MESSAGE,
                true,
            )?;
            if outcome != FailOutcome::LeaseLost {
                log::warn!("Job {} timed out on attempt {}", row.id, row.attempts);
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    /// Garbage-collects completed and failed jobs older than `older_than`.
    pub fn purge_terminal(&self, older_than: Duration) -> Result<usize, QueueError> {
        let cutoff = self.clock.now_ms() - duration_ms(older_than);
        let purged = job_repo::purge_terminal(&self.db, &self.name, cutoff)?;
        if purged > 0 {
            log::info!("Purged {} terminal jobs from '{}'", purged, self.name);
        }
        Ok(purged)
    }

    pub fn count(&self, state: JobState) -> Result<u64, QueueError> {
        Ok(job_repo::count_by_state(&self.db, &self.name, state.as_str())?)
    }

    fn settle_failure(
        &self,
        id: &str,
        lease_id: &str,
        attempt: u32,
        policy: RetryPolicy,
        error: &str,
        retryable: bool,
    ) -> Result<FailOutcome, QueueError> {
        let now = self.clock.now_ms();

        if !retryable || policy.is_exhausted(attempt) {
            if !job_repo::fail(&self.db, id, lease_id, error, now)? {
                return Ok(FailOutcome::LeaseLost);
            }
            log::error!("Job {} failed permanently after {} attempt(s): {}", id, attempt, error);
            return Ok(FailOutcome::Failed { attempts: attempt });
        }

        let delay = policy.delay_for(attempt);
        if !job_repo::reschedule(&self.db, id, lease_id, now + duration_ms(delay), error, now)? {
            return Ok(FailOutcome::LeaseLost);
        }
        log::warn!(
            "Job {} attempt {}/{} failed, retrying in {:?}: {}",
            id,
            attempt,
            policy.max_attempts,
            delay,
            error
        );
        Ok(FailOutcome::Retrying { attempt, delay })
    }
}

fn stored_policy(max_attempts: u32, backoff_base_ms: i64) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(u64::try_from(backoff_base_ms).unwrap_or(0)),
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
