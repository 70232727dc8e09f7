//! Job repository: persistence primitives for the durable queue.
//!
//! Every state change after insert is a compare-and-swap on `state` (and on
//! `lease_id` for active jobs) so a late acknowledgement from a worker whose
//! lease expired cannot overwrite a newer delivery.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub seq: i64,
    pub id: String,
    pub queue: String,
    pub payload: String,
    pub state: String,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff_base_ms: i64,
    pub timeout_ms: i64,
    pub run_at_ms: i64,
    pub lease_id: Option<String>,
    pub lease_expires_at_ms: Option<i64>,
    pub last_error: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub finished_at_ms: Option<i64>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            seq: row.get("seq")?,
            id: row.get("id")?,
            queue: row.get("queue")?,
            payload: row.get("payload")?,
            state: row.get("state")?,
            priority: row.get("priority")?,
            attempts: row.get("attempts")?,
            max_attempts: row.get("max_attempts")?,
            backoff_base_ms: row.get("backoff_base_ms")?,
            timeout_ms: row.get("timeout_ms")?,
            run_at_ms: row.get("run_at_ms")?,
            lease_id: row.get("lease_id")?,
            lease_expires_at_ms: row.get("lease_expires_at_ms")?,
            last_error: row.get("last_error")?,
            created_at_ms: row.get("created_at_ms")?,
            updated_at_ms: row.get("updated_at_ms")?,
            finished_at_ms: row.get("finished_at_ms")?,
        })
    }
}

/// Fields supplied at enqueue time.
#[derive(Debug, Clone)]
pub struct NewJob<'a> {
    pub id: &'a str,
    pub queue: &'a str,
    pub payload: &'a str,
    pub priority: i32,
    pub max_attempts: u32,
    pub backoff_base_ms: i64,
    pub timeout_ms: i64,
}

/// Inserts a waiting job, visible immediately. Returns its admission sequence.
pub fn insert(db: &Database, job: &NewJob<'_>, now_ms: i64) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, queue, payload, state, priority, attempts, max_attempts,
             backoff_base_ms, timeout_ms, run_at_ms, created_at_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, 'waiting', ?4, 0, ?5, ?6, ?7, ?8, ?8, ?8)",
            params![
                job.id,
                job.queue,
                job.payload,
                job.priority,
                job.max_attempts,
                job.backoff_base_ms,
                job.timeout_ms,
                now_ms,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM jobs WHERE id = ?1",
                params![id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Atomically leases the next runnable job: lowest priority number first,
/// then admission order. Increments the attempt counter.
pub fn claim_next(
    db: &Database,
    queue: &str,
    lease_id: &str,
    now_ms: i64,
) -> Result<Option<JobRow>, DatabaseError> {
    db.with_transaction(|conn| {
        let candidate = conn
            .query_row(
                "SELECT * FROM jobs
                 WHERE queue = ?1 AND state = 'waiting' AND run_at_ms <= ?2
                 ORDER BY priority ASC, seq ASC
                 LIMIT 1",
                params![queue, now_ms],
                JobRow::from_row,
            )
            .optional()?;

        let Some(mut job) = candidate else {
            return Ok(None);
        };

        let lease_expires_at_ms = now_ms + job.timeout_ms;
        let changed = conn.execute(
            "UPDATE jobs SET state = 'active', attempts = attempts + 1, lease_id = ?2,
             lease_expires_at_ms = ?3, updated_at_ms = ?4
             WHERE id = ?1 AND state = 'waiting'",
            params![job.id, lease_id, lease_expires_at_ms, now_ms],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        job.state = "active".to_string();
        job.attempts += 1;
        job.lease_id = Some(lease_id.to_string());
        job.lease_expires_at_ms = Some(lease_expires_at_ms);
        job.updated_at_ms = now_ms;
        Ok(Some(job))
    })
}

/// Marks an active job completed. Returns `false` if the lease no longer matches.
pub fn complete(
    db: &Database,
    id: &str,
    lease_id: &str,
    now_ms: i64,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET state = 'completed', lease_id = NULL, lease_expires_at_ms = NULL,
             last_error = NULL, updated_at_ms = ?3, finished_at_ms = ?3
             WHERE id = ?1 AND state = 'active' AND lease_id = ?2",
            params![id, lease_id, now_ms],
        )?;
        Ok(changed == 1)
    })
}

/// Puts an active job back to waiting until `run_at_ms`.
pub fn reschedule(
    db: &Database,
    id: &str,
    lease_id: &str,
    run_at_ms: i64,
    error: &str,
    now_ms: i64,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET state = 'waiting', run_at_ms = ?3, lease_id = NULL,
             lease_expires_at_ms = NULL, last_error = ?4, updated_at_ms = ?5
             WHERE id = ?1 AND state = 'active' AND lease_id = ?2",
            params![id, lease_id, run_at_ms, error, now_ms],
        )?;
        Ok(changed == 1)
    })
}

/// Marks an active job terminally failed.
pub fn fail(
    db: &Database,
    id: &str,
    lease_id: &str,
    error: &str,
    now_ms: i64,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE jobs SET state = 'failed', lease_id = NULL, lease_expires_at_ms = NULL,
             last_error = ?3, updated_at_ms = ?4, finished_at_ms = ?4
             WHERE id = ?1 AND state = 'active' AND lease_id = ?2",
            params![id, lease_id, error, now_ms],
        )?;
        Ok(changed == 1)
    })
}

/// Active jobs whose lease ran out.
pub fn find_expired_leases(
    db: &Database,
    queue: &str,
    now_ms: i64,
) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs
             WHERE queue = ?1 AND state = 'active' AND lease_expires_at_ms <= ?2
             ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![queue, now_ms], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Removes a job only while it is still waiting.
pub fn delete_waiting(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "DELETE FROM jobs WHERE id = ?1 AND state = 'waiting'",
            params![id],
        )?;
        Ok(changed == 1)
    })
}

/// Deletes terminal jobs last touched before `cutoff_ms`.
pub fn purge_terminal(db: &Database, queue: &str, cutoff_ms: i64) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let deleted = conn.execute(
            "DELETE FROM jobs
             WHERE queue = ?1 AND state IN ('completed', 'failed') AND updated_at_ms < ?2",
            params![queue, cutoff_ms],
        )?;
        Ok(deleted)
    })
}

/// Counts jobs in the given state.
pub fn count_by_state(db: &Database, queue: &str, state: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE queue = ?1 AND state = ?2",
            params![queue, state],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
