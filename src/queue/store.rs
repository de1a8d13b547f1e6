use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};

use super::types::{NewQueuedJob, QueuedJob, QueuedJobId, QueuedJobStatus};
use crate::store::models::TriggerType;

#[derive(Debug, Clone)]
pub struct QueueStore {
    pool: PgPool,
}

impl QueueStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a job, keyed on `(movie_id, trigger_type)`. A terminal row
    /// (completed or failed) is revived to pending with its retry count
    /// reset; an in-flight row is left untouched.
    ///
    /// # Errors
    /// Fails on database errors.
    pub async fn enqueue(&self, job: NewQueuedJob) -> Result<QueuedJobId> {
        let row = sqlx::query(
            r"
            INSERT INTO absa_job_queue
                (movie_id, trigger_type, max_retries, status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (movie_id, trigger_type) DO UPDATE
            SET status = CASE
                    WHEN absa_job_queue.status IN ('completed', 'failed') THEN 'pending'
                    ELSE absa_job_queue.status
                END,
                retry_count = CASE
                    WHEN absa_job_queue.status IN ('completed', 'failed') THEN 0
                    ELSE absa_job_queue.retry_count
                END,
                error_message = CASE
                    WHEN absa_job_queue.status IN ('completed', 'failed') THEN NULL
                    ELSE absa_job_queue.error_message
                END,
                next_attempt_at = CASE
                    WHEN absa_job_queue.status IN ('completed', 'failed') THEN NULL
                    ELSE absa_job_queue.next_attempt_at
                END,
                completed_at = CASE
                    WHEN absa_job_queue.status IN ('completed', 'failed') THEN NULL
                    ELSE absa_job_queue.completed_at
                END
            RETURNING id
            ",
        )
        .bind(&job.movie_id)
        .bind(job.trigger_type.as_str())
        .bind(job.max_retries)
        .fetch_one(&self.pool)
        .await
        .context("failed to enqueue job")?;

        let id: QueuedJobId = row.try_get("id").context("failed to get job id")?;
        Ok(id)
    }

    /// Revive jobs stuck in `running` past the worker lease, which happens
    /// when a worker crashes or is aborted mid-job. Revived jobs go through
    /// the normal retry accounting; one with no attempts left fails instead.
    ///
    /// # Errors
    /// Fails on database errors.
    pub async fn reclaim_stale_jobs(&self, lease: Duration) -> Result<u64> {
        let lease_secs = lease.as_secs_f64();
        let result = sqlx::query(
            r"
            UPDATE absa_job_queue
            SET status = CASE
                    WHEN retry_count < max_retries THEN 'retrying'
                    ELSE 'failed'
                END,
                retry_count = CASE
                    WHEN retry_count < max_retries THEN retry_count + 1
                    ELSE retry_count
                END,
                error_message = 'worker lease expired',
                started_at = NULL,
                next_attempt_at = NULL,
                completed_at = CASE
                    WHEN retry_count < max_retries THEN NULL
                    ELSE NOW()
                END
            WHERE status = 'running'
              AND started_at <= NOW() - make_interval(secs => $1)
            ",
        )
        .bind(lease_secs)
        .execute(&self.pool)
        .await
        .context("failed to reclaim stale jobs")?;

        Ok(result.rows_affected())
    }

    /// Pick the next runnable job. A retrying job is not runnable before
    /// its `next_attempt_at`. Picking does not claim the row; `mark_running`
    /// is the claim, and its return value settles races between workers.
    ///
    /// # Errors
    /// Fails on database errors or an unreadable row.
    pub async fn pick_next_job(&self) -> Result<Option<QueuedJob>> {
        let row = sqlx::query(
            r"
            SELECT id, movie_id, trigger_type, status, error_message,
                   retry_count, max_retries,
                   created_at, started_at, completed_at, next_attempt_at
            FROM absa_job_queue
            WHERE status IN ('pending', 'retrying')
              AND (next_attempt_at IS NULL OR next_attempt_at <= NOW())
            ORDER BY created_at ASC
            LIMIT 1
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .context("failed to pick next job")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let job = Self::row_to_job(&row)?;
        Ok(Some(job))
    }

    /// Claim a picked job. Returns false when another worker got there
    /// first.
    ///
    /// # Errors
    /// Fails on database errors.
    pub async fn mark_running(&self, job_id: QueuedJobId) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE absa_job_queue
            SET status = 'running',
                started_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'retrying')
            ",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .context("failed to mark job as running")?;

        Ok(result.rows_affected() == 1)
    }

    /// # Errors
    /// Fails on database errors.
    pub async fn mark_completed(&self, job_id: QueuedJobId) -> Result<()> {
        sqlx::query(
            r"
            UPDATE absa_job_queue
            SET status = 'completed',
                error_message = NULL,
                completed_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .context("failed to mark job as completed")?;

        Ok(())
    }

    /// Schedule another attempt after the fixed retry delay.
    ///
    /// # Errors
    /// Fails on database errors.
    pub async fn mark_retrying(
        &self,
        job_id: QueuedJobId,
        error: &str,
        delay: Duration,
    ) -> Result<()> {
        let delay_secs = delay.as_secs_f64();
        sqlx::query(
            r"
            UPDATE absa_job_queue
            SET status = 'retrying',
                error_message = $2,
                retry_count = retry_count + 1,
                started_at = NULL,
                next_attempt_at = NOW() + make_interval(secs => $3)
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .bind(error)
        .bind(delay_secs)
        .execute(&self.pool)
        .await
        .context("failed to mark job as retrying")?;

        Ok(())
    }

    /// # Errors
    /// Fails on database errors.
    pub async fn mark_failed(&self, job_id: QueuedJobId, error: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE absa_job_queue
            SET status = 'failed',
                error_message = $2,
                completed_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("failed to mark job as failed")?;

        Ok(())
    }

    /// # Errors
    /// Fails on database errors or an unreadable row.
    pub async fn get_job(&self, job_id: QueuedJobId) -> Result<Option<QueuedJob>> {
        let row = sqlx::query(
            r"
            SELECT id, movie_id, trigger_type, status, error_message,
                   retry_count, max_retries,
                   created_at, started_at, completed_at, next_attempt_at
            FROM absa_job_queue
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to get job")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Self::row_to_job(&row)?))
    }

    /// Jobs not yet in a terminal state, for the readiness report.
    ///
    /// # Errors
    /// Fails on database errors.
    pub async fn backlog_depth(&self) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM absa_job_queue WHERE status IN ('pending', 'running', 'retrying')",
        )
        .fetch_one(&self.pool)
        .await
        .context("failed to count queue backlog")?;
        let depth: i64 = row.try_get("n").context("failed to read backlog count")?;
        Ok(depth)
    }

    fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<QueuedJob> {
        let status_raw: String = row.try_get("status").context("failed to get status")?;
        let status = QueuedJobStatus::from_str(&status_raw)
            .with_context(|| format!("unknown queued job status: {status_raw}"))?;

        let trigger_raw: String = row
            .try_get("trigger_type")
            .context("failed to get trigger_type")?;
        let trigger_type = TriggerType::from_str(&trigger_raw)
            .with_context(|| format!("unknown trigger type: {trigger_raw}"))?;

        Ok(QueuedJob {
            id: row.try_get("id").context("failed to get id")?,
            movie_id: row.try_get("movie_id").context("failed to get movie_id")?,
            trigger_type,
            status,
            error_message: row
                .try_get("error_message")
                .context("failed to get error_message")?,
            retry_count: row
                .try_get("retry_count")
                .context("failed to get retry_count")?,
            max_retries: row
                .try_get("max_retries")
                .context("failed to get max_retries")?,
            created_at: row
                .try_get("created_at")
                .context("failed to get created_at")?,
            started_at: row
                .try_get("started_at")
                .context("failed to get started_at")?,
            completed_at: row
                .try_get("completed_at")
                .context("failed to get completed_at")?,
            next_attempt_at: row
                .try_get("next_attempt_at")
                .context("failed to get next_attempt_at")?,
        })
    }
}

// The queue table is shared by every DB-gated queue test; serialize them so
// a spawned worker cannot steal another test's pending row.
#[cfg(test)]
pub(crate) static QUEUE_TEST_MUTEX: once_cell::sync::Lazy<tokio::sync::Mutex<()>> =
    once_cell::sync::Lazy::new(|| tokio::sync::Mutex::new(()));

#[cfg(test)]
pub(crate) async fn setup_queue_schema(pool: &PgPool) -> anyhow::Result<()> {
    use sqlx::Executor;

    pool.execute(
        r"
        CREATE TABLE IF NOT EXISTS absa_job_queue (
            id BIGSERIAL PRIMARY KEY,
            movie_id TEXT NOT NULL,
            trigger_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            error_message TEXT,
            retry_count INT NOT NULL DEFAULT 0,
            max_retries INT NOT NULL DEFAULT 5,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            next_attempt_at TIMESTAMPTZ,
            UNIQUE (movie_id, trigger_type)
        );
        ",
    )
    .await?;
    Ok(())
}
