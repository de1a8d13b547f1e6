use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::store::QueueStore;
use super::types::QueuedJob;
use crate::pipeline::orchestrator::{JobOrchestrator, JobOutcome};
use crate::store::models::TriggerType;
use crate::util::error::JobError;
use crate::util::retry::RetryPolicy;

/// What a queue worker invokes per job. [`JobOrchestrator`] is the real
/// implementation; tests substitute flaky stubs.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(
        &self,
        movie_id: &str,
        trigger: TriggerType,
    ) -> Result<JobOutcome, JobError>;
}

#[async_trait]
impl JobRunner for JobOrchestrator {
    async fn run_job(
        &self,
        movie_id: &str,
        trigger: TriggerType,
    ) -> Result<JobOutcome, JobError> {
        self.run(movie_id, trigger).await
    }
}

/// Background worker that drains the durable job queue. Each worker handles
/// one job at a time; concurrency comes from the number of workers.
pub struct QueueWorker {
    store: Arc<QueueStore>,
    runner: Arc<dyn JobRunner>,
    policy: RetryPolicy,
    poll_interval: Duration,
    job_lease: Duration,
}

impl QueueWorker {
    #[must_use]
    pub fn new(
        store: Arc<QueueStore>,
        runner: Arc<dyn JobRunner>,
        policy: RetryPolicy,
        poll_interval: Duration,
        job_lease: Duration,
    ) -> Self {
        Self {
            store,
            runner,
            policy,
            poll_interval,
            job_lease,
        }
    }

    /// Run the worker loop until the task is aborted.
    pub async fn run(&self) -> Result<()> {
        loop {
            // Jobs orphaned by a crashed worker stay in `running` forever
            // unless someone puts them back on the retry path.
            match self.store.reclaim_stale_jobs(self.job_lease).await {
                Ok(0) => {}
                Ok(reclaimed) => {
                    warn!(reclaimed, "reclaimed jobs with an expired worker lease");
                }
                Err(error) => {
                    error!(error = %error, "failed to reclaim stale jobs");
                }
            }

            let job = match self.store.pick_next_job().await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    sleep(self.poll_interval).await;
                    continue;
                }
                Err(error) => {
                    error!(error = %error, "failed to pick next job");
                    sleep(self.poll_interval.max(Duration::from_secs(1))).await;
                    continue;
                }
            };

            if let Err(error) = self.process_job(job).await {
                error!(error = %error, "job processing failed");
            }
        }
    }

    async fn process_job(&self, job: QueuedJob) -> Result<()> {
        if !self.store.mark_running(job.id).await? {
            // Another worker claimed it between pick and mark.
            debug!(job_id = job.id, "job already claimed");
            return Ok(());
        }

        info!(
            job_id = job.id,
            movie_id = %job.movie_id,
            trigger = job.trigger_type.as_str(),
            retry_count = job.retry_count,
            "processing queued job"
        );

        match self.runner.run_job(&job.movie_id, job.trigger_type).await {
            Ok(outcome) => {
                self.store.mark_completed(job.id).await?;
                info!(job_id = job.id, movie_id = %job.movie_id, ?outcome, "job completed");
                Ok(())
            }
            Err(error) => {
                let message = error.to_string();
                if self.policy.can_retry(job.retry_count) {
                    warn!(
                        job_id = job.id,
                        movie_id = %job.movie_id,
                        retry_count = job.retry_count + 1,
                        max_retries = job.max_retries,
                        error = %message,
                        "job failed, scheduling retry"
                    );
                    self.store
                        .mark_retrying(job.id, &message, self.policy.delay())
                        .await?;
                } else {
                    error!(
                        job_id = job.id,
                        movie_id = %job.movie_id,
                        retry_count = job.retry_count,
                        error = %message,
                        "job failed after max retries"
                    );
                    self.store.mark_failed(job.id, &message).await?;
                }
                Ok(())
            }
        }
    }
}
