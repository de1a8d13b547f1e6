use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::info;

mod store;
mod types;
mod worker;

pub use store::QueueStore;
pub use types::{NewQueuedJob, QueuedJob, QueuedJobId, QueuedJobStatus};
pub use worker::{JobRunner, QueueWorker};

use crate::store::models::TriggerType;
use crate::util::retry::RetryPolicy;

/// Seam the query facade dispatches jobs through; the queue's workers run
/// them in the background.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, movie_id: &str, trigger: TriggerType) -> Result<QueuedJobId>;
}

/// Durable Postgres-backed job queue with in-process worker tasks.
pub struct AbsaJobQueue {
    store: Arc<QueueStore>,
    workers: Vec<JoinHandle<Result<()>>>,
    max_retries: i32,
}

impl AbsaJobQueue {
    /// Spawn `concurrency` worker tasks draining the queue.
    #[must_use]
    pub fn new(
        store: QueueStore,
        runner: Arc<dyn JobRunner>,
        concurrency: usize,
        policy: RetryPolicy,
        poll_interval: Duration,
        job_lease: Duration,
    ) -> Self {
        let store = Arc::new(store);

        let mut workers = Vec::with_capacity(concurrency);
        for worker_id in 0..concurrency {
            let worker = QueueWorker::new(
                store.clone(),
                runner.clone(),
                policy,
                poll_interval,
                job_lease,
            );
            let handle = tokio::spawn(async move {
                info!(worker_id, "starting queue worker");
                worker.run().await
            });
            workers.push(handle);
        }

        info!(
            concurrency,
            max_retries = policy.max_retries(),
            retry_delay_secs = policy.delay().as_secs(),
            "job queue initialized"
        );

        Self {
            store,
            workers,
            max_retries: policy.max_retries(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    /// Stop all worker tasks. Jobs caught mid-flight keep their `running`
    /// row until the worker lease expires, after which any worker reclaims
    /// them onto the retry path.
    pub fn shutdown(&self) {
        for handle in &self.workers {
            handle.abort();
        }
        info!("job queue workers stopped");
    }
}

#[async_trait]
impl JobDispatcher for AbsaJobQueue {
    async fn dispatch(&self, movie_id: &str, trigger: TriggerType) -> Result<QueuedJobId> {
        let id = self
            .store
            .enqueue(NewQueuedJob {
                movie_id: movie_id.to_string(),
                trigger_type: trigger,
                max_retries: self.max_retries,
            })
            .await?;
        info!(movie_id, trigger = trigger.as_str(), job_id = id, "job dispatched");
        Ok(id)
    }
}
