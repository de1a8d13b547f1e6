//! Prometheus metric definitions.

use std::sync::Arc;

use prometheus::{
    Counter, Gauge, Histogram, Registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_with_registry,
};

#[derive(Debug, Clone)]
pub struct Metrics {
    pub reviews_fetched: Counter,
    pub reviews_inserted: Counter,
    pub aspects_scored: Counter,
    pub scoring_skipped: Counter,
    pub jobs_completed: Counter,
    pub jobs_failed: Counter,
    pub absa_requests: Counter,
    pub jobs_dispatched: Counter,

    pub job_duration: Histogram,

    pub queue_backlog: Gauge,
}

impl Metrics {
    pub fn new(registry: &Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            reviews_fetched: register_counter_with_registry!(
                "absa_reviews_fetched_total",
                "Total number of reviews returned by the scraper gateway",
                registry
            )?,
            reviews_inserted: register_counter_with_registry!(
                "absa_reviews_inserted_total",
                "Total number of new raw reviews persisted",
                registry
            )?,
            aspects_scored: register_counter_with_registry!(
                "absa_aspects_scored_total",
                "Total number of (review, aspect) pairs scored",
                registry
            )?,
            scoring_skipped: register_counter_with_registry!(
                "absa_scoring_skipped_total",
                "Total number of per-review scoring rejections",
                registry
            )?,
            jobs_completed: register_counter_with_registry!(
                "absa_jobs_completed_total",
                "Total number of jobs completed",
                registry
            )?,
            jobs_failed: register_counter_with_registry!(
                "absa_jobs_failed_total",
                "Total number of jobs failed",
                registry
            )?,
            absa_requests: register_counter_with_registry!(
                "absa_api_requests_total",
                "Total number of GET /get_absa requests",
                registry
            )?,
            jobs_dispatched: register_counter_with_registry!(
                "absa_jobs_dispatched_total",
                "Total number of jobs enqueued by the API",
                registry
            )?,
            job_duration: register_histogram_with_registry!(
                "absa_job_duration_seconds",
                "Duration of entire job processing",
                registry
            )?,
            queue_backlog: register_gauge_with_registry!(
                "absa_queue_backlog",
                "Number of jobs not yet in a terminal state",
                registry
            )?,
        })
    }
}
