use thiserror::Error;

use crate::store::models::{ProcessingStatus, TriggerType};

/// Failures while fetching reviews from the scraper gateway.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("scraper gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("scraper gateway returned status {status}: {body}")]
    UpstreamStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("scraper gateway response could not be decoded: {0}")]
    Decode(#[source] anyhow::Error),
}

/// Failures while scoring reviews against the sentiment model.
///
/// `Unavailable` means the model endpoint itself could not be reached and the
/// whole job should retry; `Scoring` is a per-review rejection that the
/// orchestrator skips over.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("sentiment model unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
    #[error("sentiment model rejected review {review_id}: {reason}")]
    Scoring { review_id: String, reason: String },
}

impl ModelError {
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Failures in the Postgres review store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unknown processing status in database: {0}")]
    UnknownStatus(String),
}

/// Top-level job failure, carrying which stage broke.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Crawl(#[from] CrawlError),
    #[error(transparent)]
    Model(ModelError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl JobError {
    /// The terminal status to record if this failure exhausts all retries.
    ///
    /// Crawl failures are always `FAILED_CRAWL`. Model failures are always
    /// `FAILED_ABSA`. Store failures are attributed to whichever phase the
    /// trigger was running at the time the write happened.
    #[must_use]
    pub fn failure_status(&self, trigger: TriggerType) -> ProcessingStatus {
        match self {
            Self::Crawl(_) => ProcessingStatus::FailedCrawl,
            Self::Model(_) => ProcessingStatus::FailedAbsa,
            Self::Store(_) => match trigger {
                TriggerType::CrawlAbsa => ProcessingStatus::FailedCrawl,
                TriggerType::AbsaOnly => ProcessingStatus::FailedAbsa,
            },
        }
    }
}

impl From<ModelError> for JobError {
    fn from(error: ModelError) -> Self {
        Self::Model(error)
    }
}
