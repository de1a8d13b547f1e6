//! The per-movie job: crawl (optionally), normalize, score, persist, and
//! keep the movie's status row truthful at every step.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clients::crawler::ReviewSource;
use crate::clients::sentiment::SentimentScorer;
use crate::observability::metrics::Metrics;
use crate::pipeline::normalize::normalize_batch;
use crate::store::dao::ReviewStore;
use crate::store::models::{AspectSentiment, CleanReview, ProcessingStatus, TriggerType};
use crate::util::error::{JobError, ModelError};

/// How a successful job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Nothing to score; the movie is `COMPLETED_NO_REVIEWS`.
    NoReviews,
    /// Scoring ran; `skipped` counts per-review model rejections.
    Completed { scored: usize, skipped: usize },
}

pub struct JobOrchestrator {
    store: Arc<dyn ReviewStore>,
    source: Arc<dyn ReviewSource>,
    scorer: Arc<dyn SentimentScorer>,
    metrics: Arc<Metrics>,
    aspects: Vec<String>,
    crawl_max_reviews: usize,
}

impl JobOrchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn ReviewStore>,
        source: Arc<dyn ReviewSource>,
        scorer: Arc<dyn SentimentScorer>,
        metrics: Arc<Metrics>,
        aspects: Vec<String>,
        crawl_max_reviews: usize,
    ) -> Self {
        Self {
            store,
            source,
            scorer,
            metrics,
            aspects,
            crawl_max_reviews,
        }
    }

    /// Run one job to completion. On failure the matching `FAILED_*` status
    /// is recorded best-effort before the error propagates to the queue for
    /// retry handling.
    ///
    /// # Errors
    /// Returns the stage error; per-review scoring rejections do not fail
    /// the job.
    pub async fn run(
        &self,
        movie_id: &str,
        trigger: TriggerType,
    ) -> Result<JobOutcome, JobError> {
        let timer = self.metrics.job_duration.start_timer();
        match self.execute(movie_id, trigger).await {
            Ok(outcome) => {
                timer.observe_duration();
                self.metrics.jobs_completed.inc();
                Ok(outcome)
            }
            Err(error) => {
                timer.observe_duration();
                self.metrics.jobs_failed.inc();
                let status = error.failure_status(trigger);
                if let Err(store_error) = self
                    .store
                    .upsert_movie_status(movie_id, status, None, None)
                    .await
                {
                    warn!(
                        movie_id,
                        status = status.as_str(),
                        error = %store_error,
                        "could not record failure status"
                    );
                }
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        movie_id: &str,
        trigger: TriggerType,
    ) -> Result<JobOutcome, JobError> {
        self.store
            .upsert_movie_status(movie_id, trigger.processing_status(), None, None)
            .await?;

        if trigger == TriggerType::CrawlAbsa {
            let fetched = self
                .source
                .fetch_raw_reviews(movie_id, self.crawl_max_reviews)
                .await?;
            if fetched.is_empty() {
                info!(movie_id, "crawl returned no reviews");
                self.store
                    .upsert_movie_status(
                        movie_id,
                        ProcessingStatus::CompletedNoReviews,
                        None,
                        None,
                    )
                    .await?;
                return Ok(JobOutcome::NoReviews);
            }

            #[allow(clippy::cast_precision_loss)]
            self.metrics.reviews_fetched.inc_by(fetched.len() as f64);
            let (raws, cleans) = normalize_batch(movie_id, &fetched);
            let inserted_raw = self.store.save_raw_reviews(&raws).await?;
            let inserted_clean = self.store.save_clean_reviews(&cleans).await?;
            #[allow(clippy::cast_precision_loss)]
            self.metrics.reviews_inserted.inc_by(inserted_raw as f64);
            info!(
                movie_id,
                fetched = fetched.len(),
                inserted_raw,
                inserted_clean,
                "crawl batch persisted"
            );
        }

        // Score everything on record for the movie, not only this crawl's
        // batch; incremental crawls fill gaps left by earlier partial runs.
        let clean_reviews = self.store.load_clean_reviews_for_absa(movie_id).await?;
        if clean_reviews.is_empty() {
            info!(movie_id, "no clean reviews to score");
            self.store
                .upsert_movie_status(movie_id, ProcessingStatus::CompletedNoReviews, None, None)
                .await?;
            return Ok(JobOutcome::NoReviews);
        }

        let (sentiments, skipped) = self.score_reviews(&clean_reviews).await?;
        let written = self.store.save_aspect_sentiments(&sentiments).await?;

        self.store
            .upsert_movie_status(movie_id, ProcessingStatus::CompletedAbsa, None, None)
            .await?;
        info!(
            movie_id,
            scored = sentiments.len(),
            skipped,
            written,
            "job completed"
        );
        Ok(JobOutcome::Completed {
            scored: sentiments.len(),
            skipped,
        })
    }

    async fn score_reviews(
        &self,
        reviews: &[CleanReview],
    ) -> Result<(Vec<AspectSentiment>, usize), JobError> {
        let mut sentiments = Vec::with_capacity(reviews.len() * self.aspects.len());
        let mut skipped = 0_usize;

        for review in reviews {
            for aspect in &self.aspects {
                match self
                    .scorer
                    .score(&review.review_id, &review.review_text, aspect)
                    .await
                {
                    Ok(scored) => {
                        self.metrics.aspects_scored.inc();
                        sentiments.push(AspectSentiment {
                            review_id: review.review_id.clone(),
                            aspect: aspect.clone(),
                            sentiment: scored.sentiment,
                            confidence: scored.confidence,
                        });
                    }
                    Err(error @ ModelError::Scoring { .. }) => {
                        warn!(review_id = %review.review_id, aspect = %aspect, error = %error, "review skipped");
                        self.metrics.scoring_skipped.inc();
                        skipped += 1;
                    }
                    Err(error @ ModelError::Unavailable(_)) => {
                        return Err(JobError::Model(error));
                    }
                }
            }
        }

        Ok((sentiments, skipped))
    }
}
