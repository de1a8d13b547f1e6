//! In-memory [`ReviewStore`] for unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::store::dao::ReviewStore;
use crate::store::models::{
    AspectSentiment, CleanReview, EnrichedResult, ProcessingStatus, RawReview, Sentiment,
};
use crate::util::error::StoreError;

#[derive(Debug, Default)]
struct MockState {
    movies: HashMap<String, ProcessingStatus>,
    raw: HashMap<String, RawReview>,
    clean: BTreeMap<String, CleanReview>,
    aspects: BTreeMap<(String, String), AspectSentiment>,
    status_history: Vec<(String, ProcessingStatus)>,
}

#[derive(Debug, Default)]
pub(crate) struct MockReviewStore {
    state: Mutex<MockState>,
    fail_writes: AtomicBool,
}

impl MockReviewStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a database error.
    pub(crate) fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Install a status row without recording it in the history.
    pub(crate) fn seed_status(&self, movie_id: &str, status: ProcessingStatus) {
        self.state
            .lock()
            .expect("mock lock")
            .movies
            .insert(movie_id.to_string(), status);
    }

    pub(crate) fn seed_clean_reviews(&self, reviews: Vec<CleanReview>) {
        let mut state = self.state.lock().expect("mock lock");
        for review in reviews {
            state.clean.insert(review.review_id.clone(), review);
        }
    }

    /// Every status the store was asked to record, in order.
    pub(crate) fn status_history(&self, movie_id: &str) -> Vec<ProcessingStatus> {
        let state = self.state.lock().expect("mock lock");
        state
            .status_history
            .iter()
            .filter(|(id, _)| id == movie_id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub(crate) fn raw_count(&self) -> usize {
        self.state.lock().expect("mock lock").raw.len()
    }

    pub(crate) fn aspect_sentiments(&self) -> Vec<AspectSentiment> {
        let state = self.state.lock().expect("mock lock");
        state.aspects.values().cloned().collect()
    }

    fn write_guard(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl ReviewStore for MockReviewStore {
    async fn movie_exists(&self, movie_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .state
            .lock()
            .expect("mock lock")
            .movies
            .contains_key(movie_id))
    }

    async fn movie_status(
        &self,
        movie_id: &str,
    ) -> Result<Option<ProcessingStatus>, StoreError> {
        Ok(self
            .state
            .lock()
            .expect("mock lock")
            .movies
            .get(movie_id)
            .copied())
    }

    async fn has_absa(&self, movie_id: &str) -> Result<bool, StoreError> {
        let state = self.state.lock().expect("mock lock");
        Ok(state.aspects.keys().any(|(review_id, _)| {
            state
                .clean
                .get(review_id)
                .is_some_and(|clean| clean.movie_id == movie_id)
        }))
    }

    async fn upsert_movie_status(
        &self,
        movie_id: &str,
        status: ProcessingStatus,
        _title: Option<&str>,
        _year: Option<i32>,
    ) -> Result<(), StoreError> {
        self.write_guard()?;
        let mut state = self.state.lock().expect("mock lock");
        state.movies.insert(movie_id.to_string(), status);
        state.status_history.push((movie_id.to_string(), status));
        Ok(())
    }

    async fn save_raw_reviews(&self, reviews: &[RawReview]) -> Result<u64, StoreError> {
        self.write_guard()?;
        let mut state = self.state.lock().expect("mock lock");
        let mut inserted = 0;
        for review in reviews {
            if !state.raw.contains_key(&review.review_id) {
                state.raw.insert(review.review_id.clone(), review.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn save_clean_reviews(&self, reviews: &[CleanReview]) -> Result<u64, StoreError> {
        self.write_guard()?;
        let mut state = self.state.lock().expect("mock lock");
        let mut inserted = 0;
        for review in reviews {
            if !state.clean.contains_key(&review.review_id) {
                state
                    .clean
                    .insert(review.review_id.clone(), review.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn load_clean_reviews_for_absa(
        &self,
        movie_id: &str,
    ) -> Result<Vec<CleanReview>, StoreError> {
        let state = self.state.lock().expect("mock lock");
        Ok(state
            .clean
            .values()
            .filter(|review| review.movie_id == movie_id)
            .cloned()
            .collect())
    }

    async fn save_aspect_sentiments(
        &self,
        sentiments: &[AspectSentiment],
    ) -> Result<u64, StoreError> {
        self.write_guard()?;
        let mut state = self.state.lock().expect("mock lock");
        for sentiment in sentiments {
            state.aspects.insert(
                (sentiment.review_id.clone(), sentiment.aspect.clone()),
                sentiment.clone(),
            );
        }
        Ok(sentiments.len() as u64)
    }

    async fn fetch_absa_results(
        &self,
        movie_id: &str,
    ) -> Result<Vec<EnrichedResult>, StoreError> {
        let state = self.state.lock().expect("mock lock");
        let mut results: Vec<EnrichedResult> = state
            .aspects
            .values()
            .filter_map(|sentiment| {
                let clean = state.clean.get(&sentiment.review_id)?;
                if clean.movie_id != movie_id {
                    return None;
                }
                Some(EnrichedResult {
                    review_id: sentiment.review_id.clone(),
                    aspect: sentiment.aspect.clone(),
                    sentiment: Sentiment::from_score(sentiment.sentiment).as_str(),
                    sentiment_score: sentiment.sentiment,
                    confidence: sentiment.confidence,
                    review_text: clean.review_text.clone(),
                    like_count: clean.like_count,
                    dislike_count: clean.dislike_count,
                })
            })
            .collect();

        // Same order as the SQL read path.
        results.sort_by(|a, b| {
            let net = |r: &EnrichedResult| r.net_votes();
            match (net(b), net(a)) {
                (Some(x), Some(y)) => x
                    .cmp(&y)
                    .then_with(|| a.review_id.cmp(&b.review_id))
                    .then_with(|| a.aspect.cmp(&b.aspect)),
                (Some(_), None) => std::cmp::Ordering::Greater,
                (None, Some(_)) => std::cmp::Ordering::Less,
                (None, None) => a
                    .review_id
                    .cmp(&b.review_id)
                    .then_with(|| a.aspect.cmp(&b.aspect)),
            }
        });
        Ok(results)
    }
}
