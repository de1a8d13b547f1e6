//! Postgres review store: movie status, raw/clean reviews, aspect
//! sentiments, and the joined read path.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::store::models::{
    AspectSentiment, CleanReview, EnrichedResult, ProcessingStatus, RawReview, Sentiment,
};
use crate::util::error::StoreError;

#[cfg(test)]
pub mod mock;

/// Persistence seam for the review pipeline. The Postgres implementation is
/// [`PgReviewStore`]; unit tests use the in-memory mock.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn movie_exists(&self, movie_id: &str) -> Result<bool, StoreError>;

    async fn movie_status(&self, movie_id: &str)
    -> Result<Option<ProcessingStatus>, StoreError>;

    /// Whether any aspect judgments exist for this movie's clean reviews.
    async fn has_absa(&self, movie_id: &str) -> Result<bool, StoreError>;

    /// Create or update the movie's status row in one statement. `title` and
    /// `year` only overwrite when provided.
    async fn upsert_movie_status(
        &self,
        movie_id: &str,
        status: ProcessingStatus,
        title: Option<&str>,
        year: Option<i32>,
    ) -> Result<(), StoreError>;

    /// Insert raw reviews, skipping ids already present. Returns the number
    /// of rows actually inserted. All-or-nothing on database failure.
    async fn save_raw_reviews(&self, reviews: &[RawReview]) -> Result<u64, StoreError>;

    /// Insert clean reviews, skipping ids already present.
    async fn save_clean_reviews(&self, reviews: &[CleanReview]) -> Result<u64, StoreError>;

    async fn load_clean_reviews_for_absa(
        &self,
        movie_id: &str,
    ) -> Result<Vec<CleanReview>, StoreError>;

    /// Upsert aspect judgments; a rescore overwrites the previous sentiment.
    async fn save_aspect_sentiments(
        &self,
        sentiments: &[AspectSentiment],
    ) -> Result<u64, StoreError>;

    /// Aspect judgments joined with review text and vote counts, most
    /// net-approved reviews first, missing counts last.
    async fn fetch_absa_results(
        &self,
        movie_id: &str,
    ) -> Result<Vec<EnrichedResult>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn movie_exists(&self, movie_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM movie_processing_status WHERE movie_id = $1) AS present",
        )
        .bind(movie_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("present")?)
    }

    async fn movie_status(
        &self,
        movie_id: &str,
    ) -> Result<Option<ProcessingStatus>, StoreError> {
        let row = sqlx::query("SELECT status FROM movie_processing_status WHERE movie_id = $1")
            .bind(movie_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("status")?;
        let status =
            ProcessingStatus::from_str(&raw).ok_or_else(|| StoreError::UnknownStatus(raw))?;
        Ok(Some(status))
    }

    async fn has_absa(&self, movie_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r"
            SELECT EXISTS(
                SELECT 1
                FROM review_aspects a
                JOIN reviews_clean c ON c.review_id = a.review_id
                WHERE c.movie_id = $1
            ) AS present
            ",
        )
        .bind(movie_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("present")?)
    }

    async fn upsert_movie_status(
        &self,
        movie_id: &str,
        status: ProcessingStatus,
        title: Option<&str>,
        year: Option<i32>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO movie_processing_status (movie_id, title, year, status, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (movie_id) DO UPDATE
            SET status = EXCLUDED.status,
                title = COALESCE(EXCLUDED.title, movie_processing_status.title),
                year = COALESCE(EXCLUDED.year, movie_processing_status.year),
                updated_at = NOW()
            ",
        )
        .bind(movie_id)
        .bind(title)
        .bind(year)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_raw_reviews(&self, reviews: &[RawReview]) -> Result<u64, StoreError> {
        if reviews.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0_u64;
        for review in reviews {
            let result = sqlx::query(
                r"
                INSERT INTO reviews_raw
                    (review_id, movie_id, reviewer_username, submission_date,
                     rating, like_count, dislike_count, raw_payload)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (review_id) DO NOTHING
                ",
            )
            .bind(&review.review_id)
            .bind(&review.movie_id)
            .bind(&review.reviewer_username)
            .bind(review.submission_date)
            .bind(review.rating)
            .bind(review.like_count)
            .bind(review.dislike_count)
            .bind(&review.raw_payload)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn save_clean_reviews(&self, reviews: &[CleanReview]) -> Result<u64, StoreError> {
        if reviews.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0_u64;
        for review in reviews {
            let result = sqlx::query(
                r"
                INSERT INTO reviews_clean
                    (review_id, movie_id, review_text, text_len,
                     rating, like_count, dislike_count)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (review_id) DO NOTHING
                ",
            )
            .bind(&review.review_id)
            .bind(&review.movie_id)
            .bind(&review.review_text)
            .bind(review.text_len)
            .bind(review.rating)
            .bind(review.like_count)
            .bind(review.dislike_count)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn load_clean_reviews_for_absa(
        &self,
        movie_id: &str,
    ) -> Result<Vec<CleanReview>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT review_id, movie_id, review_text, text_len,
                   rating, like_count, dislike_count
            FROM reviews_clean
            WHERE movie_id = $1
            ORDER BY review_id
            ",
        )
        .bind(movie_id)
        .fetch_all(&self.pool)
        .await?;

        let mut reviews = Vec::with_capacity(rows.len());
        for row in rows {
            reviews.push(CleanReview {
                review_id: row.try_get("review_id")?,
                movie_id: row.try_get("movie_id")?,
                review_text: row.try_get("review_text")?,
                text_len: row.try_get("text_len")?,
                rating: row.try_get("rating")?,
                like_count: row.try_get("like_count")?,
                dislike_count: row.try_get("dislike_count")?,
            });
        }
        Ok(reviews)
    }

    async fn save_aspect_sentiments(
        &self,
        sentiments: &[AspectSentiment],
    ) -> Result<u64, StoreError> {
        if sentiments.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0_u64;
        for sentiment in sentiments {
            let result = sqlx::query(
                r"
                INSERT INTO review_aspects (review_id, aspect, sentiment, confidence, updated_at)
                VALUES ($1, $2, $3, $4, NOW())
                ON CONFLICT (review_id, aspect) DO UPDATE
                SET sentiment = EXCLUDED.sentiment,
                    confidence = EXCLUDED.confidence,
                    updated_at = NOW()
                ",
            )
            .bind(&sentiment.review_id)
            .bind(&sentiment.aspect)
            .bind(sentiment.sentiment)
            .bind(sentiment.confidence)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn fetch_absa_results(
        &self,
        movie_id: &str,
    ) -> Result<Vec<EnrichedResult>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT a.review_id, a.aspect, a.sentiment, a.confidence,
                   c.review_text, c.like_count, c.dislike_count
            FROM review_aspects a
            JOIN reviews_clean c ON c.review_id = a.review_id
            WHERE c.movie_id = $1
            ORDER BY (c.like_count - c.dislike_count) DESC NULLS LAST,
                     a.review_id, a.aspect
            ",
        )
        .bind(movie_id)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let sentiment_score: i16 = row.try_get("sentiment")?;
            results.push(EnrichedResult {
                review_id: row.try_get("review_id")?,
                aspect: row.try_get("aspect")?,
                sentiment: Sentiment::from_score(sentiment_score).as_str(),
                sentiment_score,
                confidence: row.try_get("confidence")?,
                review_text: row.try_get("review_text")?,
                like_count: row.try_get("like_count")?,
                dislike_count: row.try_get("dislike_count")?,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    //! These tests require a DATABASE_URL environment variable to run.

    use super::*;
    use sqlx::Executor;
    use sqlx::postgres::PgPoolOptions;

    async fn setup_schema(pool: &PgPool) -> anyhow::Result<()> {
        pool.execute(
            r"
            CREATE TABLE IF NOT EXISTS movie_processing_status (
                movie_id TEXT PRIMARY KEY,
                title TEXT,
                year INT,
                status TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE TABLE IF NOT EXISTS reviews_raw (
                review_id TEXT PRIMARY KEY,
                movie_id TEXT NOT NULL,
                reviewer_username TEXT,
                submission_date DATE,
                rating DOUBLE PRECISION,
                like_count BIGINT,
                dislike_count BIGINT,
                raw_payload JSONB NOT NULL,
                fetched_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE TABLE IF NOT EXISTS reviews_clean (
                review_id TEXT PRIMARY KEY,
                movie_id TEXT NOT NULL,
                review_text TEXT NOT NULL,
                text_len INT NOT NULL,
                rating DOUBLE PRECISION,
                like_count BIGINT,
                dislike_count BIGINT
            );

            CREATE TABLE IF NOT EXISTS review_aspects (
                review_id TEXT NOT NULL,
                aspect TEXT NOT NULL,
                sentiment SMALLINT NOT NULL,
                confidence DOUBLE PRECISION,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (review_id, aspect)
            );
            ",
        )
        .await?;
        Ok(())
    }

    async fn cleanup(pool: &PgPool, movie_id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM review_aspects WHERE review_id LIKE $1 || '_%'")
            .bind(movie_id)
            .execute(pool)
            .await?;
        for table in ["reviews_clean", "reviews_raw", "movie_processing_status"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE movie_id = $1"))
                .bind(movie_id)
                .execute(pool)
                .await?;
        }
        Ok(())
    }

    fn raw_review(movie_id: &str, source_id: &str) -> RawReview {
        RawReview {
            review_id: format!("{movie_id}_{source_id}"),
            movie_id: movie_id.to_string(),
            reviewer_username: Some("tester".to_string()),
            submission_date: None,
            rating: Some(8.0),
            like_count: Some(5),
            dislike_count: Some(1),
            raw_payload: serde_json::json!({"sourceReviewId": source_id}),
        }
    }

    fn clean_review(movie_id: &str, source_id: &str, text: &str) -> CleanReview {
        CleanReview {
            review_id: format!("{movie_id}_{source_id}"),
            movie_id: movie_id.to_string(),
            review_text: text.to_string(),
            text_len: i32::try_from(text.chars().count()).unwrap_or(i32::MAX),
            rating: Some(8.0),
            like_count: Some(5),
            dislike_count: Some(1),
        }
    }

    #[tokio::test]
    async fn raw_insert_is_idempotent() -> anyhow::Result<()> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            return Ok(());
        };
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await?;
        setup_schema(&pool).await?;
        let store = PgReviewStore::new(pool.clone());
        let movie_id = "dao-test-raw-idem";
        cleanup(&pool, movie_id).await?;

        let batch = vec![raw_review(movie_id, "rw1"), raw_review(movie_id, "rw2")];
        assert_eq!(store.save_raw_reviews(&batch).await?, 2);
        // Second save of the same batch inserts nothing and raises no error.
        assert_eq!(store.save_raw_reviews(&batch).await?, 0);

        cleanup(&pool, movie_id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn aspect_upsert_overwrites_previous_score() -> anyhow::Result<()> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            return Ok(());
        };
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await?;
        setup_schema(&pool).await?;
        let store = PgReviewStore::new(pool.clone());
        let movie_id = "dao-test-aspect-upsert";
        cleanup(&pool, movie_id).await?;

        store
            .save_clean_reviews(&[clean_review(movie_id, "rw1", "layered plot")])
            .await?;

        let first = AspectSentiment {
            review_id: format!("{movie_id}_rw1"),
            aspect: "plot".to_string(),
            sentiment: -1,
            confidence: Some(0.4),
        };
        let second = AspectSentiment {
            sentiment: 1,
            confidence: Some(0.9),
            ..first.clone()
        };
        store.save_aspect_sentiments(&[first]).await?;
        store.save_aspect_sentiments(&[second]).await?;

        let results = store.fetch_absa_results(movie_id).await?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sentiment_score, 1);
        assert_eq!(results[0].sentiment, "Positive");
        assert_eq!(results[0].confidence, Some(0.9));

        cleanup(&pool, movie_id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn results_order_by_net_votes_with_nulls_last() -> anyhow::Result<()> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            return Ok(());
        };
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await?;
        setup_schema(&pool).await?;
        let store = PgReviewStore::new(pool.clone());
        let movie_id = "dao-test-ordering";
        cleanup(&pool, movie_id).await?;

        let mut popular = clean_review(movie_id, "b-popular", "loved it");
        popular.like_count = Some(40);
        popular.dislike_count = Some(2);
        let mut modest = clean_review(movie_id, "a-modest", "it was fine");
        modest.like_count = Some(3);
        modest.dislike_count = Some(1);
        let mut uncounted = clean_review(movie_id, "c-uncounted", "no votes shown");
        uncounted.like_count = None;
        uncounted.dislike_count = None;
        store
            .save_clean_reviews(&[popular, modest, uncounted])
            .await?;

        let sentiments: Vec<AspectSentiment> = ["b-popular", "a-modest", "c-uncounted"]
            .iter()
            .map(|source_id| AspectSentiment {
                review_id: format!("{movie_id}_{source_id}"),
                aspect: "overall".to_string(),
                sentiment: 1,
                confidence: None,
            })
            .collect();
        store.save_aspect_sentiments(&sentiments).await?;

        let results = store.fetch_absa_results(movie_id).await?;
        let ids: Vec<&str> = results.iter().map(|r| r.review_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                format!("{movie_id}_b-popular"),
                format!("{movie_id}_a-modest"),
                format!("{movie_id}_c-uncounted"),
            ]
        );

        cleanup(&pool, movie_id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_status_upserts_leave_one_row() -> anyhow::Result<()> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            return Ok(());
        };
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&database_url)
            .await?;
        setup_schema(&pool).await?;
        let store = std::sync::Arc::new(PgReviewStore::new(pool.clone()));
        let movie_id = "dao-test-race";
        cleanup(&pool, movie_id).await?;

        let first = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .upsert_movie_status(
                        "dao-test-race",
                        ProcessingStatus::ProcessingCrawlAbsa,
                        None,
                        None,
                    )
                    .await
            })
        };
        let second = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .upsert_movie_status(
                        "dao-test-race",
                        ProcessingStatus::ProcessingAbsaOnly,
                        None,
                        None,
                    )
                    .await
            })
        };
        first.await??;
        second.await??;

        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM movie_processing_status WHERE movie_id = $1",
        )
        .bind(movie_id)
        .fetch_one(&pool)
        .await?;
        let count: i64 = row.try_get("n")?;
        assert_eq!(count, 1);
        let status = store.movie_status(movie_id).await?;
        assert!(status.is_some_and(ProcessingStatus::is_in_progress));

        cleanup(&pool, movie_id).await?;
        Ok(())
    }
}
