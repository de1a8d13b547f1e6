use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a movie's review pipeline.
///
/// Stored as text in `movie_processing_status.status`; the string forms are
/// part of the on-disk contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    NotStarted,
    ProcessingCrawlAbsa,
    ProcessingAbsaOnly,
    CompletedAbsa,
    CompletedNoReviews,
    FailedCrawl,
    FailedAbsa,
}

impl ProcessingStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::ProcessingCrawlAbsa => "PROCESSING_CRAWL_ABSA",
            Self::ProcessingAbsaOnly => "PROCESSING_ABSA_ONLY",
            Self::CompletedAbsa => "COMPLETED_ABSA",
            Self::CompletedNoReviews => "COMPLETED_NO_REVIEWS",
            Self::FailedCrawl => "FAILED_CRAWL",
            Self::FailedAbsa => "FAILED_ABSA",
        }
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "NOT_STARTED" => Some(Self::NotStarted),
            "PROCESSING_CRAWL_ABSA" => Some(Self::ProcessingCrawlAbsa),
            "PROCESSING_ABSA_ONLY" => Some(Self::ProcessingAbsaOnly),
            "COMPLETED_ABSA" => Some(Self::CompletedAbsa),
            "COMPLETED_NO_REVIEWS" => Some(Self::CompletedNoReviews),
            "FAILED_CRAWL" => Some(Self::FailedCrawl),
            "FAILED_ABSA" => Some(Self::FailedAbsa),
            _ => None,
        }
    }

    /// A job is already underway for this movie.
    #[must_use]
    pub fn is_in_progress(self) -> bool {
        matches!(self, Self::ProcessingCrawlAbsa | Self::ProcessingAbsaOnly)
    }

    /// Terminal success states.
    #[must_use]
    pub fn is_completed(self) -> bool {
        matches!(self, Self::CompletedAbsa | Self::CompletedNoReviews)
    }

    /// Terminal failure states; eligible for a fresh kick-off.
    #[must_use]
    pub fn is_failed(self) -> bool {
        matches!(self, Self::FailedCrawl | Self::FailedAbsa)
    }
}

/// What a queued job should do: crawl fresh reviews first, or score the
/// reviews already on hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    CrawlAbsa,
    AbsaOnly,
}

impl TriggerType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CrawlAbsa => "crawl_absa",
            Self::AbsaOnly => "absa_only",
        }
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "crawl_absa" => Some(Self::CrawlAbsa),
            "absa_only" => Some(Self::AbsaOnly),
            _ => None,
        }
    }

    /// The in-progress status a running job of this kind advertises.
    #[must_use]
    pub fn processing_status(self) -> ProcessingStatus {
        match self {
            Self::CrawlAbsa => ProcessingStatus::ProcessingCrawlAbsa,
            Self::AbsaOnly => ProcessingStatus::ProcessingAbsaOnly,
        }
    }
}

/// A review exactly as the scraper gateway returned it. The full upstream
/// body lives in `raw_payload`; only fields the read path sorts or joins on
/// are lifted into columns. `review_id` is `{movie_id}_{source id}` so the
/// same source review never lands twice for one movie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReview {
    pub review_id: String,
    pub movie_id: String,
    pub reviewer_username: Option<String>,
    pub submission_date: Option<NaiveDate>,
    pub rating: Option<f64>,
    pub like_count: Option<i64>,
    pub dislike_count: Option<i64>,
    pub raw_payload: serde_json::Value,
}

/// A normalized review ready for sentiment scoring; 1:1 with [`RawReview`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanReview {
    pub review_id: String,
    pub movie_id: String,
    pub review_text: String,
    pub text_len: i32,
    pub rating: Option<f64>,
    pub like_count: Option<i64>,
    pub dislike_count: Option<i64>,
}

/// Per-aspect sentiment for one review. `sentiment` is the raw signed model
/// output; the coarse label derives from its sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AspectSentiment {
    pub review_id: String,
    pub aspect: String,
    pub sentiment: i16,
    pub confidence: Option<f64>,
}

/// Sentiment polarity derived from the signed score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    #[must_use]
    pub fn from_score(score: i16) -> Self {
        if score > 0 {
            Self::Positive
        } else if score < 0 {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Negative => "Negative",
            Self::Neutral => "Neutral",
        }
    }
}

/// One row of the read-path result set: an aspect judgment joined with its
/// review text and vote counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedResult {
    pub review_id: String,
    pub aspect: String,
    pub sentiment: &'static str,
    pub sentiment_score: i16,
    pub confidence: Option<f64>,
    pub review_text: String,
    pub like_count: Option<i64>,
    pub dislike_count: Option<i64>,
}

impl EnrichedResult {
    /// Net approval used for result ordering. Mirrors SQL subtraction: NULL
    /// when either count is missing, which sorts last.
    #[must_use]
    pub fn net_votes(&self) -> Option<i64> {
        match (self.like_count, self.dislike_count) {
            (Some(likes), Some(dislikes)) => Some(likes - dislikes),
            _ => None,
        }
    }
}

/// Movie identifiers are caller-supplied path segments; reject anything that
/// is not a plain alphanumeric token before it reaches SQL or the scraper.
#[must_use]
pub fn is_valid_movie_id(movie_id: &str) -> bool {
    !movie_id.is_empty()
        && movie_id.len() <= 64
        && movie_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
