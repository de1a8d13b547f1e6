//! Turns scraper output into storable rows: composes the global review id,
//! parses submission dates defensively, and cleans review text for scoring.

use chrono::NaiveDate;
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

use crate::clients::crawler::FetchedReview;
use crate::store::models::{CleanReview, RawReview};

/// Date formats seen in scraper output, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y"];

/// A raw row plus, when the review carries usable text, its clean twin.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReview {
    pub raw: RawReview,
    pub clean: Option<CleanReview>,
}

/// The stored review id is `{movie_id}_{source id}`, which makes re-crawled
/// reviews collide on the primary key instead of duplicating.
#[must_use]
pub fn compose_review_id(movie_id: &str, source_review_id: &str) -> String {
    format!("{movie_id}_{source_review_id}")
}

/// Parse a scraper-supplied date string. Unparseable input becomes `None`,
/// never an error; a missing date must not sink the whole batch.
#[must_use]
pub fn parse_submission_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// NFC-normalize and collapse all runs of whitespace to single spaces.
#[must_use]
pub fn clean_text(raw: &str) -> String {
    let normalized: String = raw.nfc().collect();
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build the storable rows for one fetched review. Reviews whose text is
/// empty after cleaning keep their raw row but get no clean twin, so they
/// are never sent to the model.
#[must_use]
pub fn normalize_review(movie_id: &str, fetched: &FetchedReview) -> NormalizedReview {
    let review_id = compose_review_id(movie_id, &fetched.source_review_id);

    let submission_date = fetched.submission_date.as_deref().and_then(|raw| {
        let parsed = parse_submission_date(raw);
        if parsed.is_none() {
            warn!(review_id, raw_date = raw, "unparseable submission date, storing NULL");
        }
        parsed
    });

    let raw_payload = serde_json::to_value(fetched).unwrap_or(serde_json::Value::Null);

    let raw = RawReview {
        review_id: review_id.clone(),
        movie_id: movie_id.to_string(),
        reviewer_username: fetched.reviewer_username.clone(),
        submission_date,
        rating: fetched.rating,
        like_count: fetched.like_count,
        dislike_count: fetched.dislike_count,
        raw_payload,
    };

    let cleaned = fetched
        .review_text
        .as_deref()
        .map_or_else(String::new, clean_text);
    let clean = if cleaned.is_empty() {
        None
    } else {
        let text_len = i32::try_from(cleaned.chars().count()).unwrap_or(i32::MAX);
        Some(CleanReview {
            review_id,
            movie_id: movie_id.to_string(),
            review_text: cleaned,
            text_len,
            rating: fetched.rating,
            like_count: fetched.like_count,
            dislike_count: fetched.dislike_count,
        })
    };

    NormalizedReview { raw, clean }
}

/// Normalize a whole crawl batch, splitting it into the raw rows (all of
/// them) and the clean rows (only reviews with text).
#[must_use]
pub fn normalize_batch(
    movie_id: &str,
    fetched: &[FetchedReview],
) -> (Vec<RawReview>, Vec<CleanReview>) {
    let mut raws = Vec::with_capacity(fetched.len());
    let mut cleans = Vec::with_capacity(fetched.len());
    for review in fetched {
        let normalized = normalize_review(movie_id, review);
        raws.push(normalized.raw);
        if let Some(clean) = normalized.clean {
            cleans.push(clean);
        }
    }
    (raws, cleans)
}
