//! Client for the scraper gateway, the service that crawls movie review
//! pages on demand.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::util::error::CrawlError;

/// One review as the scraper gateway serializes it. Unknown upstream fields
/// are retained in `extra` so the stored raw payload stays lossless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedReview {
    pub source_review_id: String,
    #[serde(default)]
    pub reviewer_username: Option<String>,
    #[serde(default)]
    pub review_text: Option<String>,
    #[serde(default)]
    pub submission_date: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub like_count: Option<i64>,
    #[serde(default)]
    pub dislike_count: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct CrawlRequest<'a> {
    movie_id: &'a str,
    max_reviews: usize,
}

#[derive(Debug, Deserialize)]
struct CrawlResponse {
    reviews: Vec<FetchedReview>,
}

/// Source of raw reviews for a movie. The HTTP implementation talks to the
/// scraper gateway; tests substitute stubs.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    async fn fetch_raw_reviews(
        &self,
        movie_id: &str,
        max_count: usize,
    ) -> Result<Vec<FetchedReview>, CrawlError>;

    async fn health_check(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct ScraperGatewayConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub total_timeout: Duration,
    pub service_token: Option<String>,
}

/// HTTP client for the scraper gateway.
#[derive(Debug, Clone)]
pub struct ScraperGatewayClient {
    client: Client,
    base_url: Url,
    service_token: Option<String>,
}

impl ScraperGatewayClient {
    /// # Errors
    /// Fails when the base URL does not parse or the HTTP client cannot be
    /// built.
    pub fn new(config: ScraperGatewayConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build scraper gateway HTTP client")?;

        let base_url =
            Url::parse(&config.base_url).context("invalid scraper gateway base URL")?;

        Ok(Self {
            client,
            base_url,
            service_token: config.service_token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, CrawlError> {
        self.base_url
            .join(path)
            .map_err(|error| CrawlError::Decode(anyhow::Error::new(error)))
    }
}

#[async_trait]
impl ReviewSource for ScraperGatewayClient {
    async fn fetch_raw_reviews(
        &self,
        movie_id: &str,
        max_count: usize,
    ) -> Result<Vec<FetchedReview>, CrawlError> {
        debug!(movie_id, max_count, "requesting crawl from scraper gateway");

        let url = self.endpoint("api/v1/crawl")?;
        let body = CrawlRequest {
            movie_id,
            max_reviews: max_count,
        };

        let mut request = self.client.post(url).json(&body);
        if let Some(ref token) = self.service_token {
            request = request.header("X-Service-Token", token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CrawlError::UpstreamStatus { status, body });
        }

        let payload: CrawlResponse = response
            .json()
            .await
            .map_err(|error| CrawlError::Decode(anyhow::Error::new(error)))?;

        debug!(movie_id, count = payload.reviews.len(), "crawl finished");
        Ok(payload.reviews)
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        let url = self
            .base_url
            .join("health")
            .context("failed to build scraper gateway health URL")?;
        self.client
            .get(url)
            .send()
            .await
            .context("scraper gateway health request failed")?
            .error_for_status()
            .context("scraper gateway reported unhealthy")?;
        Ok(())
    }
}
