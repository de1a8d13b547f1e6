//! Client for the ABSA model service, which scores one review text against
//! one aspect per call.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::util::error::ModelError;

/// Signed sentiment for a (review, aspect) pair as returned by the model.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScoredSentiment {
    pub sentiment: i16,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    text: &'a str,
    aspect: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScoreErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Sentiment scorer seam. The HTTP implementation talks to the ABSA model
/// service; tests substitute stubs.
#[async_trait]
pub trait SentimentScorer: Send + Sync {
    /// Score one review text against one aspect.
    ///
    /// A 4xx from the model is a per-review rejection
    /// ([`ModelError::Scoring`]); transport failures and 5xx mean the model
    /// is down ([`ModelError::Unavailable`]).
    async fn score(
        &self,
        review_id: &str,
        text: &str,
        aspect: &str,
    ) -> Result<ScoredSentiment, ModelError>;

    async fn health_check(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct AbsaModelConfig {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AbsaModelClient {
    client: Client,
    base_url: Url,
}

impl AbsaModelClient {
    /// # Errors
    /// Fails when the base URL does not parse or the HTTP client cannot be
    /// built.
    pub fn new(config: AbsaModelConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build ABSA model HTTP client")?;
        let base_url = Url::parse(&config.base_url).context("invalid ABSA model base URL")?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl SentimentScorer for AbsaModelClient {
    async fn score(
        &self,
        review_id: &str,
        text: &str,
        aspect: &str,
    ) -> Result<ScoredSentiment, ModelError> {
        let url = self
            .base_url
            .join("api/v1/score")
            .map_err(|error| ModelError::Unavailable(anyhow::Error::new(error)))?;

        let response = self
            .client
            .post(url)
            .json(&ScoreRequest { text, aspect })
            .send()
            .await
            .map_err(|error| ModelError::Unavailable(anyhow::Error::new(error)))?;

        let status = response.status();
        if status.is_client_error() {
            let reason = response
                .json::<ScoreErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| format!("model returned status {status}"));
            return Err(ModelError::Scoring {
                review_id: review_id.to_string(),
                reason,
            });
        }
        if !status.is_success() {
            return Err(ModelError::Unavailable(anyhow::anyhow!(
                "ABSA model returned status {status}"
            )));
        }

        response
            .json::<ScoredSentiment>()
            .await
            .map_err(|error| ModelError::Unavailable(anyhow::Error::new(error)))
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        let url = self
            .base_url
            .join("health")
            .context("failed to build ABSA model health URL")?;
        self.client
            .get(url)
            .send()
            .await
            .context("ABSA model health request failed")?
            .error_for_status()
            .context("ABSA model reported unhealthy")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> AbsaModelClient {
        AbsaModelClient::new(AbsaModelConfig {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(2),
        })
        .expect("client builds")
    }

    #[tokio::test]
    async fn score_returns_signed_sentiment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/score"))
            .and(body_json(serde_json::json!({
                "text": "dull plot",
                "aspect": "plot"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sentiment": -1,
                "confidence": 0.83
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let scored = client
            .score("m1_rw1", "dull plot", "plot")
            .await
            .expect("score succeeds");

        assert_eq!(scored.sentiment, -1);
        assert_eq!(scored.confidence, Some(0.83));
    }

    #[tokio::test]
    async fn client_error_is_a_per_review_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/score"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "error": "text too short"
            })))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let error = client
            .score("m1_rw2", "x", "overall")
            .await
            .expect_err("must fail");

        match error {
            ModelError::Scoring { review_id, reason } => {
                assert_eq!(review_id, "m1_rw2");
                assert_eq!(reason, "text too short");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn server_error_means_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/score"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let error = client
            .score("m1_rw3", "fine", "overall")
            .await
            .expect_err("must fail");
        assert!(error.is_unavailable());
    }
}
