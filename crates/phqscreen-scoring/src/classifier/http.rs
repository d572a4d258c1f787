use super::Classifier;
use async_trait::async_trait;
use phqscreen_core::{Classification, ScreenError, ScreenResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Connection settings for a model-serving classifier endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Full URL that accepts `POST {"text": ...}`.
    pub endpoint: String,
    /// Optional bearer token.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

/// Classifier backed by an HTTP model server.
///
/// The server is expected to answer with `{"question_id": n, "severity": m}`.
/// Transport errors, non-2xx statuses, malformed bodies and out-of-range ids
/// all surface as classification failures.
pub struct HttpClassifier {
    config: ClassifierConfig,
    http: reqwest::Client,
}

impl HttpClassifier {
    /// Builds the client. An empty endpoint is a config error.
    pub fn new(config: ClassifierConfig) -> ScreenResult<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(ScreenError::Config(
                "classifier endpoint must not be empty".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScreenError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    /// The configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, sentence: &str) -> ScreenResult<Classification> {
        if sentence.trim().is_empty() {
            return Err(ScreenError::Classification(
                "cannot classify empty text".to_string(),
            ));
        }

        let mut request = self
            .http
            .post(&self.config.endpoint)
            .json(&ClassifyRequest { text: sentence });
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ScreenError::Classification(format!("classifier unavailable: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ScreenError::Classification(format!(
                "classifier returned {status}: {body}"
            )));
        }

        let classification: Classification = resp
            .json()
            .await
            .map_err(|e| ScreenError::Classification(format!("bad classifier response: {e}")))?;

        debug!(
            question_id = classification.question_id(),
            severity = classification.severity(),
            "Sentence classified"
        );
        Ok(classification)
    }
}
