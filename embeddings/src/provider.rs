//! Embedding providers.
//!
//! A provider turns a batch of strings into one vector per string, in input
//! order. The HTTP provider talks to any OpenAI-compatible `/embeddings`
//! endpoint; a local BERT provider lives in [`crate::local`] behind the
//! `candle` feature.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::model::ModelLoader;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Get the model this provider embeds with.
    fn model(&self) -> &str;

    /// Generate embeddings for multiple texts, one vector per text, preserving
    /// order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;
}

/// Connection settings for an OpenAI-compatible embeddings endpoint.
///
/// This is the loader for [`OpenAiProvider`]: nothing is resolved until
/// [`ModelLoader::load`] runs, so a missing API key only surfaces on first
/// use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiEmbeddingConfig {
    /// API base URL.
    pub base_url: String,

    /// Embedding model name.
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Explicit API key, taking precedence over `api_key_env`.
    #[serde(skip)]
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OpenAiEmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl OpenAiEmbeddingConfig {
    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[async_trait]
impl ModelLoader for OpenAiEmbeddingConfig {
    fn describe(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn load(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let api_key = self.resolve_api_key().ok_or_else(|| {
            EmbeddingError::ModelUnavailable(format!(
                "no API key: set {} or configure one explicitly",
                self.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ModelUnavailable(format!("http client: {e}")))?;

        Ok(Arc::new(OpenAiProvider {
            api_key,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            client,
            model: self.model.clone(),
        }))
    }
}

/// OpenAI embedding provider.
pub struct OpenAiProvider {
    /// API key.
    api_key: String,

    /// API base URL, without a trailing slash.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Embedding model.
    model: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Generating batch embeddings for {} texts with model: {}",
            texts.len(),
            self.model
        );

        let body = serde_json::json!({
            "input": texts,
            "model": self.model,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                EmbeddingError::ModelUnavailable(format!("{} unreachable: {e}", self.base_url))
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let status = response.status();
        if status.is_server_error() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ModelUnavailable(format!(
                "server error ({status}): {error_text}"
            )));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "API error ({status}): {error_text}"
            )));
        }

        let mut result: OpenAiEmbeddingResponse = response.json().await?;

        if result.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        // The API may return items out of order; `index` is authoritative.
        result.data.sort_by_key(|item| item.index);
        let embeddings: Vec<Embedding> = result
            .data
            .into_iter()
            .enumerate()
            .map(|(position, item)| {
                if item.index == position {
                    Ok(item.embedding)
                } else {
                    Err(EmbeddingError::InvalidResponse(format!(
                        "missing embedding for input {position}"
                    )))
                }
            })
            .collect::<Result<_>>()?;

        info!("Generated {} batch embeddings", embeddings.len());

        Ok(embeddings)
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EmbeddingModel;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> OpenAiEmbeddingConfig {
        OpenAiEmbeddingConfig::default()
            .with_base_url(format!("{}/v1/", server.uri()))
            .with_api_key("test-key")
    }

    #[tokio::test]
    async fn test_missing_api_key_is_model_unavailable() {
        let config = OpenAiEmbeddingConfig {
            api_key_env: "KBASE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..OpenAiEmbeddingConfig::default()
        };

        let err = config.load().await.err().unwrap();
        assert!(err.is_model_unavailable());
    }

    #[tokio::test]
    async fn test_embed_batch_reorders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "list",
                "model": "text-embedding-3-small",
                "data": [
                    {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                    {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = config(&server).load().await.unwrap();
        let texts = vec!["first".to_string(), "second".to_string()];
        let vectors = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"index": 0, "embedding": [1.0]}]
            })))
            .mount(&server)
            .await;

        let provider = config(&server).load().await.unwrap();
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = provider.embed_batch(&texts).await.unwrap_err();

        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let provider = config(&server).load().await.unwrap();
        let err = provider
            .embed_batch(&["a".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EmbeddingError::RateLimited {
                retry_after_secs: 7
            }
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_model_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let provider = config(&server).load().await.unwrap();
        let err = provider
            .embed_batch(&["a".to_string()])
            .await
            .unwrap_err();

        assert!(err.is_model_unavailable());
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_client_error_is_api_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
            .mount(&server)
            .await;

        let provider = config(&server).load().await.unwrap();
        let err = provider
            .embed_batch(&["a".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, EmbeddingError::ApiRequest(msg) if msg.contains("bad input")));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_model_unavailable() {
        let model = EmbeddingModel::new(
            OpenAiEmbeddingConfig::default()
                .with_base_url("http://127.0.0.1:1/v1")
                .with_api_key("test-key"),
        );

        let err = model.embed_one("hello").await.unwrap_err();
        assert!(err.is_model_unavailable(), "unexpected error: {err}");
    }
}
