//! Text generation backends.
//!
//! Generation is a black box: a prompt goes in, text comes out.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

/// Trait for text generation backends.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Generate a completion for the prompt.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Generator backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiChatGenerator {
    api_key: Option<String>,
    api_key_env: String,
    base_url: String,
    client: reqwest::Client,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiChatGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatGenerator")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl OpenAiChatGenerator {
    /// Create a generator from configuration, reading the API key from the
    /// configured environment variable.
    ///
    /// A missing key is reported when generation is first attempted, so a
    /// knowledge base used only for retrieval never needs one.
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            api_key: std::env::var(&config.api_key_env)
                .ok()
                .filter(|key| !key.trim().is_empty()),
            api_key_env: config.api_key_env.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[async_trait]
impl TextGenerator for OpenAiChatGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            GenerationError::NotConfigured(format!("{} is not set", self.api_key_env))
        })?;

        debug!(
            "Requesting completion from {} ({} prompt bytes)",
            self.model,
            prompt.len()
        );

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let result: ChatResponse = response.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| GenerationError::EmptyResponse {
                provider: self.name().to_string(),
            })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer) -> OpenAiChatGenerator {
        let config = GenerationConfig {
            base_url: format!("{}/v1", server.uri()),
            api_key_env: "KBASE_TEST_GENERATION_KEY_UNSET".to_string(),
            ..GenerationConfig::default()
        };
        OpenAiChatGenerator::new(&config)
            .unwrap()
            .with_api_key("test-key")
    }

    #[tokio::test]
    async fn test_generate_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "What is up?"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "The sky."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let answer = generator(&server).generate("What is up?").await.unwrap();
        assert_eq!(answer, "The sky.");
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = generator(&server).generate("hi").await.unwrap_err();
        assert!(matches!(err, GenerationError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let err = generator(&server).generate("hi").await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let config = GenerationConfig {
            api_key_env: "KBASE_TEST_GENERATION_KEY_UNSET".to_string(),
            ..GenerationConfig::default()
        };
        let generator = OpenAiChatGenerator::new(&config).unwrap();
        let err = generator.generate("hi").await.unwrap_err();
        assert!(matches!(err, GenerationError::NotConfigured(_)));
    }
}
