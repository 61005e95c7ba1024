//! Configuration for the knowledge base.

use std::path::{Path, PathBuf};

use kbase_embeddings::{EmbeddingModel, OpenAiEmbeddingConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Instruction placed ahead of the context and question in every prompt.
pub const DEFAULT_INSTRUCTION: &str = "Always answer briefly and directly. Do not mention \
sources, the knowledge base, or how you derived the answer. Just state the fact.";

/// Configuration for the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KbaseConfig {
    /// Folder of `.txt` documents to index.
    pub documents_dir: PathBuf,

    /// Embedding model configuration.
    pub embedding: EmbeddingConfig,

    /// Text generation configuration.
    pub generation: GenerationConfig,

    /// Query processing configuration.
    pub query: QueryConfig,
}

impl KbaseConfig {
    /// Create a new configuration with default values.
    pub fn new(documents_dir: impl Into<PathBuf>) -> Self {
        Self {
            documents_dir: documents_dir.into(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            query: QueryConfig::default(),
        }
    }

    /// Parse a TOML configuration. Missing fields take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| RetrievalError::Config(e.to_string()))
    }

    /// Load a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| RetrievalError::Config(format!("{}: {e}", path.display())))
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    /// Set the generation configuration.
    pub fn with_generation(mut self, config: GenerationConfig) -> Self {
        self.generation = config;
        self
    }

    /// Set the query configuration.
    pub fn with_query(mut self, config: QueryConfig) -> Self {
        self.query = config;
        self
    }
}

impl Default for KbaseConfig {
    fn default() -> Self {
        Self::new("data")
    }
}

/// Type of embedding backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingBackend {
    /// OpenAI-compatible embeddings API.
    #[serde(rename = "openai")]
    OpenAi,
    /// Local BERT model (requires the `candle` feature).
    #[serde(rename = "local")]
    Local,
}

/// Configuration for the embedding model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which backend to use.
    pub backend: EmbeddingBackend,

    /// Model name (API model, or HuggingFace repo for the local backend).
    pub model: Option<String>,

    /// API base URL.
    pub base_url: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::OpenAi,
            model: None,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

impl EmbeddingConfig {
    /// Create the (not yet loaded) embedding model handle.
    pub fn build_model(&self) -> Result<EmbeddingModel> {
        match self.backend {
            EmbeddingBackend::OpenAi => {
                let mut loader = OpenAiEmbeddingConfig {
                    api_key_env: self.api_key_env.clone(),
                    timeout_secs: self.timeout_secs,
                    ..OpenAiEmbeddingConfig::default()
                };
                if let Some(model) = &self.model {
                    loader = loader.with_model(model);
                }
                if let Some(url) = &self.base_url {
                    loader = loader.with_base_url(url);
                }
                Ok(EmbeddingModel::new(loader))
            }
            #[cfg(feature = "candle")]
            EmbeddingBackend::Local => {
                let loader = match &self.model {
                    Some(repo) => kbase_embeddings::LocalBertLoader::new(repo),
                    None => kbase_embeddings::LocalBertLoader::default(),
                };
                Ok(EmbeddingModel::new(loader))
            }
            #[cfg(not(feature = "candle"))]
            EmbeddingBackend::Local => Err(RetrievalError::Config(
                "the local embedding backend requires the `candle` feature".to_string(),
            )),
        }
    }
}

/// Configuration for the text generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// API base URL of an OpenAI-compatible chat completions endpoint.
    pub base_url: String,

    /// Model name.
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Instruction placed at the top of every prompt.
    pub instruction: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 512,
            instruction: DEFAULT_INSTRUCTION.to_string(),
            timeout_secs: 120,
        }
    }
}

/// Configuration for query processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of units retrieved as context.
    pub top_k: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}
