//! Local BERT sentence-embedding model, downloaded from the HuggingFace Hub.

use std::sync::Arc;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::model::ModelLoader;
use crate::provider::EmbeddingProvider;
use crate::similarity::normalize;

/// Loader for a BERT-family sentence-embedding model on the HuggingFace Hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalBertLoader {
    /// Hub repository, e.g. `sentence-transformers/all-MiniLM-L6-v2`.
    pub repo_id: String,
}

impl Default for LocalBertLoader {
    fn default() -> Self {
        Self {
            repo_id: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
        }
    }
}

impl LocalBertLoader {
    /// Create a loader for the given repository.
    pub fn new(repo_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
        }
    }
}

#[async_trait]
impl ModelLoader for LocalBertLoader {
    fn describe(&self) -> String {
        format!("local:{}", self.repo_id)
    }

    async fn load(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let repo_id = self.repo_id.clone();
        let provider = tokio::task::spawn_blocking(move || LocalBertProvider::load(&repo_id))
            .await
            .map_err(|e| EmbeddingError::ModelUnavailable(format!("loader task failed: {e}")))??;
        Ok(Arc::new(provider))
    }
}

/// BERT encoder with mean pooling and L2 normalization.
#[derive(Clone)]
pub struct LocalBertProvider {
    model: Arc<BertModel>,
    tokenizer: Tokenizer,
    device: Device,
    repo_id: String,
}

impl std::fmt::Debug for LocalBertProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBertProvider")
            .field("repo_id", &self.repo_id)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl LocalBertProvider {
    /// Download (or reuse the cached copy of) a model and load it on CPU.
    pub fn load(repo_id: &str) -> Result<Self> {
        let unavailable = |what: &str, e: &dyn std::fmt::Display| {
            EmbeddingError::ModelUnavailable(format!("{what} for {repo_id}: {e}"))
        };

        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| unavailable("failed to create HuggingFace API client", &e))?;
        let repo = api.model(repo_id.to_owned());

        let config_path = repo
            .get("config.json")
            .map_err(|e| unavailable("failed to download config.json", &e))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| unavailable("failed to download tokenizer.json", &e))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(|e| unavailable("failed to download model.safetensors", &e))?;

        let config_str = std::fs::read_to_string(&config_path)
            .map_err(|e| unavailable("failed to read BERT config", &e))?;
        let config: BertConfig = serde_json::from_str(&config_str)?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| unavailable("failed to load tokenizer", &e))?;

        let device = Device::Cpu;
        // SAFETY: the safetensors file comes from the hf-hub cache and is not
        // modified while the VarBuilder holds the mapping.
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)? };
        let model = BertModel::load(vb, &config)?;

        Ok(Self {
            model: Arc::new(model),
            tokenizer,
            device,
            repo_id: repo_id.to_string(),
        })
    }

    /// Embed one text synchronously.
    pub fn embed_sync(&self, text: &str) -> Result<Embedding> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Inference(format!("tokenizer encode failed: {e}")))?;

        let token_ids = encoding.get_ids();
        let token_type_ids: Vec<u32> = vec![0; token_ids.len()];

        let input_ids = Tensor::new(token_ids, &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(token_type_ids.as_slice(), &self.device)?.unsqueeze(0)?;

        let hidden = self.model.forward(&input_ids, &token_type_ids, None)?;

        let seq_len = hidden.dim(1)?;
        let pooled = (hidden.sum(1)? / seq_len as f64)?.squeeze(0)?;

        let mut embedding = pooled.to_vec1::<f32>()?;
        normalize(&mut embedding);
        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalBertProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn model(&self) -> &str {
        &self.repo_id
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let this = self.clone();
        let texts = texts.to_vec();
        debug!("Embedding {} texts with {}", texts.len(), this.repo_id);
        tokio::task::spawn_blocking(move || {
            texts
                .iter()
                .map(|text| this.embed_sync(text))
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| EmbeddingError::Inference(format!("embedding task failed: {e}")))?
    }
}
