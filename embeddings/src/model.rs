//! Lazily-loaded, shared embedding model handle.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::EmbeddingProvider;

/// Builds an embedding provider. Called at most once per successful load.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Short human-readable name of the model being loaded.
    fn describe(&self) -> String;

    /// Load the model. Any failure is reported as `ModelUnavailable`.
    async fn load(&self) -> Result<Arc<dyn EmbeddingProvider>>;
}

/// Loader for a provider that is already constructed.
struct Preloaded(Arc<dyn EmbeddingProvider>);

#[async_trait]
impl ModelLoader for Preloaded {
    fn describe(&self) -> String {
        format!("{}:{}", self.0.name(), self.0.model())
    }

    async fn load(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::clone(&self.0))
    }
}

/// Shared handle to one embedding model.
///
/// The model is loaded on first use. Concurrent first callers wait for a
/// single load instead of racing to build their own; a failed load is not
/// remembered, so the next call tries again.
pub struct EmbeddingModel {
    loader: Box<dyn ModelLoader>,
    provider: OnceCell<Arc<dyn EmbeddingProvider>>,
}

impl std::fmt::Debug for EmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingModel")
            .field("model", &self.loader.describe())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl EmbeddingModel {
    /// Create a handle that loads the model on first use.
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            provider: OnceCell::new(),
        }
    }

    /// Wrap a provider that needs no loading.
    pub fn from_provider(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            loader: Box::new(Preloaded(Arc::clone(&provider))),
            provider: OnceCell::from(provider),
        }
    }

    /// Name of the underlying model.
    pub fn describe(&self) -> String {
        self.loader.describe()
    }

    /// Whether the model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.provider.initialized()
    }

    /// Get the loaded provider, loading it if this is the first use.
    pub async fn provider(&self) -> Result<&Arc<dyn EmbeddingProvider>> {
        self.provider
            .get_or_try_init(|| async {
                let name = self.loader.describe();
                info!("Loading embedding model {name}");
                match self.loader.load().await {
                    Ok(provider) => {
                        info!("Embedding model {name} ready");
                        Ok(provider)
                    }
                    Err(e) => {
                        warn!("Failed to load embedding model {name}: {e}");
                        Err(match e {
                            EmbeddingError::ModelUnavailable(_) => e,
                            other => EmbeddingError::ModelUnavailable(other.to_string()),
                        })
                    }
                }
            })
            .await
    }

    /// Embed a batch of texts, one vector per text, in input order.
    ///
    /// An empty batch returns immediately without touching the model.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let provider = self.provider().await?;
        let embeddings = provider.embed_batch(texts).await?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "{} returned {} embeddings for {} texts",
                provider.name(),
                embeddings.len(),
                texts.len()
            )));
        }

        Ok(embeddings)
    }

    /// Embed a single text.
    pub async fn embed_one(&self, text: &str) -> Result<Embedding> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding returned".to_string()))
    }
}
