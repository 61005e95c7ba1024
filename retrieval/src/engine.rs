//! Knowledge base engine implementation.

use std::sync::Arc;

use kbase_documents::{DocumentSource, FolderSource, TextSegmenter};
use kbase_embeddings::EmbeddingModel;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::composer::AnswerComposer;
use crate::config::{KbaseConfig, QueryConfig};
use crate::corpus::{CorpusManager, CorpusStatus, RebuildReport};
use crate::error::{Result, RetrievalError};
use crate::generation::{OpenAiChatGenerator, TextGenerator};

/// Retrieval-augmented question answering over one document collection.
///
/// This is the main entry point. It coordinates:
/// - Rebuilding the corpus and its index from a document source
/// - Retrieving the units closest to a question
/// - Composing an answer from the retrieved units
pub struct KnowledgeBase {
    /// Live corpus generation and rebuilds.
    corpus: CorpusManager,

    /// Answer composition.
    composer: AnswerComposer,

    /// Query defaults.
    query: QueryConfig,
}

impl KnowledgeBase {
    /// Create a new knowledge base builder.
    pub fn builder() -> KnowledgeBaseBuilder {
        KnowledgeBaseBuilder::new()
    }

    /// Create a knowledge base from configuration.
    ///
    /// Nothing is loaded or indexed yet; the embedding model loads on first
    /// use and the corpus stays empty until [`KnowledgeBase::rebuild`].
    pub fn from_config(config: &KbaseConfig) -> Result<Self> {
        let model = config.embedding.build_model()?;
        let generator = OpenAiChatGenerator::new(&config.generation)?;

        info!(
            "Initializing knowledge base with {} and generator {}",
            model.describe(),
            config.generation.model
        );

        Self::builder()
            .with_model(Arc::new(model))
            .with_generator(Arc::new(generator))
            .with_instruction(config.generation.instruction.clone())
            .with_query(config.query.clone())
            .build()
    }

    /// Rebuild the corpus from `source` using the live embedding model.
    ///
    /// On failure the previous corpus stays live and queryable.
    pub async fn rebuild(&self, source: &dyn DocumentSource) -> Result<RebuildReport> {
        self.corpus.rebuild(source).await
    }

    /// Rebuild the corpus from a folder of `.txt` files.
    pub async fn rebuild_from_folder(
        &self,
        root: impl Into<std::path::PathBuf>,
    ) -> Result<RebuildReport> {
        self.rebuild(&FolderSource::new(root)).await
    }

    /// Rebuild the corpus with a different embedding model. The model goes
    /// live together with the corpus it embedded.
    pub async fn rebuild_with_model(
        &self,
        source: &dyn DocumentSource,
        model: Arc<EmbeddingModel>,
    ) -> Result<RebuildReport> {
        self.corpus.rebuild_with_model(source, model).await
    }

    /// Health snapshot of the live corpus.
    pub async fn status(&self) -> CorpusStatus {
        self.corpus.status().await
    }

    /// Number of units retrieved when the caller does not ask for a count.
    pub fn default_top_k(&self) -> usize {
        self.query.top_k
    }

    /// Return the text of up to `k` units closest to the question, best first.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<String>> {
        if question.trim().is_empty() {
            return Err(RetrievalError::EmptyQuestion);
        }

        let generation = self.corpus.snapshot().await;
        debug!(
            "Retrieving {k} units from generation {} for: {question}",
            generation.number()
        );
        generation.retrieve(question, k).await
    }

    /// Retrieve context for the question and compose an answer from it.
    pub async fn ask(&self, question: &str, k: usize) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(RetrievalError::EmptyQuestion);
        }

        let generation = self.corpus.snapshot().await;
        let context = generation.retrieve(question, k).await?;
        let text = self.composer.compose(&context, question).await?;

        Ok(Answer {
            text,
            context,
            generation: generation.number(),
        })
    }
}

/// An answer with the context it was composed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// Generated answer text.
    pub text: String,

    /// Retrieved units, best first.
    pub context: Vec<String>,

    /// Corpus generation the context came from.
    pub generation: u64,
}

/// Builder for a knowledge base.
pub struct KnowledgeBaseBuilder {
    model: Option<Arc<EmbeddingModel>>,
    generator: Option<Arc<dyn TextGenerator>>,
    instruction: Option<String>,
    segmenter: TextSegmenter,
    query: QueryConfig,
}

impl KnowledgeBaseBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            model: None,
            generator: None,
            instruction: None,
            segmenter: TextSegmenter::new(),
            query: QueryConfig::default(),
        }
    }

    /// Set the embedding model.
    pub fn with_model(mut self, model: Arc<EmbeddingModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the text generator.
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the prompt instruction.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Set the segmenter.
    pub fn with_segmenter(mut self, segmenter: TextSegmenter) -> Self {
        self.segmenter = segmenter;
        self
    }

    /// Set the query defaults.
    pub fn with_query(mut self, query: QueryConfig) -> Self {
        self.query = query;
        self
    }

    /// Build the knowledge base.
    pub fn build(self) -> Result<KnowledgeBase> {
        let model = self
            .model
            .ok_or_else(|| RetrievalError::Config("no embedding model configured".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| RetrievalError::Config("no text generator configured".to_string()))?;

        let mut composer = AnswerComposer::new(generator);
        if let Some(instruction) = self.instruction {
            composer = composer.with_instruction(instruction);
        }

        Ok(KnowledgeBase {
            corpus: CorpusManager::with_segmenter(model, self.segmenter),
            composer,
            query: self.query,
        })
    }
}

impl Default for KnowledgeBaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_requires_model() {
        let generator = OpenAiChatGenerator::new(&GenerationConfig::default()).unwrap();
        let result = KnowledgeBase::builder()
            .with_generator(Arc::new(generator))
            .build();
        assert!(matches!(result, Err(RetrievalError::Config(_))));
    }

    #[tokio::test]
    async fn test_from_config_starts_empty() {
        let kb = KnowledgeBase::from_config(&KbaseConfig::default()).unwrap();
        let status = kb.status().await;

        assert_eq!(status.generation, 0);
        assert_eq!(status.unit_count, 0);
        assert!(!status.has_index);
        assert_eq!(kb.default_top_k(), 3);
        assert!(kb.retrieve("anything", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let kb = KnowledgeBase::from_config(&KbaseConfig::default()).unwrap();
        assert!(matches!(
            kb.retrieve(" \n", 3).await,
            Err(RetrievalError::EmptyQuestion)
        ));
        assert!(matches!(
            kb.ask("", 3).await,
            Err(RetrievalError::EmptyQuestion)
        ));
    }
}
