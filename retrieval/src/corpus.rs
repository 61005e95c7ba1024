//! Corpus management.
//!
//! A [`CorpusGeneration`] is one immutable (corpus, index, model) triple
//! produced by a single rebuild. The [`CorpusManager`] publishes generations
//! by swapping one `Arc`, so a reader either sees the whole old generation or
//! the whole new one.

use std::sync::Arc;
use std::time::Instant;

use kbase_documents::{DocumentSource, RetrievalUnit, TextSegmenter};
use kbase_embeddings::{EmbeddingModel, VectorIndex};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{RebuildError, Result, RetrievalError};

/// Ordered retrieval units. A unit's position is its identity and matches its
/// row in the paired index.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    units: Vec<RetrievalUnit>,
}

impl Corpus {
    /// Create a corpus from units in order.
    pub fn new(units: Vec<RetrievalUnit>) -> Self {
        Self { units }
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Check if the corpus is empty.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Get a unit by position.
    pub fn get(&self, position: usize) -> Option<&RetrievalUnit> {
        self.units.get(position)
    }

    /// Iterate units in order.
    pub fn iter(&self) -> impl Iterator<Item = &RetrievalUnit> {
        self.units.iter()
    }
}

/// One published (corpus, index) pair, with the model that embedded it.
///
/// Queries against a generation are embedded with the generation's own model,
/// so a query vector always has the index's dimension even if a later rebuild
/// switched models.
#[derive(Debug)]
pub struct CorpusGeneration {
    number: u64,
    documents: usize,
    corpus: Corpus,
    index: VectorIndex,
    model: Arc<EmbeddingModel>,
}

impl CorpusGeneration {
    /// The initial, empty generation.
    pub fn empty(model: Arc<EmbeddingModel>) -> Self {
        Self {
            number: 0,
            documents: 0,
            corpus: Corpus::default(),
            index: VectorIndex::empty(),
            model,
        }
    }

    fn new(
        number: u64,
        documents: usize,
        corpus: Corpus,
        index: VectorIndex,
        model: Arc<EmbeddingModel>,
    ) -> std::result::Result<Self, RebuildError> {
        if corpus.len() != index.len() {
            return Err(RebuildError::SizeMismatch {
                units: corpus.len(),
                rows: index.len(),
            });
        }

        Ok(Self {
            number,
            documents,
            corpus,
            index,
            model,
        })
    }

    /// Generation number; 0 is the initial empty generation.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Number of retrieval units.
    pub fn unit_count(&self) -> usize {
        self.corpus.len()
    }

    /// Whether there is an index to search.
    pub fn has_index(&self) -> bool {
        !self.index.is_empty()
    }

    /// The units.
    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// The index.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// The model that embedded this generation.
    pub fn model(&self) -> &Arc<EmbeddingModel> {
        &self.model
    }

    /// Health snapshot.
    pub fn status(&self) -> CorpusStatus {
        CorpusStatus {
            generation: self.number,
            documents: self.documents,
            unit_count: self.unit_count(),
            has_index: self.has_index(),
            dimension: self.index.dimension(),
            model: self.model.describe(),
        }
    }

    /// Return the text of the `k` units closest to the question, best first.
    ///
    /// An empty generation returns no units without embedding anything.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<String>> {
        if self.corpus.is_empty() || self.index.is_empty() {
            debug!("Corpus generation {} is empty; nothing to retrieve", self.number);
            return Ok(Vec::new());
        }

        let question = question.trim();
        if question.is_empty() {
            return Err(RetrievalError::EmptyQuestion);
        }

        let k = k.min(self.corpus.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = self.model.embed_one(question).await?;
        let hits = self.index.search(&query, k)?;

        hits.into_iter()
            .map(|hit| {
                self.corpus
                    .get(hit.row)
                    .map(|unit| unit.as_str().to_string())
                    .ok_or(RetrievalError::UnitOutOfRange {
                        row: hit.row,
                        units: self.corpus.len(),
                    })
            })
            .collect()
    }
}

/// Read-only health snapshot of the live generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStatus {
    /// Generation number.
    pub generation: u64,

    /// Number of documents read.
    pub documents: usize,

    /// Number of retrieval units.
    pub unit_count: usize,

    /// Whether an index is present.
    pub has_index: bool,

    /// Vector dimension of the index.
    pub dimension: Option<usize>,

    /// Embedding model.
    pub model: String,
}

/// Summary of a successful rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
    /// Number of the newly published generation.
    pub generation: u64,

    /// Number of documents read.
    pub documents: usize,

    /// Number of retrieval units indexed.
    pub units: usize,

    /// Vector dimension, absent for an empty corpus.
    pub dimension: Option<usize>,

    /// Wall-clock time of the rebuild in milliseconds.
    pub elapsed_ms: u64,
}

/// Owns the live corpus generation and rebuilds it from a document source.
///
/// Rebuilds are serialized by a dedicated lock held for the whole
/// build-and-swap. Readers only take the `live` lock long enough to clone the
/// current `Arc`, then embed and search against that snapshot without any
/// lock held.
pub struct CorpusManager {
    segmenter: TextSegmenter,
    live: RwLock<Arc<CorpusGeneration>>,
    rebuild_lock: Mutex<()>,
}

impl CorpusManager {
    /// Create a manager with an empty corpus that will embed with `model`.
    pub fn new(model: Arc<EmbeddingModel>) -> Self {
        Self::with_segmenter(model, TextSegmenter::new())
    }

    /// Create a manager with a custom segmenter.
    pub fn with_segmenter(model: Arc<EmbeddingModel>, segmenter: TextSegmenter) -> Self {
        Self {
            segmenter,
            live: RwLock::new(Arc::new(CorpusGeneration::empty(model))),
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Take a consistent reference to the live generation.
    pub async fn snapshot(&self) -> Arc<CorpusGeneration> {
        Arc::clone(&*self.live.read().await)
    }

    /// Health snapshot of the live generation.
    pub async fn status(&self) -> CorpusStatus {
        self.snapshot().await.status()
    }

    /// Rebuild from `source` with the live generation's model.
    pub async fn rebuild(&self, source: &dyn DocumentSource) -> Result<RebuildReport> {
        let _guard = self.rebuild_lock.lock().await;
        let model = Arc::clone(self.snapshot().await.model());
        self.rebuild_locked(source, model).await
    }

    /// Rebuild from `source` with a different model. On success the new model
    /// becomes the live model; on failure nothing changes.
    pub async fn rebuild_with_model(
        &self,
        source: &dyn DocumentSource,
        model: Arc<EmbeddingModel>,
    ) -> Result<RebuildReport> {
        let _guard = self.rebuild_lock.lock().await;
        self.rebuild_locked(source, model).await
    }

    async fn rebuild_locked(
        &self,
        source: &dyn DocumentSource,
        model: Arc<EmbeddingModel>,
    ) -> Result<RebuildReport> {
        let started = Instant::now();
        let number = self.snapshot().await.number() + 1;
        info!(
            "Rebuilding corpus generation {number} from {}",
            source.describe()
        );

        let generation = match self.build(source, model, number).await {
            Ok(generation) => generation,
            Err(e) => {
                warn!("Rebuild of generation {number} aborted: {e}");
                return Err(e.into());
            }
        };

        let report = RebuildReport {
            generation: number,
            documents: generation.documents,
            units: generation.unit_count(),
            dimension: generation.index.dimension(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        *self.live.write().await = Arc::new(generation);

        info!(
            "Published corpus generation {number}: {} documents, {} units in {}ms",
            report.documents, report.units, report.elapsed_ms
        );
        Ok(report)
    }

    async fn build(
        &self,
        source: &dyn DocumentSource,
        model: Arc<EmbeddingModel>,
        number: u64,
    ) -> std::result::Result<CorpusGeneration, RebuildError> {
        let documents = source.load().await.map_err(RebuildError::ReadDocuments)?;

        let units: Vec<RetrievalUnit> = documents
            .iter()
            .flat_map(|document| self.segmenter.segment(&document.text))
            .collect();
        debug!(
            "Segmented {} documents into {} units",
            documents.len(),
            units.len()
        );

        let texts: Vec<String> = units.iter().map(|unit| unit.as_str().to_string()).collect();
        let vectors = model
            .embed(&texts)
            .await
            .map_err(|error| RebuildError::Embed {
                units: texts.len(),
                error,
            })?;

        let index = VectorIndex::build(vectors).map_err(RebuildError::BuildIndex)?;

        CorpusGeneration::new(number, documents.len(), Corpus::new(units), index, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kbase_documents::InMemorySource;
    use kbase_embeddings::{Embedding, EmbeddingError, EmbeddingProvider};
    use pretty_assertions::assert_eq;

    /// Embeds a text as `[token count, character count]`.
    struct ShapeProvider;

    #[async_trait]
    impl EmbeddingProvider for ShapeProvider {
        fn name(&self) -> &str {
            "shape"
        }

        fn model(&self) -> &str {
            "shape-2"
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> kbase_embeddings::Result<Vec<Embedding>> {
            Ok(texts
                .iter()
                .map(|t| vec![t.split(' ').count() as f32, t.len() as f32])
                .collect())
        }
    }

    /// Returns one vector too few.
    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        fn name(&self) -> &str {
            "short"
        }

        fn model(&self) -> &str {
            "short-1"
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> kbase_embeddings::Result<Vec<Embedding>> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0]).collect())
        }
    }

    fn model(provider: impl EmbeddingProvider + 'static) -> Arc<EmbeddingModel> {
        Arc::new(EmbeddingModel::from_provider(Arc::new(provider)))
    }

    #[tokio::test]
    async fn test_initial_generation_is_empty() {
        let manager = CorpusManager::new(model(ShapeProvider));
        let status = manager.status().await;

        assert_eq!(status.generation, 0);
        assert_eq!(status.unit_count, 0);
        assert!(!status.has_index);
        assert!(manager.snapshot().await.retrieve("anything", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_keeps_units_and_rows_in_step() {
        let manager = CorpusManager::new(model(ShapeProvider));
        let source = InMemorySource::from_texts([
            "The cat sat. A dog barked loudly!",
            "Birds sing at dawn.",
        ]);

        let report = manager.rebuild(&source).await.unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!(report.documents, 2);
        assert_eq!(report.units, 3);
        assert_eq!(report.dimension, Some(2));

        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.corpus().len(), snapshot.index().len());
        let units: Vec<&str> = snapshot.corpus().iter().map(RetrievalUnit::as_str).collect();
        assert_eq!(units, vec!["cat sat", "dog barked loudly", "Birds sing dawn"]);
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_generation() {
        let manager = CorpusManager::new(model(ShapeProvider));
        manager
            .rebuild(&InMemorySource::from_texts(["Rivers flow east."]))
            .await
            .unwrap();

        let err = manager
            .rebuild_with_model(
                &InMemorySource::from_texts(["Mountains rise. Valleys fall."]),
                model(ShortProvider),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::RebuildFailed(RebuildError::Embed {
                error: EmbeddingError::InvalidResponse(_),
                ..
            })
        ));

        let status = manager.status().await;
        assert_eq!(status.generation, 1);
        assert_eq!(status.unit_count, 1);
        assert_eq!(status.model, "shape:shape-2");
    }

    #[tokio::test]
    async fn test_generation_numbers_increase() {
        let manager = CorpusManager::new(model(ShapeProvider));
        let source = InMemorySource::from_texts(["One fish."]);
        for expected in 1..=3 {
            let report = manager.rebuild(&source).await.unwrap();
            assert_eq!(report.generation, expected);
        }
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let manager = CorpusManager::new(model(ShapeProvider));
        manager
            .rebuild(&InMemorySource::from_texts(["Rivers flow east."]))
            .await
            .unwrap();

        let err = manager.snapshot().await.retrieve("   ", 1).await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmptyQuestion));
    }
}
