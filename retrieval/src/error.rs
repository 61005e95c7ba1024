//! Error types for the retrieval engine.

use kbase_documents::DocumentError;
use kbase_embeddings::EmbeddingError;
use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval engine.
///
/// An empty corpus is not an error: retrieval against it returns no units.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Embedding error, including an unavailable model and dimension
    /// mismatches between a query and the index.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// A rebuild was aborted. The previously published corpus is untouched.
    #[error("rebuild failed: {0}")]
    RebuildFailed(#[from] RebuildError),

    /// The text generation backend could not produce an answer.
    #[error("generation unavailable: {0}")]
    GenerationUnavailable(#[from] GenerationError),

    /// The question was blank.
    #[error("question is empty")]
    EmptyQuestion,

    /// A search hit pointed past the end of the corpus.
    #[error("search returned row {row} but the corpus has {units} units")]
    UnitOutOfRange { row: usize, units: usize },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RetrievalError {
    /// Whether the embedding model could not be loaded, either directly or
    /// while rebuilding.
    pub fn is_model_unavailable(&self) -> bool {
        match self {
            Self::Embedding(e) => e.is_model_unavailable(),
            Self::RebuildFailed(RebuildError::Embed { error, .. }) => error.is_model_unavailable(),
            _ => false,
        }
    }
}

/// The stage at which a rebuild failed.
#[derive(Error, Debug)]
pub enum RebuildError {
    /// A document could not be read.
    #[error("failed to read documents: {0}")]
    ReadDocuments(#[source] DocumentError),

    /// The new corpus could not be embedded.
    #[error("failed to embed {units} units: {error}")]
    Embed {
        units: usize,
        #[source]
        error: EmbeddingError,
    },

    /// The vectors could not be indexed.
    #[error("failed to build index: {0}")]
    BuildIndex(#[source] EmbeddingError),

    /// The index row count disagrees with the corpus length.
    #[error("index has {rows} rows for {units} units")]
    SizeMismatch { units: usize, rows: usize },
}

/// Errors from the text generation backend.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Backend not configured (e.g. no API key).
    #[error("generation backend not configured: {0}")]
    NotConfigured(String),

    /// API returned an error status.
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The response had no usable text.
    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
