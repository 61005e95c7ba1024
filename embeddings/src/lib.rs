//! # Embeddings
//!
//! Sentence embeddings and exact nearest-neighbor search for kbase.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text batches to dense vectors
//! - **Lazy Model Handle**: The model is loaded once, on first use, and shared
//! - **Exact Search**: Exhaustive k-nearest-neighbor search under Euclidean distance
//! - **Multiple Backends**: OpenAI-compatible HTTP endpoints, or a local BERT
//!   model behind the `candle` feature
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ModelLoader ──► EmbeddingModel ──► Vec<Embedding>              │
//! │       │                │                  │                     │
//! │       ▼                ▼                  ▼                     │
//! │  OpenAI/Local   EmbeddingProvider    VectorIndex               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod index;
#[cfg(feature = "candle")]
pub mod local;
pub mod model;
pub mod provider;
pub mod similarity;

pub use error::{EmbeddingError, Result};
pub use index::{Neighbor, VectorIndex};
#[cfg(feature = "candle")]
pub use local::{LocalBertLoader, LocalBertProvider};
pub use model::{EmbeddingModel, ModelLoader};
pub use provider::{EmbeddingProvider, OpenAiEmbeddingConfig, OpenAiProvider};
pub use similarity::{euclidean_distance, squared_euclidean};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
