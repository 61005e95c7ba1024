//! # Knowledge Base
//!
//! Self-hosted retrieval-augmented question answering over a folder of plain
//! text documents:
//!
//! - **Corpus Manager**: rebuilds the (corpus, index) pair and publishes it atomically
//! - **Retrieval**: embeds a question and finds the closest units
//! - **Answer Composer**: turns retrieved units and the question into one generation request
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Knowledge Base                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  documents ──► Text Segmenter ──► units ──► Embedding Model     │
//! │                                                │                │
//! │                                                ▼                │
//! │                                         ┌──────────────┐        │
//! │                                         │ Vector Index │        │
//! │                                         └──────────────┘        │
//! │                                                │                │
//! │                 ┌──────────────────────────────┘                │
//! │                 ▼                                               │
//! │  ┌──────────────────────────┐      ┌──────────────┐             │
//! │  │ Corpus Generation (Arc)  │ ───► │   Answer     │ ──► answer  │
//! │  │ units + index + model    │      │   Composer   │             │
//! │  └──────────────────────────┘      └──────────────┘             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kbase_retrieval::{KbaseConfig, KnowledgeBase};
//!
//! let kb = KnowledgeBase::from_config(&KbaseConfig::new("data"))?;
//! kb.rebuild_from_folder("data").await?;
//!
//! let answer = kb.ask("What is the capital of France?", 3).await?;
//! println!("{}", answer.text);
//! ```

pub mod composer;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod generation;

pub use composer::AnswerComposer;
pub use config::{
    DEFAULT_INSTRUCTION, EmbeddingBackend, EmbeddingConfig, GenerationConfig, KbaseConfig,
    QueryConfig,
};
pub use corpus::{Corpus, CorpusGeneration, CorpusManager, CorpusStatus, RebuildReport};
pub use engine::{Answer, KnowledgeBase, KnowledgeBaseBuilder};
pub use error::{GenerationError, RebuildError, Result, RetrievalError};
pub use generation::{OpenAiChatGenerator, TextGenerator};

// Re-export from dependencies for convenience
pub use kbase_documents::{Document, DocumentSource, FolderSource, InMemorySource, TextSegmenter};
pub use kbase_embeddings::{EmbeddingModel, EmbeddingProvider, ModelLoader, VectorIndex};
