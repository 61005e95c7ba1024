//! # Documents
//!
//! Turns a folder of plain-text documents into retrieval units.
//!
//! ```text
//! DocumentSource ──► Document ──► TextSegmenter ──► RetrievalUnit
//!  (folder, .txt)     (text)      (sentences,        (normalized
//!                                  stopwords)          sentence)
//! ```

pub mod error;
pub mod segmenter;
pub mod source;
pub mod stopwords;

pub use error::{DocumentError, Result};
pub use segmenter::{RetrievalUnit, SegmenterConfig, TextSegmenter};
pub use source::{Document, DocumentSource, FolderSource, InMemorySource};
pub use stopwords::{ENGLISH_STOPWORDS, is_stopword};
