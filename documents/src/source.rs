//! Document sources.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{DocumentError, Result};

/// A plain-text document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier, e.g. the path relative to the source root.
    pub id: String,

    /// Full document text.
    pub text: String,
}

impl Document {
    /// Create a new document.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Anything that can produce the full set of documents to index.
///
/// Implementations must return documents in a stable order so that a single
/// rebuild sees a consistent sequence.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Human-readable description of the source, for logs.
    fn describe(&self) -> String;

    /// Load every document. Any read failure fails the whole load.
    async fn load(&self) -> Result<Vec<Document>>;
}

/// A folder of `.txt` files, walked recursively.
#[derive(Debug, Clone)]
pub struct FolderSource {
    root: PathBuf,
    extension: String,
    follow_symlinks: bool,
}

impl FolderSource {
    /// Create a source for the given folder, reading `.txt` files.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "txt".to_string(),
            follow_symlinks: false,
        }
    }

    /// Read files with a different extension (compared case-insensitively).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Descend into symlinked directories.
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// The folder being read.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_document(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    /// List document paths, sorted so enumeration order is stable.
    fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(DocumentError::NotADirectory(self.root.clone()));
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name();

        let mut paths = Vec::new();
        for entry in walker {
            let entry = entry?;
            // Symlinks to files are read through; a dangling one fails the read.
            if entry.file_type().is_dir() || !self.is_document(entry.path()) {
                continue;
            }
            paths.push(entry.into_path());
        }

        Ok(paths)
    }
}

#[async_trait]
impl DocumentSource for FolderSource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn load(&self) -> Result<Vec<Document>> {
        // Walking the tree is blocking filesystem work.
        let source = self.clone();
        let paths = tokio::task::spawn_blocking(move || source.list())
            .await
            .map_err(|e| DocumentError::io(&self.root, std::io::Error::other(e)))??;
        let mut documents = Vec::with_capacity(paths.len());

        for path in paths {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| DocumentError::io(&path, e))?;
            let (text, skipped) = decode_lossy(&bytes);
            if skipped > 0 {
                warn!(
                    "Ignored {skipped} invalid UTF-8 bytes in {}",
                    path.display()
                );
            }

            let id = path
                .strip_prefix(&self.root)
                .unwrap_or(path.as_path())
                .to_string_lossy()
                .into_owned();
            debug!("Read document {id} ({} bytes)", bytes.len());
            documents.push(Document { id, text });
        }

        info!(
            "Loaded {} documents from {}",
            documents.len(),
            self.root.display()
        );
        Ok(documents)
    }
}

/// A fixed list of documents held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    documents: Vec<Document>,
}

impl InMemorySource {
    /// Create a source from documents, kept in the given order.
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// Create a source with one document per text, named by position.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts
                .into_iter()
                .enumerate()
                .map(|(i, text)| Document::new(format!("doc-{i}"), text))
                .collect(),
        )
    }
}

#[async_trait]
impl DocumentSource for InMemorySource {
    fn describe(&self) -> String {
        format!("memory ({} documents)", self.documents.len())
    }

    async fn load(&self) -> Result<Vec<Document>> {
        Ok(self.documents.clone())
    }
}

/// Decode UTF-8, dropping invalid byte sequences instead of replacing them.
///
/// Returns the text and the number of bytes dropped.
fn decode_lossy(bytes: &[u8]) -> (String, usize) {
    let mut text = String::with_capacity(bytes.len());
    let mut skipped = 0;
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
        skipped += chunk.invalid().len();
    }
    (text, skipped)
}
