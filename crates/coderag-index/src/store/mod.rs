//! Vector index abstraction with `SQLite` and in-memory backends.

mod memory;
mod sqlite;

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use glob::{MatchOptions, Pattern};

use crate::chunker::{ChunkKind, CodeChunk};
use crate::error::{IndexError, Result};
use crate::languages::Lang;

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Unit of upsert and delete.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub chunk: CodeChunk,
    pub vector: Vec<f32>,
}

impl IndexEntry {
    #[must_use]
    pub fn new(chunk: CodeChunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id(),
            chunk,
            vector,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    pub chunk: CodeChunk,
    pub score: f32,
}

/// Metadata constraints applied before ranking. Empty filter matches all.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub language: Option<Lang>,
    pub path_glob: Option<Pattern>,
    pub kind: Option<ChunkKind>,
}

impl SearchFilter {
    /// # Errors
    ///
    /// Returns [`IndexError::Pattern`] if `glob` is not a valid pattern.
    pub fn with_path_glob(mut self, glob: &str) -> Result<Self> {
        let pattern = Pattern::new(glob).map_err(|e| IndexError::Pattern {
            pattern: glob.to_owned(),
            reason: e.msg.to_owned(),
        })?;
        self.path_glob = Some(pattern);
        Ok(self)
    }

    #[must_use]
    pub fn with_language(mut self, language: Lang) -> Self {
        self.language = Some(language);
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: ChunkKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.language.is_none() && self.path_glob.is_none() && self.kind.is_none()
    }

    #[must_use]
    pub fn matches(&self, chunk: &CodeChunk) -> bool {
        if let Some(lang) = self.language
            && chunk.language != Some(lang)
        {
            return false;
        }
        if let Some(kind) = self.kind
            && chunk.kind != kind
        {
            return false;
        }
        if let Some(pattern) = &self.path_glob
            && !pattern.matches_with(
                &chunk.file_path,
                MatchOptions {
                    case_sensitive: true,
                    require_literal_separator: false,
                    require_literal_leading_dot: false,
                },
            )
        {
            return false;
        }
        true
    }

    /// Stable text form, used in cache keys.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.language.map_or("", Lang::id),
            self.path_glob.as_ref().map_or("", Pattern::as_str),
            self.kind.map_or("", ChunkKind::as_str),
        )
    }
}

/// Which entries a [`VectorIndex::delete`] removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteScope {
    File(String),
    PathPrefix(String),
}

impl DeleteScope {
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::File(p) => path == p,
            Self::PathPrefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
}

/// What the index knows about one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub content_hash: String,
    pub language: Option<Lang>,
    pub size: u64,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    pub root: String,
    pub dimensions: usize,
    pub files: Vec<FileRecord>,
}

/// One collection per repository root; queries never cross collections.
pub trait VectorIndex: Send + Sync {
    /// Create the collection, or check that an existing one has `dimensions`.
    fn ensure_collection(
        &self,
        collection: &str,
        root: &str,
        dimensions: usize,
    ) -> BoxFuture<'_, Result<()>>;

    /// Vector dimension of the collection, or `None` if it does not exist.
    fn dimensions(&self, collection: &str) -> BoxFuture<'_, Result<Option<usize>>>;

    /// Insert or replace by id. An existing id with the same content hash is left alone.
    fn upsert(&self, collection: &str, entries: Vec<IndexEntry>)
    -> BoxFuture<'_, Result<UpsertStats>>;

    fn delete(&self, collection: &str, scope: DeleteScope) -> BoxFuture<'_, Result<usize>>;

    fn delete_ids(&self, collection: &str, ids: Vec<String>) -> BoxFuture<'_, Result<usize>>;

    /// The `k` nearest entries by cosine similarity, highest first, ties in
    /// insertion order. A missing collection yields no results; a vector of
    /// the wrong length is a [`IndexError::DimensionMismatch`].
    fn query(
        &self,
        collection: &str,
        vector: Vec<f32>,
        k: usize,
        filter: SearchFilter,
    ) -> BoxFuture<'_, Result<Vec<ScoredChunk>>>;

    fn list(&self) -> BoxFuture<'_, Result<Vec<CollectionInfo>>>;

    fn record_file(&self, collection: &str, record: FileRecord) -> BoxFuture<'_, Result<()>>;

    fn remove_file_record(&self, collection: &str, path: &str) -> BoxFuture<'_, Result<()>>;

    fn file_records(&self, collection: &str) -> BoxFuture<'_, Result<Vec<FileRecord>>>;

    /// Entry id to chunk content hash for one file.
    fn chunk_hashes(
        &self,
        collection: &str,
        path: &str,
    ) -> BoxFuture<'_, Result<HashMap<String, String>>>;

    /// Remove a collection with all its entries and file records.
    fn drop_collection(&self, collection: &str) -> BoxFuture<'_, Result<bool>>;
}

/// Collection name for a repository root: `repo_` and 16 hex chars of its
/// canonical path hash.
#[must_use]
pub fn collection_name(root: &Path) -> String {
    let canonical = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    let hash = blake3::hash(canonical.to_string_lossy().as_bytes());
    format!("repo_{}", &hash.to_hex()[..16])
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Sort by score descending, ties by insertion sequence, and keep `k`.
pub(crate) fn rank(mut scored: Vec<(u64, ScoredChunk)>, k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|(seq_a, a), (seq_b, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(seq_a.cmp(seq_b))
    });
    scored.truncate(k);
    scored.into_iter().map(|(_, s)| s).collect()
}

pub(crate) fn check_dimensions(collection: &str, expected: usize, entries: &[IndexEntry]) -> Result<()> {
    if let Some(bad) = entries.iter().find(|e| e.vector.len() != expected) {
        return Err(IndexError::DimensionMismatch {
            collection: collection.to_owned(),
            expected,
            actual: bad.vector.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_query_dimensions(collection: &str, expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(IndexError::DimensionMismatch {
            collection: collection.to_owned(),
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rank_breaks_ties_by_sequence() {
        let s = |seq: u64, path: &str, score: f32| {
            (
                seq,
                ScoredChunk {
                    id: path.into(),
                    chunk: test_support::chunk(path, None, 0, "x"),
                    score,
                },
            )
        };
        let ranked = rank(vec![s(3, "c", 0.5), s(1, "a", 0.5), s(2, "b", 0.9)], 2);
        let ids: Vec<_> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn filter_matches_language_kind_and_glob() {
        let chunk = test_support::chunk("src/app/main.py", Some(Lang::Python), 0, "x");
        assert!(SearchFilter::default().matches(&chunk));
        assert!(SearchFilter::default().with_language(Lang::Python).matches(&chunk));
        assert!(!SearchFilter::default().with_language(Lang::Rust).matches(&chunk));
        assert!(!SearchFilter::default().with_kind(ChunkKind::FunctionPart).matches(&chunk));
        let glob = SearchFilter::default().with_path_glob("src/*.py").unwrap();
        assert!(glob.matches(&chunk));
        let glob = SearchFilter::default().with_path_glob("tests/*").unwrap();
        assert!(!glob.matches(&chunk));
    }

    #[test]
    fn invalid_glob_is_an_error() {
        assert!(SearchFilter::default().with_path_glob("[").is_err());
    }

    #[test]
    fn delete_scope_prefix() {
        assert!(DeleteScope::PathPrefix("src/".into()).matches("src/a.rs"));
        assert!(!DeleteScope::File("src/a.rs".into()).matches("src/a.rsx"));
    }

    #[test]
    fn collection_name_is_stable_and_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let a = collection_name(dir.path());
        assert_eq!(a, collection_name(dir.path()));
        assert!(a.starts_with("repo_"));
        assert_eq!(a.len(), "repo_".len() + 16);
    }

    #[test]
    fn cache_key_reflects_filter() {
        assert_eq!(SearchFilter::default().cache_key(), "||");
        let f = SearchFilter::default().with_language(Lang::Go);
        assert_eq!(f.cache_key(), "go||");
    }
}
