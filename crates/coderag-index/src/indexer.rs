//! Incremental indexing: scan, diff against file records, chunk, embed, store.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use coderag_llm::EmbeddingBackend;
use futures::{StreamExt, TryStreamExt, stream};

use crate::boundary::BoundaryRegistry;
use crate::chunker::{Chunker, ChunkerConfig, CodeChunk};
use crate::embedding::EmbeddingClient;
use crate::error::{IndexError, Result};
use crate::scanner::{ScanOptions, Scanner, SourceFile, relative_path};
use crate::store::{DeleteScope, FileRecord, IndexEntry, VectorIndex, collection_name};

pub const DEFAULT_PARALLELISM: usize = 4;

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chunker: ChunkerConfig,
    pub scan: ScanOptions,
    /// Files chunked and embedded at the same time.
    pub parallelism: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            scan: ScanOptions::default(),
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

/// Summary of an indexing run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_removed: usize,
    pub chunks_embedded: usize,
    pub chunks_reused: usize,
    pub chunks_removed: usize,
    /// Non-fatal problems: skipped files and failed cleanups.
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct FileOutcome {
    embedded: usize,
    reused: usize,
    removed: usize,
}

/// Drives a repository into a [`VectorIndex`] collection.
pub struct Indexer<B> {
    index: Arc<dyn VectorIndex>,
    embedder: EmbeddingClient<B>,
    chunker: Chunker,
    scan: ScanOptions,
    parallelism: usize,
}

impl<B: EmbeddingBackend> Indexer<B> {
    #[must_use]
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embedder: EmbeddingClient<B>,
        registry: Arc<BoundaryRegistry>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            chunker: Chunker::new(config.chunker, registry),
            scan: config.scan,
            parallelism: config.parallelism.max(1),
        }
    }

    #[must_use]
    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    #[must_use]
    pub fn scan_options(&self) -> &ScanOptions {
        &self.scan
    }

    /// Collection that `root` is stored in.
    #[must_use]
    pub fn collection_for(root: &Path) -> String {
        collection_name(root)
    }

    /// Full pass over `root` with file-level and chunk-level change detection.
    /// `force` re-embeds every file regardless of its recorded hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be resolved, the index fails, or any
    /// embedding call fails. Files finished before the failure stay recorded.
    pub async fn index_repository(&self, root: &Path, force: bool) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let root = tokio::fs::canonicalize(root).await?;
        let collection = collection_name(&root);
        let root_str = root.to_string_lossy().into_owned();
        let mut report = IndexReport::default();

        let scanner = Scanner::new(root.clone(), self.scan.clone());
        let scanned = tokio::task::spawn_blocking(move || scanner.files().collect::<Vec<_>>()).await?;

        let records: HashMap<String, FileRecord> = self
            .index
            .file_records(&collection)
            .await?
            .into_iter()
            .map(|r| (r.path.clone(), r))
            .collect();

        let mut present: HashSet<String> = HashSet::new();
        let mut pending: Vec<SourceFile> = Vec::new();
        for item in scanned {
            report.files_scanned += 1;
            match item {
                Ok(file) => {
                    present.insert(file.path.clone());
                    let unchanged = records
                        .get(&file.path)
                        .is_some_and(|r| r.content_hash == file.content_hash);
                    if unchanged && !force {
                        report.files_unchanged += 1;
                    } else {
                        pending.push(file);
                    }
                }
                Err(skipped) => {
                    report
                        .errors
                        .push(format!("{}: {}", skipped.path, skipped.reason));
                }
            }
        }

        let total = pending.len();
        tracing::info!(total, unchanged = report.files_unchanged, "indexing started");

        if !pending.is_empty() {
            self.ensure_collection(&collection, &root_str).await?;
        }

        let mut outcomes = stream::iter(pending.into_iter().enumerate())
            .map(|(i, file)| {
                let collection = collection.as_str();
                async move {
                    let outcome = self.index_file(collection, &file, force).await?;
                    tracing::info!(
                        file = %file.path,
                        progress = format_args!("{}/{total}", i + 1),
                        created = outcome.embedded,
                        skipped = outcome.reused,
                    );
                    Ok::<_, IndexError>(outcome)
                }
            })
            .buffer_unordered(self.parallelism);

        while let Some(outcome) = outcomes.try_next().await? {
            report.files_indexed += 1;
            report.chunks_embedded += outcome.embedded;
            report.chunks_reused += outcome.reused;
            report.chunks_removed += outcome.removed;
        }
        drop(outcomes);

        for old_file in records.keys().filter(|p| !present.contains(*p)) {
            match self.remove_file(&collection, old_file).await {
                Ok(n) => {
                    report.files_removed += 1;
                    report.chunks_removed += n;
                }
                Err(e) => report.errors.push(format!("cleanup {old_file}: {e}")),
            }
        }

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            indexed = report.files_indexed,
            removed = report.files_removed,
            embedded = report.chunks_embedded,
            reused = report.chunks_reused,
            duration_ms = report.duration_ms,
            "indexing finished"
        );
        Ok(report)
    }

    /// Bring one file in line with the index. A file that no longer exists is
    /// removed. Ignored paths and paths outside `root` are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the index or embedding call fails.
    pub async fn reindex_file(&self, root: &Path, abs_path: &Path) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let root: PathBuf = tokio::fs::canonicalize(root).await?;
        let collection = collection_name(&root);
        let mut report = IndexReport::default();

        let scanner = Scanner::new(root.clone(), self.scan.clone());
        let Some(rel_path) = relative_path(&root, abs_path) else {
            return Ok(report);
        };
        if scanner.is_ignored(abs_path) {
            return Ok(report);
        }

        if !tokio::fs::try_exists(abs_path).await? {
            let removed = self.remove_file(&collection, &rel_path).await?;
            if removed > 0 {
                report.files_removed = 1;
                report.chunks_removed = removed;
                tracing::debug!(file = %rel_path, removed, "file removed from index");
            }
            // A vanished directory is reported by its own path only.
            let (files, chunks) = self.remove_dir(&collection, &rel_path).await?;
            if files > 0 {
                report.files_removed += files;
                report.chunks_removed += chunks;
                tracing::debug!(dir = %rel_path, files, chunks, "directory removed from index");
            }
            return Ok(report);
        }

        let abs = abs_path.to_path_buf();
        let read = tokio::task::spawn_blocking(move || scanner.read_file(&abs)).await?;
        report.files_scanned = 1;
        let file = match read {
            Ok(file) => file,
            Err(skipped) => {
                report
                    .errors
                    .push(format!("{}: {}", skipped.path, skipped.reason));
                return Ok(report);
            }
        };

        let unchanged = self
            .index
            .file_records(&collection)
            .await?
            .iter()
            .any(|r| r.path == file.path && r.content_hash == file.content_hash);
        if unchanged {
            report.files_unchanged = 1;
            return Ok(report);
        }

        self.ensure_collection(&collection, &root.to_string_lossy())
            .await?;
        let outcome = self.index_file(&collection, &file, false).await?;
        report.files_indexed = 1;
        report.chunks_embedded = outcome.embedded;
        report.chunks_reused = outcome.reused;
        report.chunks_removed = outcome.removed;
        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::debug!(file = %file.path, created = outcome.embedded, skipped = outcome.reused, "reindexed");
        Ok(report)
    }

    /// Create the collection on first use. Its dimension comes from a probe
    /// embedding so empty files can be recorded before any chunk is stored.
    async fn ensure_collection(&self, collection: &str, root: &str) -> Result<()> {
        if self.index.dimensions(collection).await?.is_some() {
            return Ok(());
        }
        let probe = self.embedder.embed_query("probe").await?;
        self.index
            .ensure_collection(collection, root, probe.len())
            .await
    }

    async fn index_file(&self, collection: &str, file: &SourceFile, force: bool) -> Result<FileOutcome> {
        let chunks = self.chunker.chunk(file);

        let existing = if force {
            HashMap::new()
        } else {
            self.index.chunk_hashes(collection, &file.path).await?
        };

        let ids: HashSet<String> = chunks.iter().map(CodeChunk::id).collect();
        let (reused, to_embed): (Vec<&CodeChunk>, Vec<&CodeChunk>) = chunks
            .iter()
            .partition(|c| existing.get(&c.id()).is_some_and(|h| *h == c.content_hash));
        let stale: Vec<String> = existing
            .keys()
            .filter(|id| !ids.contains(*id))
            .cloned()
            .collect();

        let to_embed: Vec<CodeChunk> = to_embed.into_iter().cloned().collect();
        // Embed before touching the index so a failure leaves the old state intact.
        let vectors = self.embedder.embed_chunks(&to_embed).await?;

        let removed = if force {
            self.index
                .delete(collection, DeleteScope::File(file.path.clone()))
                .await?;
            0
        } else {
            self.index.delete_ids(collection, stale).await?
        };

        let embedded = to_embed.len();
        let entries: Vec<IndexEntry> = to_embed
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry::new(chunk, vector))
            .collect();
        if !entries.is_empty() {
            self.index.upsert(collection, entries).await?;
        }

        self.index
            .record_file(
                collection,
                FileRecord {
                    path: file.path.clone(),
                    content_hash: file.content_hash.clone(),
                    language: file.language,
                    size: file.size,
                    chunk_count: chunks.len(),
                },
            )
            .await?;

        if embedded > 0 {
            tracing::debug!("{}: {embedded} chunks embedded, {} reused", file.path, reused.len());
        }

        Ok(FileOutcome {
            embedded,
            reused: reused.len(),
            removed,
        })
    }

    async fn remove_file(&self, collection: &str, path: &str) -> Result<usize> {
        let removed = self
            .index
            .delete(collection, DeleteScope::File(path.to_owned()))
            .await?;
        self.index.remove_file_record(collection, path).await?;
        Ok(removed)
    }

    /// Drop every file recorded under `dir`. Returns (files, chunks) removed.
    async fn remove_dir(&self, collection: &str, dir: &str) -> Result<(usize, usize)> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let records: Vec<FileRecord> = self
            .index
            .file_records(collection)
            .await?
            .into_iter()
            .filter(|r| r.path.starts_with(&prefix))
            .collect();
        if records.is_empty() {
            return Ok((0, 0));
        }
        let chunks = self
            .index
            .delete(collection, DeleteScope::PathPrefix(prefix))
            .await?;
        for record in &records {
            self.index.remove_file_record(collection, &record.path).await?;
        }
        Ok((records.len(), chunks))
    }
}

#[cfg(test)]
mod tests {
    use coderag_llm::mock::HashEmbedder;

    use super::*;
    use crate::store::{InMemoryIndex, SearchFilter};

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }

    fn indexer(backend: &Arc<HashEmbedder>) -> Indexer<HashEmbedder> {
        Indexer::new(
            Arc::new(InMemoryIndex::new()),
            EmbeddingClient::new(Arc::clone(backend)),
            Arc::new(BoundaryRegistry::regex_only()),
            IndexerConfig::default(),
        )
    }

    #[test]
    fn index_report_defaults() {
        let report = IndexReport::default();
        assert_eq!(report.files_scanned, 0);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn default_parallelism() {
        assert_eq!(IndexerConfig::default().parallelism, DEFAULT_PARALLELISM);
    }

    #[tokio::test]
    async fn first_run_indexes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def a():\n    return 1\n");
        write(dir.path(), "lib/b.rs", "fn b() -> u8 {\n    2\n}\n");
        let backend = Arc::new(HashEmbedder::new(32));
        let idx = indexer(&backend);

        let report = idx.index_repository(dir.path(), false).await.unwrap();
        assert_eq!(report.files_scanned, 2);
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.chunks_embedded, 2);

        let collection = Indexer::<HashEmbedder>::collection_for(dir.path());
        let records = idx.index().file_records(&collection).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, "a.py");
    }

    #[tokio::test]
    async fn unchanged_repository_makes_no_embedding_calls() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def a():\n    return 1\n");
        let backend = Arc::new(HashEmbedder::new(16));
        let idx = indexer(&backend);

        idx.index_repository(dir.path(), false).await.unwrap();
        let before = backend.calls();
        let report = idx.index_repository(dir.path(), false).await.unwrap();
        assert_eq!(backend.calls(), before);
        assert_eq!(report.files_unchanged, 1);
        assert_eq!(report.files_indexed, 0);
    }

    #[tokio::test]
    async fn edited_file_reuses_untouched_chunks() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "m.py", "def a():\n    return 1\n\ndef b():\n    return 2\n");
        let backend = Arc::new(HashEmbedder::new(16));
        let idx = indexer(&backend);
        idx.index_repository(dir.path(), false).await.unwrap();

        write(dir.path(), "m.py", "def a():\n    return 1\n\ndef b():\n    return 3\n");
        let report = idx.index_repository(dir.path(), false).await.unwrap();
        assert_eq!(report.chunks_reused, 1);
        assert_eq!(report.chunks_embedded, 1);
    }

    #[tokio::test]
    async fn deleted_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def a():\n    return 1\n");
        write(dir.path(), "b.py", "def b():\n    return 2\n");
        let backend = Arc::new(HashEmbedder::new(16));
        let idx = indexer(&backend);
        idx.index_repository(dir.path(), false).await.unwrap();

        std::fs::remove_file(dir.path().join("b.py")).unwrap();
        let report = idx.index_repository(dir.path(), false).await.unwrap();
        assert_eq!(report.files_removed, 1);
        assert_eq!(report.chunks_removed, 1);

        let collection = Indexer::<HashEmbedder>::collection_for(dir.path());
        let hits = idx
            .index()
            .query(&collection, backend.vector_for("b"), 10, SearchFilter::default())
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.chunk.file_path != "b.py"));
    }

    #[tokio::test]
    async fn embedding_failure_aborts_and_leaves_file_unrecorded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def a():\n    return 1\n");
        let backend = Arc::new(HashEmbedder::new(16));
        let idx = indexer(&backend);
        idx.index_repository(dir.path(), false).await.unwrap();

        write(dir.path(), "a.py", "def a():\n    return 42\n");
        backend.set_failing(true);
        assert!(idx.index_repository(dir.path(), false).await.is_err());

        backend.set_failing(false);
        let report = idx.index_repository(dir.path(), false).await.unwrap();
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.chunks_embedded, 1);
    }

    #[tokio::test]
    async fn force_reembeds_unchanged_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def a():\n    return 1\n");
        let backend = Arc::new(HashEmbedder::new(16));
        let idx = indexer(&backend);
        idx.index_repository(dir.path(), false).await.unwrap();

        let report = idx.index_repository(dir.path(), true).await.unwrap();
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.chunks_embedded, 1);
        assert_eq!(report.chunks_reused, 0);
    }

    #[tokio::test]
    async fn binary_file_is_reported_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def a():\n    return 1\n");
        std::fs::write(dir.path().join("blob.dat"), [0u8, 1, 2, 3]).unwrap();
        let backend = Arc::new(HashEmbedder::new(16));
        let report = indexer(&backend)
            .index_repository(dir.path(), false)
            .await
            .unwrap();
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("blob.dat"));
    }

    #[tokio::test]
    async fn reindex_missing_file_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def a():\n    return 1\n");
        let backend = Arc::new(HashEmbedder::new(16));
        let idx = indexer(&backend);
        idx.index_repository(dir.path(), false).await.unwrap();

        let root = dir.path().canonicalize().unwrap();
        std::fs::remove_file(root.join("a.py")).unwrap();
        let report = idx.reindex_file(&root, &root.join("a.py")).await.unwrap();
        assert_eq!(report.files_removed, 1);
        let collection = Indexer::<HashEmbedder>::collection_for(&root);
        assert!(idx.index().file_records(&collection).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reindex_removed_directory_drops_its_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "pkg/a.py", "def a():\n    return 1\n");
        write(dir.path(), "pkg/b.py", "def b():\n    return 2\n");
        write(dir.path(), "pkgx/c.py", "def c():\n    return 3\n");
        let backend = Arc::new(HashEmbedder::new(16));
        let idx = indexer(&backend);
        idx.index_repository(dir.path(), false).await.unwrap();

        let root = dir.path().canonicalize().unwrap();
        std::fs::remove_dir_all(root.join("pkg")).unwrap();
        let report = idx.reindex_file(&root, &root.join("pkg")).await.unwrap();
        assert_eq!(report.files_removed, 2);
        assert_eq!(report.chunks_removed, 2);

        let collection = Indexer::<HashEmbedder>::collection_for(&root);
        let records = idx.index().file_records(&collection).await.unwrap();
        let paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["pkgx/c.py"]);
        let hits = idx
            .index()
            .query(&collection, backend.vector_for("def"), 10, SearchFilter::default())
            .await
            .unwrap();
        assert!(hits.iter().all(|h| h.chunk.file_path == "pkgx/c.py"));
    }

    #[tokio::test]
    async fn reindex_changed_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def a():\n    return 1\n");
        let backend = Arc::new(HashEmbedder::new(16));
        let idx = indexer(&backend);
        let root = dir.path().canonicalize().unwrap();

        let first = idx.reindex_file(&root, &root.join("a.py")).await.unwrap();
        assert_eq!(first.chunks_embedded, 1);
        let again = idx.reindex_file(&root, &root.join("a.py")).await.unwrap();
        assert_eq!(again.files_unchanged, 1);
    }

    #[tokio::test]
    async fn reindex_ignored_path_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "node_modules/x.js", "function x() {}\n");
        let backend = Arc::new(HashEmbedder::new(16));
        let idx = indexer(&backend);
        let root = dir.path().canonicalize().unwrap();
        let report = idx
            .reindex_file(&root, &root.join("node_modules/x.js"))
            .await
            .unwrap();
        assert_eq!(report, IndexReport::default());
        assert_eq!(backend.calls(), 0);
    }
}
