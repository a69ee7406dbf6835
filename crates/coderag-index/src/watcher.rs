use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use coderag_llm::EmbeddingBackend;
use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::indexer::{IndexReport, Indexer};
use crate::scanner::Scanner;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Sent after a watched path changed the index.
#[derive(Debug, Clone)]
pub struct Reindexed {
    pub path: PathBuf,
    pub report: IndexReport,
}

/// Keeps a collection in sync with edits under its root. Dropping the watcher
/// stops nothing by itself; abort it with [`IndexWatcher::stop`].
pub struct IndexWatcher {
    handle: tokio::task::JoinHandle<()>,
}

impl IndexWatcher {
    /// Every path that changes the index is reported on `events`; a closed
    /// receiver does not stop the watcher.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` does not exist or the filesystem watcher
    /// cannot be initialized.
    pub fn start<B: EmbeddingBackend + 'static>(
        root: &Path,
        indexer: Arc<Indexer<B>>,
        debounce: Duration,
        events: mpsc::Sender<Reindexed>,
    ) -> Result<Self> {
        let root = root.canonicalize()?;
        let scanner = Scanner::new(root.clone(), indexer.scan_options().clone());
        let (notify_tx, mut notify_rx) = mpsc::channel::<Vec<PathBuf>>(64);

        let mut debouncer = new_debouncer(
            debounce,
            move |events: std::result::Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                let events = match events {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("index watcher error: {e}");
                        return;
                    }
                };

                let paths: Vec<PathBuf> = events
                    .into_iter()
                    .filter(|e| e.kind == DebouncedEventKind::Any && !scanner.is_ignored(&e.path))
                    .map(|e| e.path)
                    .collect();

                if !paths.is_empty() {
                    let _ = notify_tx.blocking_send(paths);
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(&root, notify::RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "watching for changes");

        let handle = tokio::spawn(async move {
            let _debouncer = debouncer;
            while let Some(mut batch) = notify_rx.recv().await {
                while let Ok(more) = notify_rx.try_recv() {
                    batch.extend(more);
                }
                for path in coalesce_paths(batch) {
                    match indexer.reindex_file(&root, &path).await {
                        Ok(report) if report.files_indexed + report.files_removed > 0 => {
                            tracing::info!(
                                file = %path.display(),
                                created = report.chunks_embedded,
                                skipped = report.chunks_reused,
                                removed = report.chunks_removed,
                                "reindexed"
                            );
                            let _ = events.send(Reindexed { path, report }).await;
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(path = %path.display(), "reindex failed: {e}"),
                    }
                }
            }
        });

        Ok(Self { handle })
    }

    /// Stop watching.
    pub fn stop(self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Drop repeated paths, keeping first-seen order.
#[must_use]
pub fn coalesce_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::with_capacity(paths.len());
    paths.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

#[cfg(test)]
mod tests {
    use coderag_llm::mock::HashEmbedder;

    use super::*;
    use crate::boundary::BoundaryRegistry;
    use crate::embedding::EmbeddingClient;
    use crate::indexer::IndexerConfig;
    use crate::store::InMemoryIndex;

    fn create_test_indexer() -> Arc<Indexer<HashEmbedder>> {
        indexer_with(Arc::new(HashEmbedder::new(8)))
    }

    fn indexer_with(backend: Arc<HashEmbedder>) -> Arc<Indexer<HashEmbedder>> {
        Arc::new(Indexer::new(
            Arc::new(InMemoryIndex::new()),
            EmbeddingClient::new(backend),
            Arc::new(BoundaryRegistry::regex_only()),
            IndexerConfig::default(),
        ))
    }

    #[test]
    fn coalesce_keeps_first_occurrence() {
        let paths = vec![
            PathBuf::from("/r/a.py"),
            PathBuf::from("/r/b.py"),
            PathBuf::from("/r/a.py"),
            PathBuf::from("/r/b.py"),
            PathBuf::from("/r/c.py"),
        ];
        assert_eq!(
            coalesce_paths(paths),
            vec![
                PathBuf::from("/r/a.py"),
                PathBuf::from("/r/b.py"),
                PathBuf::from("/r/c.py"),
            ]
        );
    }

    #[tokio::test]
    async fn start_with_valid_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(4);
        let watcher =
            IndexWatcher::start(dir.path(), create_test_indexer(), DEFAULT_DEBOUNCE, tx).unwrap();
        assert!(watcher.is_running());
        watcher.stop();
    }

    #[tokio::test]
    async fn start_with_nonexistent_directory_fails() {
        let result = IndexWatcher::start(
            Path::new("/nonexistent/path/xyz"),
            create_test_indexer(),
            DEFAULT_DEBOUNCE,
            mpsc::channel(4).0,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rapid_writes_collapse_into_one_reindex() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "def a():\n    return 0\n").unwrap();
        let backend = Arc::new(HashEmbedder::new(8));
        let indexer = indexer_with(Arc::clone(&backend));
        indexer.index_repository(dir.path(), false).await.unwrap();
        let before = backend.calls();

        let (tx, mut rx) = mpsc::channel(16);
        let watcher =
            IndexWatcher::start(dir.path(), indexer, Duration::from_millis(100), tx).unwrap();
        for i in 1..=5 {
            std::fs::write(&file, format!("def a():\n    return {i}\n")).unwrap();
        }

        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no reindex event")
            .unwrap();
        assert!(event.path.ends_with("a.py"));
        assert_eq!(event.report.files_indexed, 1);

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(backend.calls(), before + 1);
        watcher.stop();
    }
}
