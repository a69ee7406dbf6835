use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use super::{
    BoxFuture, CollectionInfo, DeleteScope, FileRecord, IndexEntry, ScoredChunk, SearchFilter,
    UpsertStats, VectorIndex, check_dimensions, check_query_dimensions, cosine_similarity,
    rank,
};
use crate::error::{IndexError, Result};

struct StoredEntry {
    seq: u64,
    entry: IndexEntry,
}

struct Collection {
    root: String,
    dimensions: usize,
    entries: HashMap<String, StoredEntry>,
    files: BTreeMap<String, FileRecord>,
}

#[derive(Default)]
struct Inner {
    collections: BTreeMap<String, Collection>,
    next_seq: u64,
}

/// Process-local index for tests and throwaway sessions.
#[derive(Default)]
pub struct InMemoryIndex {
    inner: RwLock<Inner>,
}

impl InMemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for InMemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIndex").finish_non_exhaustive()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> IndexError {
    IndexError::Other(format!("index lock poisoned: {e}"))
}

impl VectorIndex for InMemoryIndex {
    fn ensure_collection(
        &self,
        collection: &str,
        root: &str,
        dimensions: usize,
    ) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_owned();
        let root = root.to_owned();
        Box::pin(async move {
            let mut inner = self.inner.write().map_err(poisoned)?;
            if let Some(existing) = inner.collections.get(&collection) {
                if existing.dimensions != dimensions {
                    return Err(IndexError::DimensionMismatch {
                        collection,
                        expected: existing.dimensions,
                        actual: dimensions,
                    });
                }
                return Ok(());
            }
            inner.collections.insert(
                collection,
                Collection {
                    root,
                    dimensions,
                    entries: HashMap::new(),
                    files: BTreeMap::new(),
                },
            );
            Ok(())
        })
    }

    fn dimensions(&self, collection: &str) -> BoxFuture<'_, Result<Option<usize>>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let inner = self.inner.read().map_err(poisoned)?;
            Ok(inner.collections.get(&collection).map(|c| c.dimensions))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        entries: Vec<IndexEntry>,
    ) -> BoxFuture<'_, Result<UpsertStats>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut guard = self.inner.write().map_err(poisoned)?;
            let inner = &mut *guard;
            let col = inner
                .collections
                .get_mut(&collection)
                .ok_or_else(|| IndexError::UnknownCollection(collection.clone()))?;
            check_dimensions(&collection, col.dimensions, &entries)?;

            let mut stats = UpsertStats::default();
            for entry in entries {
                match col.entries.get_mut(&entry.id) {
                    Some(stored) if stored.entry.chunk.content_hash == entry.chunk.content_hash => {
                        stats.unchanged += 1;
                    }
                    Some(stored) => {
                        stored.entry = entry;
                        stats.replaced += 1;
                    }
                    None => {
                        let seq = inner.next_seq;
                        inner.next_seq += 1;
                        col.entries.insert(entry.id.clone(), StoredEntry { seq, entry });
                        stats.inserted += 1;
                    }
                }
            }
            Ok(stats)
        })
    }

    fn delete(&self, collection: &str, scope: DeleteScope) -> BoxFuture<'_, Result<usize>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut inner = self.inner.write().map_err(poisoned)?;
            let Some(col) = inner.collections.get_mut(&collection) else {
                return Ok(0);
            };
            let before = col.entries.len();
            col.entries
                .retain(|_, stored| !scope.matches(&stored.entry.chunk.file_path));
            Ok(before - col.entries.len())
        })
    }

    fn delete_ids(&self, collection: &str, ids: Vec<String>) -> BoxFuture<'_, Result<usize>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut inner = self.inner.write().map_err(poisoned)?;
            let Some(col) = inner.collections.get_mut(&collection) else {
                return Ok(0);
            };
            Ok(ids
                .iter()
                .filter(|id| col.entries.remove(id.as_str()).is_some())
                .count())
        })
    }

    fn query(
        &self,
        collection: &str,
        vector: Vec<f32>,
        k: usize,
        filter: SearchFilter,
    ) -> BoxFuture<'_, Result<Vec<ScoredChunk>>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let inner = self.inner.read().map_err(poisoned)?;
            let Some(col) = inner.collections.get(&collection) else {
                return Ok(Vec::new());
            };
            check_query_dimensions(&collection, col.dimensions, &vector)?;
            let scored = col
                .entries
                .values()
                .filter(|stored| filter.matches(&stored.entry.chunk))
                .map(|stored| {
                    (
                        stored.seq,
                        ScoredChunk {
                            id: stored.entry.id.clone(),
                            chunk: stored.entry.chunk.clone(),
                            score: cosine_similarity(&vector, &stored.entry.vector),
                        },
                    )
                })
                .collect();
            Ok(rank(scored, k))
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<CollectionInfo>>> {
        Box::pin(async move {
            let inner = self.inner.read().map_err(poisoned)?;
            Ok(inner
                .collections
                .iter()
                .map(|(name, col)| CollectionInfo {
                    name: name.clone(),
                    root: col.root.clone(),
                    dimensions: col.dimensions,
                    files: col.files.values().cloned().collect(),
                })
                .collect())
        })
    }

    fn record_file(&self, collection: &str, record: FileRecord) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut inner = self.inner.write().map_err(poisoned)?;
            let col = inner
                .collections
                .get_mut(&collection)
                .ok_or(IndexError::UnknownCollection(collection))?;
            col.files.insert(record.path.clone(), record);
            Ok(())
        })
    }

    fn remove_file_record(&self, collection: &str, path: &str) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_owned();
        let path = path.to_owned();
        Box::pin(async move {
            let mut inner = self.inner.write().map_err(poisoned)?;
            if let Some(col) = inner.collections.get_mut(&collection) {
                col.files.remove(&path);
            }
            Ok(())
        })
    }

    fn file_records(&self, collection: &str) -> BoxFuture<'_, Result<Vec<FileRecord>>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let inner = self.inner.read().map_err(poisoned)?;
            Ok(inner
                .collections
                .get(&collection)
                .map(|c| c.files.values().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn chunk_hashes(
        &self,
        collection: &str,
        path: &str,
    ) -> BoxFuture<'_, Result<HashMap<String, String>>> {
        let collection = collection.to_owned();
        let path = path.to_owned();
        Box::pin(async move {
            let inner = self.inner.read().map_err(poisoned)?;
            Ok(inner
                .collections
                .get(&collection)
                .map(|c| {
                    c.entries
                        .values()
                        .filter(|s| s.entry.chunk.file_path == path)
                        .map(|s| (s.entry.id.clone(), s.entry.chunk.content_hash.clone()))
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn drop_collection(&self, collection: &str) -> BoxFuture<'_, Result<bool>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut inner = self.inner.write().map_err(poisoned)?;
            Ok(inner.collections.remove(&collection).is_some())
        })
    }
}
