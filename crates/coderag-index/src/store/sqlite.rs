use std::collections::HashMap;
use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::Mutex;

use super::{
    BoxFuture, CollectionInfo, DeleteScope, FileRecord, IndexEntry, ScoredChunk, SearchFilter,
    UpsertStats, VectorIndex, check_dimensions, check_query_dimensions, cosine_similarity,
    rank,
};
use crate::chunker::{ChunkKind, CodeChunk};
use crate::error::{IndexError, Result};
use crate::languages::Lang;

type EntryRow = (
    i64,
    String,
    String,
    Option<String>,
    String,
    i64,
    i64,
    i64,
    i64,
    Option<String>,
    String,
    String,
    Vec<u8>,
);

type FileRow = (String, String, Option<String>, i64, i64);

/// Durable index in a single `SQLite` file. Vectors are little-endian `f32`
/// blobs ranked by brute-force cosine. Writes are serialized by one mutex.
pub struct SqliteIndex {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex").finish_non_exhaustive()
    }
}

impl SqliteIndex {
    /// Open (or create) the database at `path` and run migrations.
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn open(path: &str) -> Result<Self> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // Every in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(opts)
            .await?;

        sqlx::migrate!().run(&pool).await?;

        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn collection_dimensions(&self, collection: &str) -> Result<Option<usize>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT dimensions FROM collections WHERE name = ?")
            .bind(collection)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(d,)| usize::try_from(d).map_err(IndexError::from))
            .transpose()
    }

    async fn load_file_records(&self, collection: &str) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(
            "SELECT path, content_hash, language, size, chunk_count FROM files \
             WHERE collection = ? ORDER BY path",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(file_from_row).collect()
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn file_from_row((path, content_hash, language, size, chunk_count): FileRow) -> Result<FileRecord> {
    Ok(FileRecord {
        path,
        content_hash,
        language: language.as_deref().and_then(Lang::from_id),
        size: u64::try_from(size)?,
        chunk_count: usize::try_from(chunk_count)?,
    })
}

fn chunk_from_row(row: EntryRow) -> Result<(u64, String, CodeChunk, Vec<f32>)> {
    let (seq, id, file_path, language, kind, start, end, line_start, line_end, name, content, hash, vector) =
        row;
    let kind = ChunkKind::parse(&kind)
        .ok_or_else(|| IndexError::Other(format!("unknown chunk kind in index: {kind}")))?;
    let chunk = CodeChunk {
        file_path,
        language: language.as_deref().and_then(Lang::from_id),
        kind,
        start: usize::try_from(start)?,
        end: usize::try_from(end)?,
        line_range: (usize::try_from(line_start)?, usize::try_from(line_end)?),
        name,
        text: content,
        content_hash: hash,
    };
    Ok((u64::try_from(seq)?, id, chunk, decode_vector(&vector)))
}

impl VectorIndex for SqliteIndex {
    fn ensure_collection(
        &self,
        collection: &str,
        root: &str,
        dimensions: usize,
    ) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_owned();
        let root = root.to_owned();
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            if let Some(existing) = self.collection_dimensions(&collection).await? {
                if existing != dimensions {
                    return Err(IndexError::DimensionMismatch {
                        collection,
                        expected: existing,
                        actual: dimensions,
                    });
                }
                return Ok(());
            }
            sqlx::query("INSERT INTO collections (name, root, dimensions) VALUES (?, ?, ?)")
                .bind(&collection)
                .bind(&root)
                .bind(i64::try_from(dimensions)?)
                .execute(&self.pool)
                .await?;
            tracing::debug!(collection, dimensions, "collection created");
            Ok(())
        })
    }

    fn dimensions(&self, collection: &str) -> BoxFuture<'_, Result<Option<usize>>> {
        let collection = collection.to_owned();
        Box::pin(async move { self.collection_dimensions(&collection).await })
    }

    fn upsert(
        &self,
        collection: &str,
        entries: Vec<IndexEntry>,
    ) -> BoxFuture<'_, Result<UpsertStats>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let dimensions = self
                .collection_dimensions(&collection)
                .await?
                .ok_or_else(|| IndexError::UnknownCollection(collection.clone()))?;
            check_dimensions(&collection, dimensions, &entries)?;

            let mut stats = UpsertStats::default();
            let mut tx = self.pool.begin().await?;
            for entry in &entries {
                let existing: Option<(String,)> = sqlx::query_as(
                    "SELECT content_hash FROM entries WHERE collection = ? AND id = ?",
                )
                .bind(&collection)
                .bind(&entry.id)
                .fetch_optional(&mut *tx)
                .await?;

                let chunk = &entry.chunk;
                let blob = encode_vector(&entry.vector);
                match existing {
                    Some((hash,)) if hash == chunk.content_hash => {
                        stats.unchanged += 1;
                    }
                    Some(_) => {
                        sqlx::query(
                            "UPDATE entries SET file_path = ?, language = ?, kind = ?, \
                             start_offset = ?, end_offset = ?, line_start = ?, line_end = ?, \
                             name = ?, content = ?, content_hash = ?, vector = ? \
                             WHERE collection = ? AND id = ?",
                        )
                        .bind(&chunk.file_path)
                        .bind(chunk.language.map(Lang::id))
                        .bind(chunk.kind.as_str())
                        .bind(i64::try_from(chunk.start)?)
                        .bind(i64::try_from(chunk.end)?)
                        .bind(i64::try_from(chunk.line_range.0)?)
                        .bind(i64::try_from(chunk.line_range.1)?)
                        .bind(chunk.name.as_deref())
                        .bind(&chunk.text)
                        .bind(&chunk.content_hash)
                        .bind(blob)
                        .bind(&collection)
                        .bind(&entry.id)
                        .execute(&mut *tx)
                        .await?;
                        stats.replaced += 1;
                    }
                    None => {
                        sqlx::query(
                            "INSERT INTO entries \
                             (collection, id, file_path, language, kind, start_offset, end_offset, \
                              line_start, line_end, name, content, content_hash, vector) \
                             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        )
                        .bind(&collection)
                        .bind(&entry.id)
                        .bind(&chunk.file_path)
                        .bind(chunk.language.map(Lang::id))
                        .bind(chunk.kind.as_str())
                        .bind(i64::try_from(chunk.start)?)
                        .bind(i64::try_from(chunk.end)?)
                        .bind(i64::try_from(chunk.line_range.0)?)
                        .bind(i64::try_from(chunk.line_range.1)?)
                        .bind(chunk.name.as_deref())
                        .bind(&chunk.text)
                        .bind(&chunk.content_hash)
                        .bind(blob)
                        .execute(&mut *tx)
                        .await?;
                        stats.inserted += 1;
                    }
                }
            }
            tx.commit().await?;
            Ok(stats)
        })
    }

    fn delete(&self, collection: &str, scope: DeleteScope) -> BoxFuture<'_, Result<usize>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let result = match &scope {
                DeleteScope::File(path) => {
                    sqlx::query("DELETE FROM entries WHERE collection = ? AND file_path = ?")
                        .bind(&collection)
                        .bind(path)
                        .execute(&self.pool)
                        .await?
                }
                DeleteScope::PathPrefix(prefix) => {
                    sqlx::query(
                        "DELETE FROM entries WHERE collection = ? \
                         AND substr(file_path, 1, length(?)) = ?",
                    )
                    .bind(&collection)
                    .bind(prefix)
                    .bind(prefix)
                    .execute(&self.pool)
                    .await?
                }
            };
            Ok(usize::try_from(result.rows_affected())?)
        })
    }

    fn delete_ids(&self, collection: &str, ids: Vec<String>) -> BoxFuture<'_, Result<usize>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(0);
            }
            let _guard = self.write_lock.lock().await;
            let mut tx = self.pool.begin().await?;
            let mut removed = 0u64;
            for id in &ids {
                removed += sqlx::query("DELETE FROM entries WHERE collection = ? AND id = ?")
                    .bind(&collection)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }
            tx.commit().await?;
            Ok(usize::try_from(removed)?)
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
            let Some(dimensions) = self.collection_dimensions(&collection).await? else {
                return Ok(Vec::new());
            };
            check_query_dimensions(&collection, dimensions, &vector)?;

            let language = filter.language.map(Lang::id);
            let kind = filter.kind.map(ChunkKind::as_str);
            let rows: Vec<EntryRow> = sqlx::query_as(
                "SELECT seq, id, file_path, language, kind, start_offset, end_offset, \
                 line_start, line_end, name, content, content_hash, vector \
                 FROM entries WHERE collection = ?1 \
                 AND (?2 IS NULL OR language = ?2) AND (?3 IS NULL OR kind = ?3)",
            )
            .bind(&collection)
            .bind(language)
            .bind(kind)
            .fetch_all(&self.pool)
            .await?;

            let mut scored = Vec::with_capacity(rows.len());
            for row in rows {
                let (seq, id, chunk, stored) = chunk_from_row(row)?;
                if !filter.matches(&chunk) {
                    continue;
                }
                let score = cosine_similarity(&vector, &stored);
                scored.push((seq, ScoredChunk { id, chunk, score }));
            }
            Ok(rank(scored, k))
        })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<CollectionInfo>>> {
        Box::pin(async move {
            let rows: Vec<(String, String, i64)> =
                sqlx::query_as("SELECT name, root, dimensions FROM collections ORDER BY name")
                    .fetch_all(&self.pool)
                    .await?;
            let mut out = Vec::with_capacity(rows.len());
            for (name, root, dimensions) in rows {
                let files = self.load_file_records(&name).await?;
                out.push(CollectionInfo {
                    name,
                    root,
                    dimensions: usize::try_from(dimensions)?,
                    files,
                });
            }
            Ok(out)
        })
    }

    fn record_file(&self, collection: &str, record: FileRecord) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            sqlx::query(
                "INSERT INTO files (collection, path, content_hash, language, size, chunk_count) \
                 VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(collection, path) DO UPDATE SET \
                 content_hash = excluded.content_hash, language = excluded.language, \
                 size = excluded.size, chunk_count = excluded.chunk_count, \
                 indexed_at = datetime('now')",
            )
            .bind(&collection)
            .bind(&record.path)
            .bind(&record.content_hash)
            .bind(record.language.map(Lang::id))
            .bind(i64::try_from(record.size)?)
            .bind(i64::try_from(record.chunk_count)?)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn remove_file_record(&self, collection: &str, path: &str) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_owned();
        let path = path.to_owned();
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            sqlx::query("DELETE FROM files WHERE collection = ? AND path = ?")
                .bind(&collection)
                .bind(&path)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn file_records(&self, collection: &str) -> BoxFuture<'_, Result<Vec<FileRecord>>> {
        let collection = collection.to_owned();
        Box::pin(async move { self.load_file_records(&collection).await })
    }

    fn chunk_hashes(
        &self,
        collection: &str,
        path: &str,
    ) -> BoxFuture<'_, Result<HashMap<String, String>>> {
        let collection = collection.to_owned();
        let path = path.to_owned();
        Box::pin(async move {
            let rows: Vec<(String, String)> = sqlx::query_as(
                "SELECT id, content_hash FROM entries WHERE collection = ? AND file_path = ?",
            )
            .bind(&collection)
            .bind(&path)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().collect())
        })
    }

    fn drop_collection(&self, collection: &str) -> BoxFuture<'_, Result<bool>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM entries WHERE collection = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM files WHERE collection = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await?;
            let removed = sqlx::query("DELETE FROM collections WHERE name = ?")
                .bind(&collection)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            tx.commit().await?;
            Ok(removed > 0)
        })
    }
}
