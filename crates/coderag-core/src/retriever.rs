//! Semantic retrieval with score filtering, deduplication and budget packing.

use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use coderag_index::embedding::EmbeddingClient;
use coderag_index::{ScoredChunk, SearchFilter, VectorIndex};
use coderag_llm::EmbeddingBackend;

use crate::cache::QueryCache;
use crate::error::StageError;
use crate::query::ProcessedQuery;

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Minimum cosine similarity to accept.
    pub min_score: f32,
    /// Upper bound on the serialized context block, in bytes.
    pub max_context_chars: usize,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            min_score: 0.25,
            max_context_chars: 12_000,
            cache_capacity: 128,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Ranked chunks that made it into the context, highest score first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
    pub context: String,
}

impl RetrievalResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

pub struct ContextRetriever<B> {
    index: Arc<dyn VectorIndex>,
    embedder: EmbeddingClient<B>,
    config: RetrieverConfig,
    cache: QueryCache<RetrievalResult>,
}

impl<B: EmbeddingBackend> ContextRetriever<B> {
    #[must_use]
    pub fn new(index: Arc<dyn VectorIndex>, embedder: EmbeddingClient<B>, config: RetrieverConfig) -> Self {
        let cache = QueryCache::new(config.cache_capacity, config.cache_ttl);
        Self {
            index,
            embedder,
            config,
            cache,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache<RetrievalResult> {
        &self.cache
    }

    /// Forget cached results. Call after writing to the index.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Retrieve context for `query` from `collection`. `limit` overrides the
    /// intent's default result count.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] naming the embedding or index stage.
    pub async fn retrieve(
        &self,
        collection: &str,
        query: &ProcessedQuery,
        limit: Option<usize>,
        filter: &SearchFilter,
    ) -> Result<RetrievalResult, StageError> {
        if query.is_empty() {
            return Ok(RetrievalResult::default());
        }
        let k = limit.unwrap_or_else(|| query.intent.default_limit());
        if k == 0 {
            return Ok(RetrievalResult::default());
        }

        let k_str = k.to_string();
        let filter_key = filter.cache_key();
        let key = QueryCache::<RetrievalResult>::key(
            &query.rewritten,
            &[collection, query.intent.as_str(), &k_str, &filter_key],
        );
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(query = %query.rewritten, "retrieval cache hit");
            return Ok(hit);
        }

        let vector = self
            .embedder
            .embed_query(&query.rewritten)
            .await
            .map_err(|e| StageError::embedding(&e))?;

        // Twice the limit; dedupe below may drop some.
        let hits = self
            .index
            .query(collection, vector, k.saturating_mul(2), filter.clone())
            .await
            .map_err(|e| StageError::index(&e))?;

        let mut hits = dedupe(hits, self.config.min_score);
        hits.truncate(k);
        let result = pack(hits, self.config.max_context_chars);
        tracing::debug!(
            query = %query.rewritten,
            intent = %query.intent,
            chunks = result.chunks.len(),
            context_len = result.context.len(),
            "retrieved"
        );

        self.cache.insert(key, result.clone());
        Ok(result)
    }
}

/// Drop low scores and repeated entries, keeping the best-ranked copy.
fn dedupe(hits: Vec<ScoredChunk>, min_score: f32) -> Vec<ScoredChunk> {
    let mut ids = HashSet::new();
    let mut hashes = HashSet::new();
    hits.into_iter()
        .filter(|h| h.score >= min_score)
        .filter(|h| {
            let new_id = ids.insert(h.id.clone());
            let new_content = hashes.insert(h.chunk.content_hash.clone());
            new_id && new_content
        })
        .collect()
}

/// Serialize chunks in rank order until the next block would not fit.
fn pack(hits: Vec<ScoredChunk>, max_chars: usize) -> RetrievalResult {
    let mut context = String::new();
    let mut chunks = Vec::new();
    for hit in hits {
        let block = format_block(&hit);
        let sep = usize::from(!context.is_empty());
        if context.len() + sep + block.len() > max_chars {
            break;
        }
        if sep == 1 {
            context.push('\n');
        }
        context.push_str(&block);
        chunks.push(hit);
    }
    RetrievalResult { chunks, context }
}

/// One labeled block: header line, then the chunk in a fenced code block.
#[must_use]
pub fn format_block(hit: &ScoredChunk) -> String {
    let chunk = &hit.chunk;
    let language = chunk.language.map_or("unknown", |l| l.id());
    let fence = "`".repeat(longest_backtick_run(&chunk.text).max(2) + 1);
    let mut block = String::with_capacity(chunk.text.len() + 96);
    let _ = writeln!(
        block,
        "### File: {} ({language}, lines {}-{})",
        chunk.file_path, chunk.line_range.0, chunk.line_range.1
    );
    let _ = writeln!(block, "{fence}{}", chunk.language.map_or("", |l| l.id()));
    block.push_str(&chunk.text);
    if !chunk.text.ends_with('\n') {
        block.push('\n');
    }
    block.push_str(&fence);
    block.push('\n');
    block
}

fn longest_backtick_run(text: &str) -> usize {
    let mut longest = 0;
    let mut run = 0;
    for c in text.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    longest
}
