//! Batched embedding with contextual prefixes and response validation.

use std::sync::Arc;
use std::time::Duration;

use coderag_llm::{EmbeddingBackend, LlmError, timeout::bounded};

use crate::chunker::CodeChunk;

pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(60);

/// Text sent to the embedder for a chunk: a one-line location header, then the code.
#[must_use]
pub fn contextualize_for_embedding(chunk: &CodeChunk) -> String {
    let language = chunk.language.map_or("unknown", |l| l.id());
    let mut text = String::with_capacity(chunk.text.len() + chunk.file_path.len() + 32);
    text.push_str("file: ");
    text.push_str(&chunk.file_path);
    text.push_str(", language: ");
    text.push_str(language);
    text.push('\n');
    text.push_str(&chunk.text);
    text
}

#[derive(Debug, Clone)]
pub struct EmbeddingClient<B> {
    backend: Arc<B>,
    batch_size: usize,
    prefix_context: bool,
    timeout: Duration,
}

impl<B: EmbeddingBackend> EmbeddingClient<B> {
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            batch_size: DEFAULT_BATCH_SIZE,
            prefix_context: true,
            timeout: DEFAULT_EMBED_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_prefix_context(mut self, prefix: bool) -> Self {
        self.prefix_context = prefix;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// One vector per chunk, in chunk order. Any failing batch fails the call.
    ///
    /// # Errors
    ///
    /// Returns the backend error, a timeout, or `MalformedResponse` when the
    /// backend returns the wrong number of vectors or inconsistent dimensions.
    pub async fn embed_chunks(&self, chunks: &[CodeChunk]) -> Result<Vec<Vec<f32>>, LlmError> {
        let texts: Vec<String> = chunks
            .iter()
            .map(|c| {
                if self.prefix_context {
                    contextualize_for_embedding(c)
                } else {
                    c.text.clone()
                }
            })
            .collect();
        self.embed_texts(&texts).await
    }

    /// # Errors
    ///
    /// Same failure modes as [`Self::embed_chunks`].
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let mut vectors = Vec::with_capacity(texts.len());
        let mut dimension: Option<usize> = None;

        for batch in texts.chunks(self.batch_size) {
            let out = bounded("embedding", self.timeout, self.backend.embed_batch(batch)).await?;
            validate_batch(batch.len(), &out, &mut dimension)?;
            vectors.extend(out);
        }
        tracing::debug!(texts = texts.len(), backend = self.backend.name(), "embedded");
        Ok(vectors)
    }

    /// Embed a query string as-is, without a location prefix.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::embed_chunks`].
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, LlmError> {
        let batch = [query.to_owned()];
        let mut out = bounded("embedding", self.timeout, self.backend.embed_batch(&batch)).await?;
        let mut dimension = None;
        validate_batch(1, &out, &mut dimension)?;
        out.pop()
            .ok_or_else(|| LlmError::MalformedResponse("no vector for query".into()))
    }
}

fn validate_batch(
    expected: usize,
    vectors: &[Vec<f32>],
    dimension: &mut Option<usize>,
) -> Result<(), LlmError> {
    if vectors.len() != expected {
        return Err(LlmError::MalformedResponse(format!(
            "{} vectors for {expected} inputs",
            vectors.len()
        )));
    }
    for vector in vectors {
        if vector.is_empty() {
            return Err(LlmError::MalformedResponse("empty vector".into()));
        }
        match *dimension {
            None => *dimension = Some(vector.len()),
            Some(d) if d != vector.len() => {
                return Err(LlmError::MalformedResponse(format!(
                    "mixed vector dimensions {d} and {}",
                    vector.len()
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}
