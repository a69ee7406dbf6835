//! Deterministic in-process backends for tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::LlmError;
use crate::provider::{EmbeddingBackend, GenerationParams, TextGenerator};

/// Bag-of-words embedder: each lowercase token is FNV-hashed into one of
/// `dimensions` buckets, so texts sharing vocabulary score as similar.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    calls: Arc<AtomicUsize>,
    embedded: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    short_by_one: Arc<AtomicBool>,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            calls: Arc::new(AtomicUsize::new(0)),
            embedded: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
            short_by_one: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of `embed_batch` calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of individual texts embedded so far.
    #[must_use]
    pub fn embedded(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Return one vector fewer than requested, to exercise response validation.
    pub fn set_short_by_one(&self, short: bool) {
        self.short_by_one.store(short, Ordering::SeqCst);
    }

    #[must_use]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (fnv1a(&token.to_lowercase()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl EmbeddingBackend for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable {
                provider: "mock",
                reason: "embedding backend offline".into(),
            });
        }
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.vector_for(t)).collect();
        if self.short_by_one.load(Ordering::SeqCst) {
            vectors.pop();
        }
        Ok(vectors)
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Generator returning scripted responses, then a fixed fallback.
#[derive(Debug, Clone)]
pub struct MockGenerator {
    scripted: Arc<Mutex<VecDeque<String>>>,
    fallback: String,
    failing: Arc<AtomicBool>,
    delay: Option<Duration>,
    last_prompt: Arc<Mutex<Option<String>>>,
    last_params: Arc<Mutex<Option<GenerationParams>>>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self {
            scripted: Arc::new(Mutex::new(VecDeque::new())),
            fallback: "mock response".into(),
            failing: Arc::new(AtomicBool::new(false)),
            delay: None,
            last_prompt: Arc::new(Mutex::new(None)),
            last_params: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockGenerator {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            scripted: Arc::new(Mutex::new(responses.into())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }

    #[must_use]
    pub fn last_params(&self) -> Option<GenerationParams> {
        self.last_params.lock().ok().and_then(|p| p.clone())
    }
}

impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_owned());
        }
        if let Ok(mut last) = self.last_params.lock() {
            *last = Some(params.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable {
                provider: "mock",
                reason: "generation backend offline".into(),
            });
        }
        let next = self
            .scripted
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::new(64);
        let vectors = embedder
            .embed_batch(&[
                "fibonacci sequence".to_owned(),
                "def fibonacci(n): return n".to_owned(),
                "class HttpServer".to_owned(),
            ])
            .await
            .unwrap();
        assert!(cosine(&vectors[0], &vectors[1]) > cosine(&vectors[0], &vectors[2]));
        assert_eq!(embedder.calls(), 1);
        assert_eq!(embedder.embedded(), 3);
    }

    #[tokio::test]
    async fn failing_embedder_errors() {
        let embedder = HashEmbedder::new(8);
        embedder.set_failing(true);
        assert!(embedder.embed_batch(&["x".to_owned()]).await.is_err());
    }

    #[tokio::test]
    async fn generator_pops_scripted_then_falls_back() {
        let generator = MockGenerator::with_responses(vec!["first".into()]).with_fallback("rest");
        let params = GenerationParams::default();
        assert_eq!(generator.generate("a", &params).await.unwrap(), "first");
        assert_eq!(generator.generate("b", &params).await.unwrap(), "rest");
        assert_eq!(generator.last_prompt().as_deref(), Some("b"));
        assert_eq!(generator.calls(), 2);
    }
}
