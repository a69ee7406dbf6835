use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Backend selector for embeddings and generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "codellama:7b".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
        }
    }
}

fn default_max_chunk_size() -> usize {
    1500
}

fn default_overlap_ratio() -> f32 {
    0.2
}

fn default_batch_size() -> usize {
    coderag_index::embedding::DEFAULT_BATCH_SIZE
}

fn default_parallelism() -> usize {
    coderag_index::indexer::DEFAULT_PARALLELISM
}

fn default_true() -> bool {
    true
}

fn default_max_file_bytes() -> u64 {
    coderag_index::scanner::DEFAULT_MAX_FILE_BYTES
}

fn default_watch_debounce_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// `SQLite` file. Defaults to the user data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_overlap_ratio")]
    pub overlap_ratio: f32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_true")]
    pub prefix_context: bool,
    /// Replaces the built-in ignore patterns when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Vec<String>>,
    /// Appended to the active ignore patterns.
    #[serde(default)]
    pub extra_ignore: Vec<String>,
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            max_chunk_size: default_max_chunk_size(),
            overlap_ratio: default_overlap_ratio(),
            batch_size: default_batch_size(),
            parallelism: default_parallelism(),
            prefix_context: true,
            ignore: None,
            extra_ignore: Vec::new(),
            respect_gitignore: true,
            max_file_bytes: default_max_file_bytes(),
            watch_debounce_ms: default_watch_debounce_ms(),
        }
    }
}

impl IndexConfig {
    /// Configured database path, or `<data dir>/coderag/index.db`.
    #[must_use]
    pub fn resolved_db_path(&self) -> PathBuf {
        match &self.db_path {
            Some(path) => PathBuf::from(path),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("coderag")
                .join("index.db"),
        }
    }
}

fn default_min_score() -> f32 {
    0.25
}

fn default_max_context_chars() -> usize {
    12_000
}

fn default_cache_capacity() -> usize {
    128
}

fn default_cache_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Minimum cosine similarity to accept.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Zero disables the query cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_context_chars: default_max_context_chars(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_embedding_timeout() -> u64 {
    60
}

fn default_llm_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_embedding_timeout")]
    pub embedding_seconds: u64,
    #[serde(default = "default_llm_timeout")]
    pub llm_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            embedding_seconds: default_embedding_timeout(),
            llm_seconds: default_llm_timeout(),
        }
    }
}
