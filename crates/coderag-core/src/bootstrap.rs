//! Pipeline assembly: config resolution, index, backend and pipeline construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use coderag_index::boundary::BoundaryRegistry;
use coderag_index::embedding::EmbeddingClient;
use coderag_index::{Indexer, SqliteIndex, VectorIndex};
use coderag_llm::ollama::OllamaBackend;
use coderag_llm::{EmbeddingBackend, TextGenerator};

use crate::config::{Config, ProviderKind};
use crate::generator::ResponseGenerator;
use crate::pipeline::RagPipeline;
use crate::prompt::PromptConstructor;
use crate::retriever::{ContextRetriever, RetrieverConfig};

pub type OllamaPipeline = RagPipeline<OllamaBackend, OllamaBackend>;

/// Priority: explicit path > `CODERAG_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("CODERAG_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}

/// Open the SQLite index, creating its parent directory if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the database
/// cannot be opened.
pub async fn open_index(config: &Config) -> anyhow::Result<Arc<SqliteIndex>> {
    let path = config.index.resolved_db_path();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let index = SqliteIndex::open(&path.to_string_lossy())
        .await
        .with_context(|| format!("failed to open index at {}", path.display()))?;
    tracing::debug!(path = %path.display(), "index opened");
    Ok(Arc::new(index))
}

#[must_use]
pub fn create_backend(config: &Config) -> Arc<OllamaBackend> {
    match config.llm.provider {
        ProviderKind::Ollama => Arc::new(OllamaBackend::new(
            &config.llm.base_url,
            config.llm.model.clone(),
            config.llm.embedding_model.clone(),
        )),
    }
}

pub async fn health_check(backend: &OllamaBackend) {
    match backend.health_check().await {
        Ok(()) => tracing::info!("ollama health check passed"),
        Err(e) => tracing::warn!("ollama health check failed: {e:#}"),
    }
}

fn embedding_client<B: EmbeddingBackend>(config: &Config, backend: Arc<B>) -> EmbeddingClient<B> {
    EmbeddingClient::new(backend)
        .with_batch_size(config.index.batch_size)
        .with_prefix_context(config.index.prefix_context)
        .with_timeout(config.embedding_timeout())
}

/// Wire a pipeline for `root` from already constructed parts.
///
/// # Errors
///
/// Returns an error if the configured ignore patterns are invalid.
pub fn build_pipeline<B, G>(
    config: &Config,
    root: &Path,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<B>,
    generator: Arc<G>,
) -> anyhow::Result<RagPipeline<B, G>>
where
    B: EmbeddingBackend + 'static,
    G: TextGenerator,
{
    let root = root
        .canonicalize()
        .with_context(|| format!("repository root {} not found", root.display()))?;

    let indexer = Indexer::new(
        Arc::clone(&index),
        embedding_client(config, Arc::clone(&embedder)),
        Arc::new(BoundaryRegistry::with_defaults()),
        config.indexer_config().context("invalid index configuration")?,
    );

    let retriever = ContextRetriever::new(
        index,
        embedding_client(config, embedder),
        RetrieverConfig {
            min_score: config.retrieval.min_score,
            max_context_chars: config.retrieval.max_context_chars,
            cache_capacity: config.retrieval.cache_capacity,
            cache_ttl: config.cache_ttl(),
        },
    );

    let generator = ResponseGenerator::new(generator)
        .with_timeout(config.llm_timeout())
        .with_max_tokens(config.generation.max_tokens);

    Ok(RagPipeline::new(
        root,
        Arc::new(indexer),
        retriever,
        PromptConstructor::default(),
        generator,
    ))
}

/// Pipeline backed by the configured SQLite index and Ollama.
///
/// # Errors
///
/// Returns an error if the index cannot be opened or the root does not exist.
pub async fn build_ollama_pipeline(config: &Config, root: &Path) -> anyhow::Result<OllamaPipeline> {
    let index = open_index(config).await?;
    let backend = create_backend(config);
    build_pipeline(config, root, index, Arc::clone(&backend), backend)
}
