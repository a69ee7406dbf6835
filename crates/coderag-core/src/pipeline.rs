//! Caller-facing query and indexing entry points.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use coderag_index::store::CollectionInfo;
use coderag_index::watcher::{IndexWatcher, Reindexed};
use coderag_index::{IndexReport, Indexer, ScoredChunk, SearchFilter};
use coderag_llm::{EmbeddingBackend, TextGenerator};
use tokio::sync::mpsc;

use crate::error::{CoreError, StageError};
use crate::generator::ResponseGenerator;
use crate::prompt::{CurrentFile, Prompt, PromptConstructor};
use crate::query::{Intent, process_query};
use crate::retriever::{ContextRetriever, RetrievalResult};

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub text: String,
    /// Overrides the intent's default number of chunks.
    pub limit: Option<usize>,
    pub filter: SearchFilter,
    pub current_file: Option<CurrentFile>,
}

impl QueryRequest {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnswer {
    pub response: String,
    pub intent: Intent,
    pub chunks_used: usize,
    /// The chunks behind the answer, highest score first.
    pub sources: Vec<ScoredChunk>,
}

impl QueryAnswer {
    fn empty() -> Self {
        Self {
            response: String::new(),
            intent: Intent::Search,
            chunks_used: 0,
            sources: Vec::new(),
        }
    }
}

/// One repository root wired to its index, retriever and generator.
pub struct RagPipeline<B, G> {
    root: PathBuf,
    collection: String,
    indexer: Arc<Indexer<B>>,
    retriever: ContextRetriever<B>,
    prompts: PromptConstructor,
    generator: ResponseGenerator<G>,
}

impl<B, G> RagPipeline<B, G>
where
    B: EmbeddingBackend + 'static,
    G: TextGenerator,
{
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        indexer: Arc<Indexer<B>>,
        retriever: ContextRetriever<B>,
        prompts: PromptConstructor,
        generator: ResponseGenerator<G>,
    ) -> Self {
        let root = root.into();
        let collection = Indexer::<B>::collection_for(&root);
        Self {
            root,
            collection,
            indexer,
            retriever,
            prompts,
            generator,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn indexer(&self) -> &Arc<Indexer<B>> {
        &self.indexer
    }

    /// Retrieve context for the query, build the prompt and generate.
    ///
    /// An empty query returns an empty answer without touching any backend.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] naming the stage that failed.
    pub async fn answer(&self, request: &QueryRequest) -> Result<QueryAnswer, StageError> {
        let query = process_query(&request.text);
        if query.is_empty() {
            return Ok(QueryAnswer::empty());
        }

        let retrieved = self
            .retriever
            .retrieve(&self.collection, &query, request.limit, &request.filter)
            .await?;

        let prompt = self.prompts.build(&Prompt {
            intent: query.intent,
            context: &retrieved.context,
            current_file: request.current_file.as_ref(),
            query: request.text.trim(),
        });
        let response = self.generator.generate(&prompt, query.intent).await?;

        tracing::info!(
            intent = %query.intent,
            chunks = retrieved.chunks.len(),
            "answered query"
        );
        Ok(QueryAnswer {
            response,
            intent: query.intent,
            chunks_used: retrieved.chunks.len(),
            sources: retrieved.chunks,
        })
    }

    /// Ranked context for the query, without generation.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] naming the embedding or index stage.
    pub async fn search(&self, request: &QueryRequest) -> Result<RetrievalResult, StageError> {
        let query = process_query(&request.text);
        self.retriever
            .retrieve(&self.collection, &query, request.limit, &request.filter)
            .await
    }

    /// # Errors
    ///
    /// Returns an error if scanning, embedding or the index fails.
    pub async fn index_repository(&self, force: bool) -> Result<IndexReport, CoreError> {
        let result = self.indexer.index_repository(&self.root, force).await;
        // A failed run may still have written earlier files.
        self.retriever.invalidate();
        Ok(result?)
    }

    /// # Errors
    ///
    /// Returns an error if embedding or the index fails for this file.
    pub async fn reindex_file(&self, path: &Path) -> Result<IndexReport, CoreError> {
        let result = self.indexer.reindex_file(&self.root, path).await;
        self.retriever.invalidate();
        Ok(result?)
    }

    /// Forget cached retrievals, e.g. after a [`Reindexed`] event.
    pub fn invalidate(&self) {
        self.retriever.invalidate();
    }

    /// Follow edits under the root. Call [`RagPipeline::invalidate`] for each
    /// event received if this pipeline keeps answering queries.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem watcher cannot be started.
    pub fn watch(
        &self,
        debounce: Duration,
    ) -> Result<(IndexWatcher, mpsc::Receiver<Reindexed>), CoreError> {
        let (tx, rx) = mpsc::channel(64);
        let watcher = IndexWatcher::start(&self.root, Arc::clone(&self.indexer), debounce, tx)?;
        Ok((watcher, rx))
    }

    /// Collection stored for this root, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    pub async fn info(&self) -> Result<Option<CollectionInfo>, CoreError> {
        let collections = self.indexer.index().list().await?;
        Ok(collections.into_iter().find(|c| c.name == self.collection))
    }

    /// Drop everything stored for this root. Returns `false` if nothing was indexed.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be written.
    pub async fn clear(&self) -> Result<bool, CoreError> {
        let dropped = self.indexer.index().drop_collection(&self.collection).await?;
        self.retriever.invalidate();
        Ok(dropped)
    }
}
