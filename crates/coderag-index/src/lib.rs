//! Repository indexing for code retrieval.
//!
//! A [`scanner::Scanner`] walks the tree, the [`chunker::Chunker`] splits each
//! file at definition boundaries (sliding windows elsewhere), the
//! [`embedding::EmbeddingClient`] turns chunks into vectors and a
//! [`store::VectorIndex`] keeps them per repository. [`indexer::Indexer`] ties
//! these together incrementally and [`watcher::IndexWatcher`] follows edits.

pub mod boundary;
pub mod chunker;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod languages;
pub mod scanner;
pub mod store;
#[cfg(feature = "syntax")]
pub mod syntax;
pub mod watcher;

pub use error::{IndexError, Result};
pub use indexer::{IndexReport, Indexer, IndexerConfig};
pub use languages::{Lang, detect_language};
pub use store::{InMemoryIndex, ScoredChunk, SearchFilter, SqliteIndex, VectorIndex};
