//! Query side of coderag.
//!
//! A raw query is classified and rewritten by [`query::process_query`], the
//! [`retriever::ContextRetriever`] pulls ranked chunks from the index into a
//! bounded context, [`prompt::PromptConstructor`] assembles the prompt and
//! [`generator::ResponseGenerator`] calls the model. [`pipeline::RagPipeline`]
//! runs the whole chain for one repository, and [`bootstrap`] builds it from
//! [`config::Config`].

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod prompt;
pub mod query;
pub mod retriever;

pub use config::Config;
pub use error::{CoreError, Result, Stage, StageError};
pub use pipeline::{QueryAnswer, QueryRequest, RagPipeline};
pub use prompt::CurrentFile;
pub use query::{Intent, ProcessedQuery, process_query};
pub use retriever::{ContextRetriever, RetrievalResult, RetrieverConfig};
