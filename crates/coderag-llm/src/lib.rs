//! Embedding and text-generation backends behind typed interfaces.
//!
//! The pipeline never talks to a transport directly: it calls
//! [`EmbeddingBackend`] and [`TextGenerator`], and wraps every call in
//! [`timeout::bounded`] so a stuck service surfaces as [`LlmError::Timeout`].

pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod provider;
pub mod timeout;

pub use error::LlmError;
pub use provider::{EmbeddingBackend, GenerationParams, TextGenerator};
