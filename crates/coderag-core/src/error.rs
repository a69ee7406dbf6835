//! Error types for coderag-core.

use coderag_index::IndexError;
use coderag_llm::LlmError;

/// Pipeline stage that can fail a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    Index,
    Generation,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Index => "index",
            Self::Generation => "generation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure returned to callers instead of a fabricated answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage} stage failed: {reason}")]
pub struct StageError {
    pub stage: Stage,
    pub reason: String,
}

impl StageError {
    #[must_use]
    pub fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn embedding(err: &LlmError) -> Self {
        Self::new(Stage::Embedding, err.to_string())
    }

    #[must_use]
    pub fn generation(err: &LlmError) -> Self {
        Self::new(Stage::Generation, err.to_string())
    }

    /// Embedding failures reported through the index layer keep their stage.
    #[must_use]
    pub fn index(err: &IndexError) -> Self {
        match err {
            IndexError::Embedding(e) => Self::embedding(e),
            other => Self::new(Stage::Index, other.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_names_the_stage() {
        let err = StageError::new(Stage::Generation, "timed out");
        assert_eq!(err.to_string(), "generation stage failed: timed out");
    }

    #[test]
    fn embedding_errors_from_index_keep_embedding_stage() {
        let err = IndexError::Embedding(LlmError::Other("boom".into()));
        assert_eq!(StageError::index(&err).stage, Stage::Embedding);
        let err = IndexError::UnknownCollection("c".into());
        assert_eq!(StageError::index(&err).stage, Stage::Index);
    }
}
