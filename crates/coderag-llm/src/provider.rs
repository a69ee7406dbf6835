use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Sampling parameters sent with a generation request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(default)]
    pub stop: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1024,
            stop: Vec::new(),
        }
    }
}

pub trait EmbeddingBackend: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or rejects the request.
    /// Partial results are never returned.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    fn name(&self) -> &str;
}

pub trait TextGenerator: Send + Sync {
    /// Generate a completion for a single prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails or produces no output.
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_have_no_stop_sequences() {
        let params = GenerationParams::default();
        assert!(params.stop.is_empty());
        assert_eq!(params.max_tokens, 1024);
    }

    #[test]
    fn params_deserialize_without_stop() {
        let params: GenerationParams =
            serde_json::from_str(r#"{"temperature":0.5,"max_tokens":64}"#).unwrap();
        assert!((params.temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(params.max_tokens, 64);
        assert!(params.stop.is_empty());
    }
}
