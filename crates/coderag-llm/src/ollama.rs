use ollama_rs::Ollama;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;

use crate::error::LlmError;
use crate::provider::{EmbeddingBackend, GenerationParams, TextGenerator};

const PROVIDER: &str = "ollama";

/// Ollama-served embedding and generation models.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: Ollama,
    model: String,
    embedding_model: String,
}

impl OllamaBackend {
    #[must_use]
    pub fn new(base_url: &str, model: String, embedding_model: String) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            model,
            embedding_model,
        }
    }

    /// Check that Ollama is reachable and both configured models are pulled.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or a model is missing.
    pub async fn health_check(&self) -> Result<(), LlmError> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| LlmError::Unavailable {
                provider: PROVIDER,
                reason: format!("failed to connect to Ollama, is it running? {e}"),
            })?;

        for wanted in [&self.model, &self.embedding_model] {
            let installed = models
                .iter()
                .any(|m| m.name == *wanted || m.name == format!("{wanted}:latest"));
            if !installed {
                return Err(LlmError::Unavailable {
                    provider: PROVIDER,
                    reason: format!("model '{wanted}' not installed, pull it with `ollama pull {wanted}`"),
                });
            }
        }
        Ok(())
    }
}

impl EmbeddingBackend for OllamaBackend {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = GenerateEmbeddingsRequest::new(
            self.embedding_model.clone(),
            EmbeddingsInput::Multiple(texts.to_vec()),
        );

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| LlmError::Unavailable {
                provider: PROVIDER,
                reason: format!("embedding request failed: {e}"),
            })?;

        if response.embeddings.is_empty() {
            return Err(LlmError::EmptyResponse { provider: PROVIDER });
        }
        Ok(response.embeddings)
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        PROVIDER
    }
}

impl TextGenerator for OllamaBackend {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        let request = GenerationRequest::new(self.model.clone(), prompt.to_owned())
            .options(model_options(params));

        let response = self
            .client
            .generate(request)
            .await
            .map_err(|e| LlmError::Unavailable {
                provider: PROVIDER,
                reason: format!("generation request failed: {e}"),
            })?;

        if response.response.trim().is_empty() {
            return Err(LlmError::EmptyResponse { provider: PROVIDER });
        }
        Ok(response.response)
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        PROVIDER
    }
}

fn model_options(params: &GenerationParams) -> ModelOptions {
    let num_predict = i32::try_from(params.max_tokens).unwrap_or(i32::MAX);
    let options = ModelOptions::default()
        .temperature(params.temperature)
        .num_predict(num_predict);
    if params.stop.is_empty() {
        options
    } else {
        options.stop(params.stop.clone())
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':') {
        let port_str = &url[colon_pos + 1..];
        if let Ok(port) = port_str.parse::<u16>() {
            let host = url[..colon_pos].to_string();
            return (host, port);
        }
    }
    (url.to_string(), 11434)
}
