use std::sync::Arc;
use std::time::Duration;

use coderag_llm::timeout::bounded;
use coderag_llm::{GenerationParams, TextGenerator};

use crate::error::{Stage, StageError};
use crate::query::Intent;

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Low temperature where exact code matters, higher for prose.
#[must_use]
pub fn params_for(intent: Intent, max_tokens: u32) -> GenerationParams {
    let (temperature, stop) = match intent {
        Intent::Completion => (0.1, vec!["\n```\n".to_owned()]),
        Intent::Fix => (0.2, Vec::new()),
        Intent::Refactor | Intent::Search => (0.3, Vec::new()),
        Intent::Explanation => (0.7, Vec::new()),
    };
    GenerationParams {
        temperature,
        max_tokens,
        stop,
    }
}

pub struct ResponseGenerator<G> {
    generator: Arc<G>,
    timeout: Duration,
    max_tokens: u32,
}

impl<G: TextGenerator> ResponseGenerator<G> {
    #[must_use]
    pub fn new(generator: Arc<G>) -> Self {
        Self {
            generator,
            timeout: DEFAULT_GENERATION_TIMEOUT,
            max_tokens: GenerationParams::default().max_tokens,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// # Errors
    ///
    /// Returns a generation-stage [`StageError`] on backend failure, timeout,
    /// or a blank response.
    pub async fn generate(&self, prompt: &str, intent: Intent) -> Result<String, StageError> {
        let params = params_for(intent, self.max_tokens);
        let text = bounded(
            "generation",
            self.timeout,
            self.generator.generate(prompt, &params),
        )
        .await
        .map_err(|e| {
            tracing::warn!(%intent, backend = self.generator.name(), "generation failed: {e}");
            StageError::generation(&e)
        })?;

        if text.trim().is_empty() {
            return Err(StageError::new(
                Stage::Generation,
                format!("empty response from {}", self.generator.name()),
            ));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use coderag_llm::mock::MockGenerator;

    use super::*;

    #[test]
    fn completion_and_fix_run_cold() {
        let completion = params_for(Intent::Completion, 512);
        let fix = params_for(Intent::Fix, 512);
        let explanation = params_for(Intent::Explanation, 512);
        assert!(completion.temperature < explanation.temperature);
        assert!(fix.temperature < explanation.temperature);
        assert_eq!(completion.stop, vec!["\n```\n".to_string()]);
        assert!(explanation.stop.is_empty());
        assert_eq!(explanation.max_tokens, 512);
    }

    #[tokio::test]
    async fn passes_intent_params_to_backend() {
        let backend = Arc::new(MockGenerator::with_responses(vec!["done".into()]));
        let generator = ResponseGenerator::new(Arc::clone(&backend)).with_max_tokens(64);
        let text = generator.generate("prompt", Intent::Explanation).await.unwrap();
        assert_eq!(text, "done");
        let params = backend.last_params().unwrap();
        assert!((params.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(params.max_tokens, 64);
        assert_eq!(backend.last_prompt().as_deref(), Some("prompt"));
    }

    #[tokio::test]
    async fn backend_failure_is_a_generation_stage_error() {
        let backend = Arc::new(MockGenerator::default());
        backend.set_failing(true);
        let err = ResponseGenerator::new(backend)
            .generate("p", Intent::Search)
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Generation);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let backend = Arc::new(MockGenerator::default().with_delay(Duration::from_secs(30)));
        let err = ResponseGenerator::new(backend)
            .with_timeout(Duration::from_secs(5))
            .generate("p", Intent::Search)
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Generation);
        assert!(err.reason.contains("timed out"), "{}", err.reason);
    }

    #[tokio::test]
    async fn blank_response_is_an_error() {
        let backend = Arc::new(MockGenerator::with_responses(vec!["   \n".into()]));
        let err = ResponseGenerator::new(backend)
            .generate("p", Intent::Search)
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Generation);
    }
}
