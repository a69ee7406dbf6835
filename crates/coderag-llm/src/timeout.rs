//! Explicit deadlines for external-service calls.

use std::time::Duration;

use crate::error::LlmError;

/// Await `fut`, failing with [`LlmError::Timeout`] once `limit` elapses.
///
/// # Errors
///
/// Returns the future's own error, or `Timeout` if the deadline passes first.
pub async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, seconds = limit.as_secs(), "external call timed out");
            Err(LlmError::Timeout {
                operation,
                seconds: limit.as_secs(),
            })
        }
    }
}
