#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{provider} unavailable: {reason}")]
    Unavailable {
        provider: &'static str,
        reason: String,
    },

    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether the failure came from the transport rather than the payload.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_operation() {
        let err = LlmError::Timeout {
            operation: "embedding",
            seconds: 30,
        };
        assert_eq!(err.to_string(), "embedding timed out after 30s");
        assert!(err.is_transport());
    }

    #[test]
    fn malformed_is_not_transport() {
        let err = LlmError::MalformedResponse("2 vectors for 3 inputs".into());
        assert!(!err.is_transport());
        assert!(err.to_string().contains("3 inputs"));
    }
}
