//! Mapping of provider HTTP failures onto ragmem errors.

use ragmem_core::Error;

/// Which endpoint produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Embedding,
    Generation,
}

/// OpenAI-specific error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    /// Invalid authentication credentials.
    AuthenticationError,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Model not found or not available.
    ModelNotFound,
    /// Request too large.
    ContextLengthExceeded,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::AuthenticationError => "authentication failed",
            Self::RateLimitExceeded => "rate limit exceeded",
            Self::ModelNotFound => "model not found",
            Self::ContextLengthExceeded => "context too long",
            Self::ServerError => "server error",
            Self::Unknown => "request rejected",
        }
    }
}

/// Convert a provider failure into the provider error for `op`.
///
/// Every code maps to `Embedding` or `Inference` so callers degrade instead
/// of surfacing the failure.
pub fn to_ragmem_error(op: Operation, status: u16, code: OpenAIErrorCode, message: &str) -> Error {
    let text = format!("provider returned {} ({}): {}", status, code.label(), message);
    match op {
        Operation::Embedding => Error::Embedding(text),
        Operation::Generation => Error::Inference(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_from_status() {
        assert_eq!(
            OpenAIErrorCode::from_response(401, "invalid_api_key"),
            OpenAIErrorCode::AuthenticationError
        );
        assert_eq!(
            OpenAIErrorCode::from_response(429, "rate_limit_exceeded"),
            OpenAIErrorCode::RateLimitExceeded
        );
        assert_eq!(
            OpenAIErrorCode::from_response(400, "model_not_found"),
            OpenAIErrorCode::ModelNotFound
        );
        assert_eq!(
            OpenAIErrorCode::from_response(502, "bad_gateway"),
            OpenAIErrorCode::ServerError
        );
        assert_eq!(
            OpenAIErrorCode::from_response(418, "im_a_teapot"),
            OpenAIErrorCode::Unknown
        );
    }

    #[test]
    fn test_maps_to_provider_variants() {
        let err = to_ragmem_error(
            Operation::Embedding,
            401,
            OpenAIErrorCode::AuthenticationError,
            "Invalid key",
        );
        assert!(matches!(err, Error::Embedding(_)));
        assert!(err.to_string().contains("Invalid key"));
        assert!(err.is_provider());

        let err = to_ragmem_error(Operation::Generation, 500, OpenAIErrorCode::ServerError, "boom");
        assert!(matches!(err, Error::Inference(_)));
        assert!(err.to_string().contains("500"));
    }
}
