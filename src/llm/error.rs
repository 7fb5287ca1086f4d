/// Failure of a single language-model call
///
/// Only `kind()` and `status()` are meant for logs; users only ever see the
/// canned fallback text derived from these variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("authentication failed (status {0})")]
    Auth(u16),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("server error (status {0})")]
    Server(u16),

    #[error("bad request (status {status}): {details}")]
    BadRequest { status: u16, details: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed completion: {0}")]
    Malformed(String),

    #[error("empty response content")]
    EmptyContent,

    #[error("provider error: {0}")]
    Other(String),
}

impl ModelError {
    /// Map a non-success HTTP status to an error
    pub fn from_status(status: u16, details: impl Into<String>) -> Self {
        match status {
            401 | 403 => ModelError::Auth(status),
            429 => ModelError::RateLimited,
            500..=599 => ModelError::Server(status),
            _ => ModelError::BadRequest {
                status,
                details: details.into(),
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ModelError::Auth(status) | ModelError::Server(status) => Some(*status),
            ModelError::BadRequest { status, .. } => Some(*status),
            ModelError::RateLimited => Some(429),
            _ => None,
        }
    }

    /// Stable short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ModelError::Timeout(_) => "timeout",
            ModelError::Auth(_) => "auth",
            ModelError::RateLimited => "rate_limit",
            ModelError::Server(_) => "server",
            ModelError::BadRequest { .. } => "bad_request",
            ModelError::Network(_) => "network",
            ModelError::Malformed(_) => "malformed",
            ModelError::EmptyContent => "empty_content",
            ModelError::Other(_) => "other",
        }
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::Timeout(_)
                | ModelError::RateLimited
                | ModelError::Server(_)
                | ModelError::Network(_)
                | ModelError::EmptyContent
                | ModelError::Other(_)
        )
    }

    /// User-safe description embedded in the exhausted-retries fallback
    pub fn short_description(&self) -> &'static str {
        match self {
            ModelError::Timeout(_) => "AI request timeout",
            ModelError::Auth(_) => "authentication failed",
            ModelError::RateLimited => "too many requests",
            ModelError::Server(_) => "AI service unavailable",
            ModelError::BadRequest { .. } => "invalid request",
            ModelError::Network(_) => "network problem",
            ModelError::Malformed(_) => "invalid response format",
            ModelError::EmptyContent => "empty response",
            ModelError::Other(_) => "unexpected error",
        }
    }
}
