use thiserror::Error;

/// Errors surfaced by [`ApiClient`](super::ApiClient).
///
/// `Clone` so that every waiter on a deduplicated request receives the same error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Invalid or unauthorized API key: {0}")]
    InvalidCredential(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - retries exhausted")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Unexpected status {0}: {1}")]
    UnexpectedStatus(u16, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    Validation(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Map a non-success status to an error. `path` names the resource for 404s.
    pub fn from_status(status: u16, path: &str, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            401 | 403 => ApiError::InvalidCredential(truncated),
            404 => ApiError::NotFound(path.to_string()),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::UnexpectedStatus(status, truncated),
        }
    }

    /// Rate limiting and missing responses are retried; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::RateLimited | ApiError::Network(_))
    }
}
