use thiserror::Error;

/// Failure to retrieve a document from a competitor site.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("empty response body")]
    Empty,
}

impl FetchError {
    /// Rate limiting, server errors and transport failures are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Status(code) => *code == 429 || (500..600).contains(code),
            FetchError::Empty => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Request(e) => e.status().map(|s| s.as_u16()),
            FetchError::Status(code) => Some(*code),
            FetchError::Empty => None,
        }
    }
}

/// Failure of the external text-generation service. Always recoverable.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("text generation unavailable: {0}")]
    Unavailable(String),
    #[error("text generation returned an unexpected response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, UpstreamError::Unavailable(_))
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_retry_policy() {
        assert!(FetchError::Status(429).is_retryable());
        assert!(FetchError::Status(503).is_retryable());
        assert!(!FetchError::Status(404).is_retryable());
        assert!(!FetchError::Empty.is_retryable());
        assert_eq!(FetchError::Status(404).status(), Some(404));
    }

    #[test]
    fn only_unavailable_upstream_is_retried() {
        assert!(UpstreamError::Unavailable("timeout".into()).is_retryable());
        assert!(!UpstreamError::Malformed("no choices".into()).is_retryable());
    }
}
