//! Fetch error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeouts, resets, broken chunked bodies. Worth another attempt.
    #[error("Transient fetch error: {0}")]
    Transient(String),
    /// The body exceeded the byte cap. Treated as "no evidence", never retried.
    #[error("Response too large: {observed} bytes exceeds limit of {limit}")]
    TooLarge { limit: u64, observed: u64 },
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_too_large(&self) -> bool {
        matches!(self, Self::TooLarge { .. })
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Self::Build(e.to_string())
        } else if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Transient(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(FetchError::Transient("reset".into()).is_retryable());
        assert!(!FetchError::TooLarge { limit: 1, observed: 2 }.is_retryable());
        assert!(!FetchError::Malformed("bad".into()).is_retryable());
        assert!(!FetchError::Build("tls".into()).is_retryable());
    }
}
