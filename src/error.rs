//! Error taxonomy shared by every pipeline stage.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias used throughout the library.
pub type Result<T, E = RagError> = std::result::Result<T, E>;

/// Failure conditions surfaced by the indexing and retrieval pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid settings or missing credentials. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Provider signalled backpressure (HTTP 429).
    #[error("{provider} rate limited the request: {detail}")]
    RateLimited {
        /// Provider that rejected the call.
        provider: &'static str,
        /// Response body or error text.
        detail: String,
    },

    /// Transport, server-side or authentication failure.
    #[error("{provider} unavailable: {detail}")]
    ProviderUnavailable {
        /// Provider that failed.
        provider: &'static str,
        /// Response body or error text.
        detail: String,
        /// Whether retrying without a configuration change can succeed.
        transient: bool,
    },

    /// The client-side request timeout elapsed.
    #[error("{provider} request timed out: {detail}")]
    ProviderTimeout {
        /// Provider that timed out.
        provider: &'static str,
        /// Error text.
        detail: String,
    },

    /// Provider refused the request (4xx other than auth and rate limits).
    #[error("{provider} rejected the request ({status}): {detail}")]
    ProviderRejected {
        /// Provider that rejected the call.
        provider: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body.
        detail: String,
    },

    /// Provider answered with a payload that does not match its contract.
    #[error("{provider} returned an invalid response: {detail}")]
    InvalidResponse {
        /// Provider that answered.
        provider: &'static str,
        /// What was wrong with the payload.
        detail: String,
    },

    /// Index never reported ready within the readiness window.
    #[error("index '{index}' was not ready after {waited:?}")]
    ProvisioningTimeout {
        /// Index name.
        index: String,
        /// Time spent waiting.
        waited: Duration,
    },

    /// A vector length disagrees with the index dimension.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed at provisioning time.
        expected: usize,
        /// Offending length.
        actual: usize,
    },

    /// Local filesystem failure while loading documents.
    #[error("failed to read {path:?}: {source}")]
    Io {
        /// File or directory being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A document file could not be turned into text.
    #[error("failed to extract text from {path:?}: {detail}")]
    Extraction {
        /// File being extracted.
        path: PathBuf,
        /// Extractor error text.
        detail: String,
    },
}

impl RagError {
    /// Builds a [`RagError::Configuration`] from any message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True when the caller may retry the same call with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::ProviderTimeout { .. } => true,
            Self::ProviderUnavailable { transient, .. } => *transient,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_retryable_conditions() {
        let limited = RagError::RateLimited {
            provider: "openai",
            detail: "slow down".into(),
        };
        let auth = RagError::ProviderUnavailable {
            provider: "pinecone",
            detail: "bad key".into(),
            transient: false,
        };
        let outage = RagError::ProviderUnavailable {
            provider: "pinecone",
            detail: "502".into(),
            transient: true,
        };
        assert!(limited.is_retryable());
        assert!(outage.is_retryable());
        assert!(!auth.is_retryable());
        assert!(!RagError::config("chunk size must be positive").is_retryable());
    }

    #[test]
    fn messages_name_the_provider() {
        let err = RagError::ProviderTimeout {
            provider: "anthropic",
            detail: "operation timed out".into(),
        };
        assert_eq!(
            err.to_string(),
            "anthropic request timed out: operation timed out"
        );
    }
}
