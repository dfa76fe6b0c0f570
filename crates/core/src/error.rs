use thiserror::Error;

/// Failure from the external embedding provider, classified so callers can
/// decide whether a retry is worth it. Nothing in this crate retries.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("provider rate limited: {0}")]
    RateLimited(String),

    #[error("input rejected by provider: {0}")]
    InvalidInput(String),

    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("invalid embedding endpoint: {0}")]
    InvalidEndpoint(String),
}

impl EmbedError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmbedError::RateLimited(_))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid fragmenter config: {0}")]
    InvalidFragmentConfig(String),

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("query embedding failed: {0}")]
    QueryEmbedding(#[source] EmbedError),

    #[error("query embedding timed out after {ms} ms")]
    QueryTimeout { ms: u64 },

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
