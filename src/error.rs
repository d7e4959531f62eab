//! Error types for the retrieval core.
//!
//! The binary and CLI use `anyhow`; everything under [`crate::embedding`],
//! [`crate::vector`], [`crate::search`] and [`crate::memory`] returns this
//! typed [`Error`] so the fusion layer can tell transient vector-path
//! failures from caller mistakes.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Embedding or vector backend unreachable, unhealthy, or not yet loaded.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A vector's length disagrees with the collection (or model) dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Malformed response from a remote backend or corrupt local asset.
    #[error("parse error: {0}")]
    Parse(String),

    /// The full-text engine rejected the query even after sanitization.
    #[error("query rejected: {0}")]
    Query(String),

    /// Invalid caller input (unknown observation type, empty content, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The inference graph failed to run or produced an unexpected tensor.
    #[error("inference error: {0}")]
    Inference(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// True for failures that mean "the backend is not there right now" rather
    /// than "the request was wrong".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_) | Self::Http(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_backend_outages_are_unavailability() {
        assert!(Error::ProviderUnavailable("down".into()).is_unavailable());
        assert!(!Error::DimensionMismatch { expected: 384, actual: 768 }.is_unavailable());
        assert!(!Error::Query("fts5: syntax error".into()).is_unavailable());
        assert!(!Error::Parse("bad body".into()).is_unavailable());
    }
}
