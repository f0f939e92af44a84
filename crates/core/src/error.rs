//! Error taxonomy for the retrieval engine.
//!
//! Mirrors the six error kinds of the design: config, resource, data,
//! timeout, quality and invariant errors each carry enough context (stage,
//! identifiers) to land in an error journal record without re-derivation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type. Every recoverable error that crosses a component
/// boundary is one of these variants; nothing downstream needs to match on
/// crate-local error enums.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Bad YAML, missing tag file. Fatal at startup; no recovery.
    #[error("config error: {0}")]
    Config(String),

    /// Embedding/vector-store/metadata-store unreachable. Retried with
    /// backoff at call sites; surfaces as fallback on the query path and as
    /// a document-skip on the ingestion path.
    #[error("resource unavailable: {0}")]
    Resource(String),

    /// Malformed transcript, missing required metadata, oversize field.
    /// Recorded in the error journal; the offending unit is skipped.
    #[error("data error: {0}")]
    Data(String),

    /// Per-call or per-request deadline elapsed.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// L6 quality control rejected the generated answer.
    #[error("quality check failed: {0}")]
    Quality(String),

    /// Progress journal corruption, vector count divergence. Fatal; needs
    /// an operator.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Error::Resource(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    pub fn quality(msg: impl Into<String>) -> Self {
        Error::Quality(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::Invariant(msg.into())
    }

    /// Whether a call site should retry this error with backoff (§5
    /// suspension points: embedding/store/metadata calls).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Resource(_) | Error::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_errors_are_retryable() {
        assert!(Error::resource("vector store down").is_retryable());
        assert!(Error::Timeout(std::time::Duration::from_secs(1)).is_retryable());
        assert!(!Error::data("bad field").is_retryable());
        assert!(!Error::invariant("journal corrupt").is_retryable());
    }
}
