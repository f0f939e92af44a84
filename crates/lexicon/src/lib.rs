//! Lexicon & Tag Registry (§4.A): loads a tag vocabulary with synonym
//! columns on startup and exposes deterministic text-to-tag resolution.
//! Tags are read-only after load — safe to share across ingestion workers
//! and query-time category filtering alike (§5 "Shared resources").

pub mod registry;

pub use registry::TagRegistry;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LexiconError {
    #[error("tag vocabulary file not found: {0}")]
    FileNotFound(String),

    #[error("failed to read tag vocabulary: {0}")]
    Read(String),

    #[error("tag vocabulary has no recognizable tag column")]
    MissingTagColumn,
}

impl From<LexiconError> for podwise_core::Error {
    fn from(err: LexiconError) -> Self {
        // A missing/malformed vocabulary file is fatal at process init
        // (§4.A "Failure modes"), which maps to a ConfigError-class
        // failure in the unified taxonomy.
        podwise_core::Error::config(err.to_string())
    }
}
