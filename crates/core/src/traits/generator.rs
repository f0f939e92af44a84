//! The terminal fallback capability (§6, §9).

use crate::{Result, SearchResult};
use async_trait::async_trait;

/// A single opaque capability taking `(query, optional candidates)` and
/// returning a string. Invoked by the hierarchical controller when no
/// level reaches its confidence threshold, or when a request deadline
/// elapses.
#[async_trait]
pub trait FallbackGenerator: Send + Sync {
    async fn generate(&self, query: &str, candidates: Option<&[SearchResult]>) -> Result<String>;
}
