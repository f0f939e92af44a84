//! The uniform cascade-level capability (§9 design notes: "Each level is a
//! capability with the shape `(input, context) -> (output, confidence)`.
//! The controller holds an ordered list of these capabilities and
//! iterates; adding a level is a registry edit, not a controller
//! rewrite.").

use crate::{QueryContext, RAGResponse, Result, SearchResult};
use async_trait::async_trait;

/// The value flowing between cascade levels. Every level either consumes
/// and produces a `Query` (L1), a `Results` list (L2-L5), or the terminal
/// `Answer` (L6) — a single enum lets the controller hold one
/// homogeneous, object-safe trait rather than a generic per-level one.
#[derive(Debug, Clone)]
pub enum CascadeValue {
    Query(QueryContext),
    Results(Vec<SearchResult>),
    Answer(RAGResponse),
}

impl CascadeValue {
    pub fn as_query(&self) -> Option<&QueryContext> {
        match self {
            CascadeValue::Query(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_results(&self) -> Option<&[SearchResult]> {
        match self {
            CascadeValue::Results(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_results(self) -> Vec<SearchResult> {
        match self {
            CascadeValue::Results(r) => r,
            _ => Vec::new(),
        }
    }
}

/// A single level of the hierarchical cascade.
#[async_trait]
pub trait Level: Send + Sync {
    /// Level name, e.g. `"L1"`. Used for `level_used` and logging.
    fn name(&self) -> &str;

    /// The confidence threshold this level must clear to have its output
    /// accepted by the controller (§6: `l1_threshold` .. `l6_threshold`).
    fn threshold(&self) -> f32;

    /// Run the level. Implementations never return an error that escapes
    /// the cascade: on internal failure they return their best-effort
    /// output with confidence 0 so the controller can fall through (§4.G,
    /// §4.M).
    async fn run(&self, input: CascadeValue, query: &QueryContext) -> Result<(CascadeValue, f32)>;
}
