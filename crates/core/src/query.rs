//! The query-path context threaded through every level (§3, §4.G).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Recommendation,
    Analysis,
    Search,
    General,
}

impl Default for Intent {
    fn default() -> Self {
        Intent::General
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Intent::Recommendation => "recommendation",
            Intent::Analysis => "analysis",
            Intent::Search => "search",
            Intent::General => "general",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Business,
    Education,
    Technology,
    General,
}

impl Default for Domain {
    fn default() -> Self {
        Domain::General
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Domain::Business => "business",
            Domain::Education => "education",
            Domain::Technology => "technology",
            Domain::General => "general",
        };
        write!(f, "{s}")
    }
}

/// Built by the Level 1 query rewriter; consumed by every later level
/// (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryContext {
    pub original_query: String,
    pub rewritten_query: String,
    pub intent: Intent,
    pub entities: BTreeSet<String>,
    pub domain: Domain,
    pub confidence: f32,
}

impl QueryContext {
    /// A context carrying the raw query unmodified, confidence 0 — used
    /// when L1 fails or as the seed before rewriting runs (§4.G, §4.M).
    pub fn raw(query: impl Into<String>) -> Self {
        let q = query.into();
        Self {
            rewritten_query: q.clone(),
            original_query: q,
            intent: Intent::General,
            entities: BTreeSet::new(),
            domain: Domain::General,
            confidence: 0.0,
        }
    }

    pub fn was_rewritten(&self) -> bool {
        self.rewritten_query != self.original_query
    }
}
