//! Capability traits implemented by external collaborators and by the
//! cascade levels themselves.
//!
//! # Trait Hierarchy
//!
//! ```text
//! External capabilities (constructed once at startup, no singletons):
//!   - VectorStore: ANN search + scalar filter + idempotent upsert
//!   - MetadataStore: read-only podcast/episode join
//!   - Embedder: text -> 1024-d vector
//!   - FallbackGenerator: opaque (query, candidates) -> string
//!
//! Cascade:
//!   - Level: the uniform (input, context) -> (output, confidence) shape
//!     the hierarchical controller iterates over.
//! ```

mod embedder;
mod generator;
mod level;
mod store;

pub use embedder::Embedder;
pub use generator::FallbackGenerator;
pub use level::{CascadeValue, Level};
pub use store::{MatchTier, MetadataStore, ResolvedEpisode, VectorStore, VectorStoreFilter};
