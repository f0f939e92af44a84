//! Core domain types, traits and errors for the Podwise retrieval engine.
//!
//! This crate provides the foundational vocabulary shared by every other
//! crate in the workspace:
//! - The error taxonomy (`Error`, `Result`)
//! - The ingestion data model (`Tag`, `Chunk`, `Episode`)
//! - The query-path data model (`QueryContext`, `SearchResult`, `RAGResponse`)
//! - Progress and error journal records for resumable ingestion
//! - The capability traits external collaborators (vector store, metadata
//!   store, embedder, fallback generator) and pipeline levels implement.
//!
//! Nothing in this crate speaks HTTP, owns a database connection, or trains
//! a model — it only describes the shapes that flow between components.

pub mod error;
pub mod chunk;
pub mod query;
pub mod search;
pub mod response;
pub mod journal;
pub mod traits;

pub use error::{Error, Result};
pub use chunk::{Chunk, Episode, Tag, EMBEDDING_DIM, UNKNOWN};
pub use query::{Domain, Intent, QueryContext};
pub use search::{SearchResult, SearchSource};
pub use response::{LevelUsed, RAGResponse};
pub use journal::{ErrorRecord, ErrorStage, IngestStats, ProgressRecord};

pub use traits::{
    CascadeValue, Embedder, FallbackGenerator, Level, MatchTier, MetadataStore, ResolvedEpisode,
    VectorStore, VectorStoreFilter,
};
