//! Ingestion & Chunking Pipeline (§4.B-F): pulls raw transcripts, cleans
//! and chunks them, assigns tags, produces dense embeddings, resolves
//! episode metadata, and writes the result to the vector store — driven
//! end to end by the [`orchestrator`] with resumable progress and a dual
//! error journal.

pub mod chunker;
pub mod embedder;
pub mod metadata;
pub mod orchestrator;
pub mod source;
pub mod vector_store;

pub use chunker::{ChunkerConfig, SpecialCleaner, TextChunker};
pub use embedder::{EmbeddingAdapter, HashingEmbedder};
pub use metadata::MetadataResolver;
pub use orchestrator::{IngestionOrchestrator, OrchestratorConfig};
pub use source::{RawDocument, TranscriptSource};
pub use vector_store::QdrantVectorStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("document {0} produced no writable chunks")]
    NoWritableChunks(String),

    #[error("metadata completeness check failed for document {0}")]
    IncompleteMetadata(String),

    #[error("progress journal I/O failed: {0}")]
    ProgressIo(String),
}

impl From<IngestError> for podwise_core::Error {
    fn from(err: IngestError) -> Self {
        match &err {
            IngestError::ProgressIo(_) => podwise_core::Error::invariant(err.to_string()),
            _ => podwise_core::Error::data(err.to_string()),
        }
    }
}
