//! The embedding capability (§4.C).

use crate::Result;
use async_trait::async_trait;

/// Produces dense vectors for text batches. Batching is left to the
/// caller. Implementations normalize output (L2-norm = 1) so cosine
/// similarity reduces to a dot product; on a per-text failure they return
/// the zero vector rather than erroring the whole batch.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality this embedder produces (always 1024 for the BGE-M3
    /// class model the spec assumes, but kept explicit so mocks can
    /// declare it too).
    fn dim(&self) -> usize {
        crate::EMBEDDING_DIM
    }
}
