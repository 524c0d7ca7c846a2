use crate::error::MemoryError;
use async_trait::async_trait;

/// Maps texts to fixed-dimension vectors, one per input, in order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts.
    ///
    /// Failing here aborts whatever ingestion unit requested the batch.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError>;
}
