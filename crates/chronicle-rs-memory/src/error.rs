//! Error types for memory operations.

/// Errors returned by the memory store and its backends.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// The embedding function failed.
    #[error("embedding error: {0}")]
    Embedding(String),
    /// The embedding function returned the wrong number of vectors.
    #[error("embedding count mismatch (expected={expected}, found={found})")]
    EmbeddingCount { expected: usize, found: usize },
    /// A query vector and a stored vector differ in dimension.
    #[error("vector dimension mismatch (expected={expected}, found={found})")]
    Dimension { expected: usize, found: usize },
    /// Deletion requires at least one condition.
    #[error("refusing to delete with an empty filter")]
    EmptyFilter,
    /// A stored entry could not be decoded into a record.
    #[error("invalid record {id}: {message}")]
    InvalidRecord { id: String, message: String },
}
