//! Embedding-indexed message memory for Chronicle.
//!
//! Records are persisted as `(id, document, embedding, metadata)` entries in a
//! [`VectorBackend`]; [`MemoryStore`] layers embedding, record decoding and
//! per-source sequencing on top.

pub mod backend;
pub mod embedder;
pub mod error;
pub mod filter;
pub mod local;
pub mod model;
pub mod sequencer;
pub mod store;

/// Backend contract and stored entry types.
pub use backend::{ScoredEntry, StoredEntry, VectorBackend, cosine_distance};
/// Embedding function contract.
pub use embedder::Embedder;
/// Memory error type.
pub use error::MemoryError;
/// Metadata filters.
pub use filter::{Condition, Filter};
/// Local JSONL-backed vector index.
pub use local::LocalVectorBackend;
/// Message record model.
pub use model::{ContentKind, MessageRecord, SourceKind};
/// Per-source sequence index allocation.
pub use sequencer::Sequencer;
/// Store facade.
pub use store::{MemoryStore, ScoredRecord};
