//! Vector backend contract.

use crate::error::MemoryError;
use crate::filter::Filter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One persisted `(id, document, embedding, metadata)` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredEntry {
    pub id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: Map<String, Value>,
}

/// Query hit with its cosine distance to the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub entry: StoredEntry,
    pub distance: f32,
}

/// Storage engine behind the memory store.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Persist entries, returning how many were new.
    async fn add(&self, entries: Vec<StoredEntry>) -> Result<usize, MemoryError>;

    /// All entries matching the filter, in no particular order.
    async fn get(&self, filter: &Filter) -> Result<Vec<StoredEntry>, MemoryError>;

    /// The `top_n` entries nearest to `embedding`, nearest first.
    async fn query(
        &self,
        embedding: &[f32],
        top_n: usize,
        filter: &Filter,
    ) -> Result<Vec<ScoredEntry>, MemoryError>;

    /// Remove matching entries, returning how many were removed.
    async fn delete(&self, filter: &Filter) -> Result<usize, MemoryError>;
}

/// `1 - cosine_similarity`; zero-norm vectors are at distance 1.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f32, MemoryError> {
    if a.len() != b.len() {
        return Err(MemoryError::Dimension {
            expected: a.len(),
            found: b.len(),
        });
    }
    let mut dot = 0.0_f32;
    let mut na = 0.0_f32;
    let mut nb = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        return Ok(1.0);
    }
    Ok(1.0 - dot / denom)
}

#[cfg(test)]
mod tests {
    use super::cosine_distance;

    #[test]
    fn identical_vectors_are_at_zero_distance() {
        let distance = cosine_distance(&[1.0, 2.0], &[2.0, 4.0]).expect("distance");
        assert!(distance.abs() < 1e-6);
    }

    #[test]
    fn orthogonal_and_zero_vectors() {
        let distance = cosine_distance(&[1.0, 0.0], &[0.0, 1.0]).expect("distance");
        assert!((distance - 1.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]).expect("zero"), 1.0);
    }

    #[test]
    fn mismatched_dimensions_fail() {
        assert!(cosine_distance(&[1.0], &[1.0, 0.0]).is_err());
    }
}
