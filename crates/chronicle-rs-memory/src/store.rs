//! Memory store facade over a vector backend and an embedder.

use crate::backend::VectorBackend;
use crate::embedder::Embedder;
use crate::error::MemoryError;
use crate::filter::Filter;
use crate::local::LocalVectorBackend;
use crate::model::{MessageRecord, SourceKind};
use crate::sequencer::Sequencer;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// A query hit decoded into a record.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: MessageRecord,
    pub distance: f32,
}

/// Record-level access to the memory backend.
///
/// Without a backend the store is *unavailable*: writes are dropped, reads
/// are empty and appends return `None`. Callers cannot tell this apart from
/// an empty store except through [`MemoryStore::is_available`].
#[derive(Clone)]
pub struct MemoryStore {
    backend: Option<Arc<dyn VectorBackend>>,
    embedder: Arc<dyn Embedder>,
    sequencer: Arc<Sequencer>,
}

impl MemoryStore {
    pub fn new(backend: Arc<dyn VectorBackend>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            backend: Some(backend),
            embedder,
            sequencer: Arc::new(Sequencer::new()),
        }
    }

    pub fn unavailable(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            backend: None,
            embedder,
            sequencer: Arc::new(Sequencer::new()),
        }
    }

    /// Open the local backend at `path`, degrading to unavailable on failure.
    pub fn open_local(path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Self {
        match LocalVectorBackend::open(path.as_ref()) {
            Ok(backend) => Self::new(Arc::new(backend), embedder),
            Err(err) => {
                error!(
                    "memory backend unavailable, store degraded to no-op (path={}, error={})",
                    path.as_ref().display(),
                    err
                );
                Self::unavailable(embedder)
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn backend_for(&self, operation: &str) -> Option<&Arc<dyn VectorBackend>> {
        if self.backend.is_none() {
            debug!("memory store unavailable, skipping {}", operation);
        }
        self.backend.as_ref()
    }

    /// Persist records, embedding all texts in one batch call.
    pub async fn add(&self, records: Vec<MessageRecord>) -> Result<usize, MemoryError> {
        if records.is_empty() {
            return Ok(0);
        }
        if self.backend.is_none() {
            warn!("memory store unavailable, dropping {} records", records.len());
            return Ok(0);
        }
        let texts = records.iter().map(|record| record.text.clone()).collect();
        let embeddings = self.embed_batch(texts).await?;
        self.add_with_embeddings(records, embeddings).await
    }

    /// Persist records with caller-supplied vectors, one per record.
    pub async fn add_with_embeddings(
        &self,
        records: Vec<MessageRecord>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<usize, MemoryError> {
        if records.len() != embeddings.len() {
            return Err(MemoryError::EmbeddingCount {
                expected: records.len(),
                found: embeddings.len(),
            });
        }
        let Some(backend) = self.backend.as_ref() else {
            warn!("memory store unavailable, dropping {} records", records.len());
            return Ok(0);
        };
        let sources: BTreeSet<String> = records
            .iter()
            .map(|record| record.source_id.clone())
            .collect();
        let entries = records
            .iter()
            .zip(embeddings)
            .map(|(record, embedding)| record.to_entry(embedding))
            .collect();
        // Bulk writes carry their own indices; live counters reseed from storage.
        // Slots are taken in sorted order and held across the write.
        let mut slots = Vec::with_capacity(sources.len());
        for source in &sources {
            slots.push(self.sequencer.lock(source).await);
        }
        let added = backend.add(entries).await?;
        for slot in &mut slots {
            slot.reset();
        }
        drop(slots);
        info!(
            "stored records (added={}, sources={})",
            added,
            sources.len()
        );
        Ok(added)
    }

    /// All records matching the filter, unordered.
    ///
    /// Entries whose metadata does not decode are skipped.
    pub async fn get(&self, filter: &Filter) -> Result<Vec<MessageRecord>, MemoryError> {
        let Some(backend) = self.backend_for("get") else {
            return Ok(Vec::new());
        };
        let entries = backend.get(filter).await?;
        Ok(entries
            .iter()
            .filter_map(|entry| match MessageRecord::from_entry(entry) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!("skipping undecodable entry ({})", err);
                    None
                }
            })
            .collect())
    }

    /// All records owned by one source.
    pub async fn records_for_source(
        &self,
        source_id: &str,
    ) -> Result<Vec<MessageRecord>, MemoryError> {
        self.get(&Filter::source_id(source_id)).await
    }

    /// The `top_n` records nearest to `query_text`, optionally limited to
    /// the given sources.
    pub async fn query(
        &self,
        query_text: &str,
        top_n: usize,
        source_ids: Option<&[String]>,
    ) -> Result<Vec<ScoredRecord>, MemoryError> {
        let Some(backend) = self.backend_for("query") else {
            return Ok(Vec::new());
        };
        let filter = match source_ids {
            Some(ids) if !ids.is_empty() => Filter::source_ids(ids.iter().cloned()),
            _ => Filter::new(),
        };
        let mut embeddings = self.embed_batch(vec![query_text.to_string()]).await?;
        let Some(embedding) = embeddings.pop() else {
            return Err(MemoryError::EmbeddingCount {
                expected: 1,
                found: 0,
            });
        };
        let hits = backend.query(&embedding, top_n, &filter).await?;
        debug!(
            "memory query (top_n={}, filtered={}, hits={})",
            top_n,
            !filter.is_empty(),
            hits.len()
        );
        Ok(hits
            .into_iter()
            .filter_map(|hit| match MessageRecord::from_entry(&hit.entry) {
                Ok(record) => Some(ScoredRecord {
                    record,
                    distance: hit.distance,
                }),
                Err(err) => {
                    warn!("skipping undecodable query hit ({})", err);
                    None
                }
            })
            .collect())
    }

    /// Remove all records matching the filter.
    pub async fn delete(&self, filter: &Filter) -> Result<usize, MemoryError> {
        let Some(backend) = self.backend_for("delete") else {
            return Ok(0);
        };
        backend.delete(filter).await
    }

    /// Remove every record of a source and reset its sequence counter.
    pub async fn delete_source(&self, source_id: &str) -> Result<usize, MemoryError> {
        let mut slot = self.sequencer.lock(source_id).await;
        let removed = self.delete(&Filter::source_id(source_id)).await?;
        slot.reset();
        drop(slot);
        info!(
            "deleted source records (source_id={}, removed={})",
            source_id, removed
        );
        Ok(removed)
    }

    /// Persist one live-turn record at the next free sequence index.
    ///
    /// The per-source slot is held across the backend write, so concurrent
    /// appends to one source receive distinct, increasing indices.
    pub async fn append(
        &self,
        mut record: MessageRecord,
    ) -> Result<Option<MessageRecord>, MemoryError> {
        let Some(backend) = self.backend.as_ref() else {
            warn!(
                "memory store unavailable, dropping appended record (source_id={})",
                record.source_id
            );
            return Ok(None);
        };
        let mut slot = self.sequencer.lock(&record.source_id).await;
        if slot.needs_seed() {
            let existing = backend.get(&Filter::source_id(&record.source_id)).await?;
            let next = existing
                .iter()
                .filter_map(|entry| entry.metadata.get("sequence_index"))
                .filter_map(|value| value.as_u64())
                .max()
                .map_or(existing.len() as u64, |max| max + 1);
            slot.seed(next);
        }
        record.source_kind = SourceKind::LiveChat;
        record.sequence_index = Some(slot.peek());

        let mut embeddings = self.embed_batch(vec![record.text.clone()]).await?;
        let Some(embedding) = embeddings.pop() else {
            return Err(MemoryError::EmbeddingCount {
                expected: 1,
                found: 0,
            });
        };
        backend.add(vec![record.to_entry(embedding)]).await?;
        slot.commit();
        debug!(
            "appended record (source_id={}, role={}, sequence_index={})",
            record.source_id,
            record.role,
            slot.peek() - 1
        );
        Ok(Some(record))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError> {
        let expected = texts.len();
        let embeddings = self.embedder.embed(texts).await?;
        if embeddings.len() != expected {
            return Err(MemoryError::EmbeddingCount {
                expected,
                found: embeddings.len(),
            });
        }
        Ok(embeddings)
    }
}
