//! In-process vector index, optionally persisted as a JSONL log.

use crate::backend::{ScoredEntry, StoredEntry, VectorBackend, cosine_distance};
use crate::error::MemoryError;
use crate::filter::Filter;
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Brute-force cosine index over all entries.
///
/// With a path, additions are appended to the log and deletions rewrite it
/// through a temp file and rename.
#[derive(Debug)]
pub struct LocalVectorBackend {
    path: Option<PathBuf>,
    entries: RwLock<Vec<StoredEntry>>,
}

impl LocalVectorBackend {
    /// Create a volatile index.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Open (or create) an index persisted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entries = load_entries(&path)?;
        info!(
            "opened local vector index (path={}, entries={})",
            path.display(),
            entries.len()
        );
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn append_to_log(&self, entries: &[StoredEntry]) -> Result<(), MemoryError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for entry in entries {
            let line = serde_json::to_string(entry)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    fn rewrite_log(&self, entries: &[StoredEntry]) -> Result<(), MemoryError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        let temp_path = path.with_extension("jsonl.tmp");
        {
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&temp_path)?;
            for entry in entries {
                let line = serde_json::to_string(entry)?;
                writeln!(file, "{line}")?;
            }
        }
        fs::rename(temp_path, path)?;
        Ok(())
    }
}

fn load_entries(path: &Path) -> Result<Vec<StoredEntry>, MemoryError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(OpenOptions::new().read(true).open(path)?);
    let mut entries = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredEntry>(&line) {
            Ok(entry) => entries.push(entry),
            // A torn final write must not make the whole index unreadable.
            Err(err) => warn!(
                "skipping corrupt index line (path={}, line={}, error={})",
                path.display(),
                line_no + 1,
                err
            ),
        }
    }
    Ok(entries)
}

#[async_trait]
impl VectorBackend for LocalVectorBackend {
    async fn add(&self, entries: Vec<StoredEntry>) -> Result<usize, MemoryError> {
        let mut guard = self.entries.write();
        let mut seen: HashSet<String> = guard.iter().map(|entry| entry.id.clone()).collect();
        let mut fresh = Vec::with_capacity(entries.len());
        for entry in entries {
            if seen.insert(entry.id.clone()) {
                fresh.push(entry);
            } else {
                warn!("skipping duplicate entry id (id={})", entry.id);
            }
        }
        self.append_to_log(&fresh)?;
        let added = fresh.len();
        guard.extend(fresh);
        debug!("added entries to local index (added={}, total={})", added, guard.len());
        Ok(added)
    }

    async fn get(&self, filter: &Filter) -> Result<Vec<StoredEntry>, MemoryError> {
        let guard = self.entries.read();
        Ok(guard
            .iter()
            .filter(|entry| filter.matches(&entry.metadata))
            .cloned()
            .collect())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_n: usize,
        filter: &Filter,
    ) -> Result<Vec<ScoredEntry>, MemoryError> {
        if top_n == 0 {
            return Ok(Vec::new());
        }
        let guard = self.entries.read();
        let mut scored = Vec::new();
        for entry in guard.iter().filter(|entry| filter.matches(&entry.metadata)) {
            let distance = cosine_distance(embedding, &entry.embedding)?;
            scored.push((distance, entry));
        }
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(scored
            .into_iter()
            .take(top_n)
            .map(|(distance, entry)| ScoredEntry {
                entry: entry.clone(),
                distance,
            })
            .collect())
    }

    async fn delete(&self, filter: &Filter) -> Result<usize, MemoryError> {
        if filter.is_empty() {
            return Err(MemoryError::EmptyFilter);
        }
        let mut guard = self.entries.write();
        let before = guard.len();
        let kept: Vec<StoredEntry> = guard
            .iter()
            .filter(|entry| !filter.matches(&entry.metadata))
            .cloned()
            .collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.rewrite_log(&kept)?;
            *guard = kept;
        }
        debug!("deleted entries from local index (removed={})", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::LocalVectorBackend;
    use crate::backend::{StoredEntry, VectorBackend};
    use crate::error::MemoryError;
    use crate::filter::Filter;
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value, json};
    use tempfile::tempdir;

    fn entry(id: &str, source: &str, embedding: Vec<f32>) -> StoredEntry {
        let mut metadata = Map::new();
        metadata.insert("source_id".to_string(), Value::from(source));
        StoredEntry {
            id: id.to_string(),
            document: format!("doc {id}"),
            embedding,
            metadata,
        }
    }

    #[tokio::test]
    async fn duplicate_ids_are_skipped() {
        let backend = LocalVectorBackend::in_memory();
        let added = backend
            .add(vec![entry("a", "s", vec![1.0]), entry("a", "s", vec![2.0])])
            .await
            .expect("add");
        assert_eq!(added, 1);
        let added = backend.add(vec![entry("a", "s", vec![3.0])]).await.expect("add");
        assert_eq!(added, 0);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn query_ranks_by_distance_within_filter() {
        let backend = LocalVectorBackend::in_memory();
        backend
            .add(vec![
                entry("near", "s1", vec![1.0, 0.1]),
                entry("far", "s1", vec![0.0, 1.0]),
                entry("other", "s2", vec![1.0, 0.0]),
            ])
            .await
            .expect("add");

        let hits = backend
            .query(&[1.0, 0.0], 5, &Filter::source_id("s1"))
            .await
            .expect("query");
        let ids: Vec<&str> = hits.iter().map(|hit| hit.entry.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "far"]);

        let hits = backend.query(&[1.0, 0.0], 1, &Filter::new()).await.expect("query");
        assert_eq!(hits[0].entry.id, "other");
    }

    #[tokio::test]
    async fn delete_rewrites_log_and_survives_reopen() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("index.jsonl");
        {
            let backend = LocalVectorBackend::open(&path).expect("open");
            backend
                .add(vec![entry("a", "s1", vec![1.0]), entry("b", "s2", vec![1.0])])
                .await
                .expect("add");
            let removed = backend.delete(&Filter::source_id("s1")).await.expect("delete");
            assert_eq!(removed, 1);
        }
        let reopened = LocalVectorBackend::open(&path).expect("reopen");
        let remaining = reopened.get(&Filter::new()).await.expect("get");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].metadata["source_id"], json!("s2"));
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped_on_open() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("index.jsonl");
        let good = serde_json::to_string(&entry("a", "s", vec![1.0])).expect("json");
        std::fs::write(&path, format!("{good}\n{{\"id\": \"trunc")).expect("write");
        let backend = LocalVectorBackend::open(&path).expect("open");
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn delete_requires_conditions() {
        let backend = LocalVectorBackend::in_memory();
        let err = backend.delete(&Filter::new()).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmptyFilter));
    }
}
