//! Batch import of conversation exports and knowledge files.

use crate::catalog::{ImportOutcome, SessionCatalog, SourceEntry, SourceType, now_seconds};
use crate::error::ChronicleCoreError;
use crate::export::{ConversationExport, parse_export};
use crate::sessions::stable_chat_id;
use crate::tasks::{TaskHandle, TaskRegistry, TaskStatus};
use chronicle_rs_config::ImportConfig;
use chronicle_rs_memory::{MemoryStore, MessageRecord, SourceKind};
use chronicle_rs_protocol::Role;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

const DOCUMENT_EXTENSIONS: &[&str] = &[".txt", ".md"];

/// Counts reported by an export import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// New or updated chats.
    pub imported: usize,
    /// Chats already present with data at least as new.
    pub skipped: usize,
    /// Conversations that could not be parsed into any message.
    pub dropped: usize,
}

impl ImportSummary {
    pub fn message(&self) -> String {
        if self.imported == 0 && self.skipped == 0 {
            return "File processed, no new conversations found.".to_string();
        }
        format!(
            "Import complete. Added {} new/updated chats. Skipped {} duplicates.",
            self.imported, self.skipped
        )
    }
}

/// Split text into windows of `chunk_size` characters, each starting
/// `chunk_size - chunk_overlap` characters after the previous one.
///
/// The last window ends at the end of the text.
pub fn split_text_into_chunks(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = chunk_size.max(1);
    let step = size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

pub fn is_supported_document(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    DOCUMENT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Drives exports and documents into the catalog and the memory store.
#[derive(Clone)]
pub struct Importer {
    catalog: Arc<dyn SessionCatalog>,
    store: MemoryStore,
    tasks: TaskRegistry,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Importer {
    pub fn new(
        catalog: Arc<dyn SessionCatalog>,
        store: MemoryStore,
        tasks: TaskRegistry,
        config: &ImportConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            tasks,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn task_status(&self, task_id: &str) -> Result<TaskStatus, ChronicleCoreError> {
        self.tasks
            .status(task_id)
            .ok_or_else(|| ChronicleCoreError::TaskNotFound(task_id.to_string()))
    }

    /// Import every conversation of an export, newest first.
    ///
    /// A chat is written when it is new or its update time is newer than
    /// the catalog's; replaced chats lose their old records first.
    pub async fn import_export(
        &self,
        document: &Value,
        progress: Option<&TaskHandle>,
    ) -> Result<ImportSummary, ChronicleCoreError> {
        let parsed = parse_export(document)?;
        let mut conversations = parsed.conversations;
        conversations.sort_by(|a, b| b.update_time.total_cmp(&a.update_time));

        let mut summary = ImportSummary {
            dropped: parsed.dropped,
            ..ImportSummary::default()
        };
        let total = conversations.len();
        for (position, conversation) in conversations.into_iter().enumerate() {
            if let Some(handle) = progress {
                let percent = ((position + 1) * 100 / total) as u8;
                handle.progress(
                    percent,
                    format!(
                        "Processing {} of {}: {}",
                        position + 1,
                        total,
                        conversation.title
                    ),
                );
            }
            if self.import_conversation(conversation).await? {
                summary.imported += 1;
            } else {
                summary.skipped += 1;
            }
        }
        info!(
            "import finished (imported={}, skipped={}, dropped={})",
            summary.imported, summary.skipped, summary.dropped
        );
        Ok(summary)
    }

    async fn import_conversation(
        &self,
        conversation: ConversationExport,
    ) -> Result<bool, ChronicleCoreError> {
        let chat_id = stable_chat_id(&conversation.title, conversation.create_time);
        let existing = self.catalog.get(&chat_id)?;
        if existing
            .as_ref()
            .is_some_and(|session| conversation.update_time <= session.last_updated)
        {
            debug!("skipping imported chat with no newer data (id={})", chat_id);
            return Ok(false);
        }

        // Indices follow export order; blank messages leave gaps.
        let records: Vec<MessageRecord> = conversation
            .messages
            .into_iter()
            .enumerate()
            .filter(|(_, record)| {
                !record.text.trim().is_empty() || record.custom_instructions.is_some()
            })
            .map(|(index, mut record)| {
                record.source_id = chat_id.clone();
                record.source_kind = SourceKind::ConversationImport;
                record.sequence_index = Some(index as u64);
                record
            })
            .collect();

        // Catalog last: a failed store write leaves the old entry in place.
        if existing.is_some() {
            self.store.delete_source(&chat_id).await?;
        }
        let stored = self.store.add(records).await?;
        let outcome = self.catalog.import_upsert(
            &chat_id,
            &conversation.title,
            conversation.create_time,
            conversation.update_time,
        )?;
        if outcome == ImportOutcome::Skipped {
            warn!("chat changed during import (id={})", chat_id);
        }
        debug!(
            "imported conversation (chat_id={}, outcome={:?}, records={})",
            chat_id, outcome, stored
        );
        Ok(true)
    }

    /// Store a knowledge file as overlapping chunks under a fresh source.
    ///
    /// Returns `None` when the file has no content.
    pub async fn ingest_document(
        &self,
        filename: &str,
        content: &str,
    ) -> Result<Option<SourceEntry>, ChronicleCoreError> {
        if !is_supported_document(filename) {
            return Err(ChronicleCoreError::UnsupportedDocument(filename.to_string()));
        }
        let chunks = split_text_into_chunks(content, self.chunk_size, self.chunk_overlap);
        if chunks.is_empty() {
            info!("document has no content to process (file={})", filename);
            return Ok(None);
        }
        let file_id = format!("file_{}", Uuid::new_v4().simple());
        let created_at = now_seconds();
        let records: Vec<MessageRecord> = chunks
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let mut record =
                    MessageRecord::new(file_id.clone(), SourceKind::FileChunk, Role::System, chunk);
                record.id = format!("{file_id}chunk{index}");
                record.sequence_index = Some(index as u64);
                record.source_name = Some(filename.to_string());
                record.created_at = created_at;
                record
            })
            .collect();
        let chunk_count = records.len();
        self.store.add(records).await?;
        let entry = self.catalog.add_source(&file_id, filename, SourceType::File)?;
        info!(
            "ingested document (file={}, source_id={}, chunks={})",
            filename, file_id, chunk_count
        );
        Ok(Some(entry))
    }

    /// Run [`Importer::import_export`] on a detached task.
    pub fn spawn_import(&self, document: Value) -> TaskHandle {
        let handle = self
            .tasks
            .create("Upload successful, preparing to import.");
        let importer = self.clone();
        let task = handle.clone();
        tokio::spawn(async move {
            match importer.import_export(&document, Some(&task)).await {
                Ok(summary) => task.complete(summary.message()),
                Err(err) => {
                    error!("background import failed (task_id={}, error={})", task.id(), err);
                    task.fail(format!("An error occurred: {err}"));
                }
            }
        });
        handle
    }

    /// Run [`Importer::ingest_document`] on a detached task.
    ///
    /// Unsupported file types are rejected before any task is created.
    pub fn spawn_ingest(
        &self,
        filename: String,
        content: String,
    ) -> Result<TaskHandle, ChronicleCoreError> {
        if !is_supported_document(&filename) {
            return Err(ChronicleCoreError::UnsupportedDocument(filename));
        }
        let handle = self
            .tasks
            .create(format!("File '{filename}' received and will be processed."));
        let importer = self.clone();
        let task = handle.clone();
        tokio::spawn(async move {
            match importer.ingest_document(&filename, &content).await {
                Ok(Some(entry)) => task.complete(format!(
                    "Stored file {} with source_id {}",
                    entry.name, entry.id
                )),
                Ok(None) => task.complete(format!("File {filename} has no content to process.")),
                Err(err) => {
                    error!("background ingest failed (task_id={}, error={})", task.id(), err);
                    task.fail(format!("An error occurred: {err}"));
                }
            }
        });
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::{ImportSummary, is_supported_document, split_text_into_chunks};
    use pretty_assertions::assert_eq;

    #[test]
    fn chunks_overlap_and_cover_the_text() {
        let text: String = ('a'..='z').collect();
        let chunks = split_text_into_chunks(&text, 10, 4);
        assert_eq!(chunks, vec!["abcdefghij", "ghijklmnop", "mnopqrstuv", "stuvwxyz"]);
        assert!(split_text_into_chunks("", 10, 4).is_empty());
        assert_eq!(split_text_into_chunks("short", 10, 4), vec!["short"]);
    }

    #[test]
    fn chunking_counts_characters_not_bytes() {
        let chunks = split_text_into_chunks("ééééé", 2, 0);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn only_text_and_markdown_are_supported() {
        assert!(is_supported_document("notes.md"));
        assert!(is_supported_document("README.TXT"));
        assert!(!is_supported_document("slides.pdf"));
    }

    #[test]
    fn summary_messages() {
        assert_eq!(
            ImportSummary::default().message(),
            "File processed, no new conversations found."
        );
        let summary = ImportSummary {
            imported: 2,
            skipped: 1,
            dropped: 0,
        };
        assert_eq!(
            summary.message(),
            "Import complete. Added 2 new/updated chats. Skipped 1 duplicates."
        );
    }
}
