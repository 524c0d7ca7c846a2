//! Message record model and its metadata encoding.

use crate::backend::StoredEntry;
use crate::error::MemoryError;
use chronicle_rs_protocol::Role;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// How a record entered the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Parsed from an exported conversation archive.
    ConversationImport,
    /// Written by a live chat turn.
    LiveChat,
    /// A chunk of an ingested knowledge file.
    FileChunk,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::ConversationImport => "conversation_import",
            SourceKind::LiveChat => "live_chat",
            SourceKind::FileChunk => "file_chunk",
        }
    }

    /// True for records that belong to a conversation view.
    pub fn is_conversation(&self) -> bool {
        matches!(self, SourceKind::ConversationImport | SourceKind::LiveChat)
    }
}

/// Kind of content a message carried in its source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    Text,
    Code,
    ImagePointer,
    EditableContext,
    /// Unrecognized payload kept as serialized JSON.
    Unknown,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Code => "code",
            ContentKind::ImagePointer => "image_pointer",
            ContentKind::EditableContext => "editable_context",
            ContentKind::Unknown => "unknown",
        }
    }
}

/// A single stored message or document chunk.
///
/// Records are immutable once written; the store only appends and deletes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub id: String,
    /// Owning conversation or file.
    pub source_id: String,
    pub source_kind: SourceKind,
    pub role: Role,
    pub text: String,
    pub content_kind: ContentKind,
    /// Epoch seconds.
    pub created_at: f64,
    /// Position within the source; unique and increasing per source once stored.
    pub sequence_index: Option<u64>,
    pub hidden: bool,
    pub model: Option<String>,
    /// Raw citation tokens, addressed by index.
    pub citations: Vec<Value>,
    pub custom_instructions: Option<String>,
    pub media_ref: Option<String>,
    /// Display name of the source (file name for chunks).
    pub source_name: Option<String>,
}

impl MessageRecord {
    /// Build a visible text record with a fresh id and no sequence index.
    pub fn new(
        source_id: impl Into<String>,
        source_kind: SourceKind,
        role: Role,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: new_record_id(),
            source_id: source_id.into(),
            source_kind,
            role,
            text: text.into(),
            content_kind: ContentKind::Text,
            created_at: 0.0,
            sequence_index: None,
            hidden: false,
            model: None,
            citations: Vec::new(),
            custom_instructions: None,
            media_ref: None,
            source_name: None,
        }
    }

    /// Encode everything except id and text as backend metadata.
    pub fn to_metadata(&self) -> Map<String, Value> {
        let metadata = RecordMetadata {
            source_id: self.source_id.clone(),
            source_kind: self.source_kind,
            role: self.role,
            content_kind: self.content_kind,
            timestamp: self.created_at,
            sequence_index: self.sequence_index,
            is_hidden: self.hidden,
            model: self.model.clone(),
            citations: self.citations.clone(),
            custom_instructions: self.custom_instructions.clone(),
            media_ref: self.media_ref.clone(),
            source_name: self.source_name.clone(),
        };
        match serde_json::to_value(metadata) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Build a backend entry carrying the given embedding.
    pub fn to_entry(&self, embedding: Vec<f32>) -> StoredEntry {
        StoredEntry {
            id: self.id.clone(),
            document: self.text.clone(),
            embedding,
            metadata: self.to_metadata(),
        }
    }

    /// Decode a record from a backend entry.
    pub fn from_entry(entry: &StoredEntry) -> Result<Self, MemoryError> {
        let metadata: RecordMetadata =
            serde_json::from_value(Value::Object(entry.metadata.clone())).map_err(|err| {
                MemoryError::InvalidRecord {
                    id: entry.id.clone(),
                    message: err.to_string(),
                }
            })?;
        Ok(Self {
            id: entry.id.clone(),
            source_id: metadata.source_id,
            source_kind: metadata.source_kind,
            role: metadata.role,
            text: entry.document.clone(),
            content_kind: metadata.content_kind,
            created_at: metadata.timestamp,
            sequence_index: metadata.sequence_index,
            hidden: metadata.is_hidden,
            model: metadata.model,
            citations: metadata.citations,
            custom_instructions: metadata.custom_instructions,
            media_ref: metadata.media_ref,
            source_name: metadata.source_name,
        })
    }
}

/// Fresh record identifier in the `msg_<hex>` form.
pub fn new_record_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

#[derive(Serialize, Deserialize)]
struct RecordMetadata {
    source_id: String,
    source_kind: SourceKind,
    role: Role,
    #[serde(default)]
    content_kind: ContentKind,
    #[serde(default)]
    timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sequence_index: Option<u64>,
    #[serde(default)]
    is_hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    citations: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    custom_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    media_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_name: Option<String>,
}
