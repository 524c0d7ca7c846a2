//! Display view of a stored conversation.
//!
//! The assembler reads every record of one source, orders them, folds hidden
//! tool steps into the visible assistant turns around them, rewrites
//! citation markers and cuts the result into pages. It never writes.

mod citations;
mod merge;

pub use citations::rewrite_citations;
pub use merge::{DETAILS_LABEL, merge_hidden_steps, order_records};

use chronicle_rs_memory::{ContentKind, MemoryError, MemoryStore, MessageRecord};
use chronicle_rs_protocol::Role;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One piece of a merged unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { content: String },
    /// Collapsible block describing an internal research step.
    Details { title: String, content: String },
}

impl ContentPart {
    pub fn text(content: impl Into<String>) -> Self {
        ContentPart::Text {
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayContent {
    Text { text: String },
    Parts { parts: Vec<ContentPart> },
}

impl DisplayContent {
    pub fn text(text: impl Into<String>) -> Self {
        DisplayContent::Text { text: text.into() }
    }
}

/// One user-facing entry of a conversation view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayUnit {
    /// Id of the record the unit's fields come from.
    pub id: String,
    pub role: Role,
    pub content: DisplayContent,
    pub content_kind: ContentKind,
    pub timestamp: f64,
    pub sequence_index: Option<u64>,
    pub model: Option<String>,
    pub citations: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<String>,
    /// True when built from a leading and a trailing assistant message.
    pub merged: bool,
}

impl DisplayUnit {
    pub fn from_record(record: &MessageRecord) -> Self {
        Self {
            id: record.id.clone(),
            role: record.role,
            content: DisplayContent::text(record.text.clone()),
            content_kind: record.content_kind,
            timestamp: record.created_at,
            sequence_index: record.sequence_index,
            model: record.model.clone(),
            citations: record.citations.clone(),
            custom_instructions: record.custom_instructions.clone(),
            media_ref: record.media_ref.clone(),
            merged: false,
        }
    }

    /// Plain text of the unit; text parts are joined by a blank line and
    /// details blocks are left out.
    pub fn plain_text(&self) -> String {
        match &self.content {
            DisplayContent::Text { text } => text.clone(),
            DisplayContent::Parts { parts } => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { content } => Some(content.as_str()),
                    ContentPart::Details { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }

    fn rewrite_citations(&mut self) {
        match &mut self.content {
            DisplayContent::Text { text } => *text = rewrite_citations(text),
            DisplayContent::Parts { parts } => {
                for part in parts {
                    if let ContentPart::Text { content } = part {
                        *content = rewrite_citations(content);
                    }
                }
            }
        }
    }
}

/// One page of a conversation view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<DisplayUnit>,
    pub total_messages_in_chat: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Build the full display sequence from an unordered record set.
///
/// File chunks are ignored.
pub fn assemble_records(mut records: Vec<MessageRecord>) -> Vec<DisplayUnit> {
    records.retain(|record| record.source_kind.is_conversation());
    order_records(&mut records);
    let mut units = merge_hidden_steps(&records);
    for unit in &mut units {
        unit.rewrite_citations();
    }
    units
}

/// Slice out a 1-based page; `page` and `page_size` below 1 count as 1.
pub fn paginate(units: Vec<DisplayUnit>, page: usize, page_size: usize) -> MessagePage {
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total = units.len();
    let messages = units
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();
    MessagePage {
        messages,
        total_messages_in_chat: total,
        page,
        page_size,
    }
}

/// Read-only view builder over the memory store.
#[derive(Clone)]
pub struct MessageAssembler {
    store: MemoryStore,
}

impl MessageAssembler {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    /// Every display unit of a source, oldest first.
    pub async fn assemble(&self, source_id: &str) -> Result<Vec<DisplayUnit>, MemoryError> {
        let records = self.store.records_for_source(source_id).await?;
        let record_count = records.len();
        let units = assemble_records(records);
        debug!(
            "assembled conversation view (source_id={}, records={}, units={})",
            source_id,
            record_count,
            units.len()
        );
        Ok(units)
    }

    pub async fn page(
        &self,
        source_id: &str,
        page: usize,
        page_size: usize,
    ) -> Result<MessagePage, MemoryError> {
        let units = self.assemble(source_id).await?;
        Ok(paginate(units, page, page_size))
    }

    /// The last `limit` units, oldest first.
    pub async fn recent(
        &self,
        source_id: &str,
        limit: usize,
    ) -> Result<Vec<DisplayUnit>, MemoryError> {
        let mut units = self.assemble(source_id).await?;
        let skip = units.len().saturating_sub(limit);
        Ok(units.split_off(skip))
    }
}

#[cfg(test)]
mod tests {
    use super::{ContentPart, DisplayContent, assemble_records, paginate};
    use chronicle_rs_memory::{MessageRecord, SourceKind};
    use chronicle_rs_protocol::Role;
    use pretty_assertions::assert_eq;

    fn record(index: u64, role: Role, text: &str) -> MessageRecord {
        let mut record = MessageRecord::new("chat", SourceKind::ConversationImport, role, text);
        record.id = format!("r{index:02}");
        record.sequence_index = Some(index);
        record
    }

    fn sample() -> Vec<MessageRecord> {
        let mut hidden = record(3, Role::Assistant, r#"{"title": "T", "prompt": "P"}"#);
        hidden.hidden = true;
        hidden.content_kind = chronicle_rs_memory::ContentKind::Code;
        let mut chunk = record(9, Role::System, "file text");
        chunk.source_kind = SourceKind::FileChunk;
        vec![
            record(4, Role::Assistant, "Done【1†x】【1†y】\n**Sources:** list"),
            chunk,
            record(0, Role::User, "hello"),
            hidden,
            record(1, Role::Assistant, "hi【2†embed_image】"),
            record(2, Role::User, "research this"),
        ]
    }

    #[test]
    fn assembly_orders_merges_and_rewrites() {
        let units = assemble_records(sample());
        let contents: Vec<DisplayContent> = units.iter().map(|u| u.content.clone()).collect();
        assert_eq!(
            contents,
            vec![
                DisplayContent::text("hello"),
                DisplayContent::text("hi"),
                DisplayContent::text("research this"),
                DisplayContent::Parts {
                    parts: vec![
                        ContentPart::text("Done[CITATION:1]"),
                        ContentPart::Details {
                            title: "Show Research Task Details".to_string(),
                            content: "Title: T\n\nPrompt: P".to_string(),
                        },
                    ]
                },
            ]
        );
    }

    #[test]
    fn assembly_is_byte_identical_across_runs() {
        let first = serde_json::to_string(&assemble_records(sample())).expect("json");
        let mut reversed = sample();
        reversed.reverse();
        let second = serde_json::to_string(&assemble_records(reversed)).expect("json");
        assert_eq!(first, second);
    }

    #[test]
    fn pages_partition_the_sequence() {
        let records: Vec<MessageRecord> = (0..7)
            .map(|i| record(i, Role::User, &format!("m{i}")))
            .collect();
        let units = assemble_records(records);
        for page_size in 1..=8 {
            let mut seen = Vec::new();
            let mut page = 1;
            loop {
                let slice = paginate(units.clone(), page, page_size);
                assert_eq!(slice.total_messages_in_chat, 7);
                if slice.messages.is_empty() {
                    break;
                }
                seen.extend(slice.messages.into_iter().map(|u| u.plain_text()));
                page += 1;
            }
            let expected: Vec<String> = (0..7).map(|i| format!("m{i}")).collect();
            assert_eq!(seen, expected, "page_size={page_size}");
        }
    }

    #[test]
    fn zero_page_values_are_clamped() {
        let units = assemble_records(vec![record(0, Role::User, "only")]);
        let page = paginate(units, 0, 0);
        assert_eq!((page.page, page.page_size), (1, 1));
        assert_eq!(page.messages.len(), 1);
    }
}
