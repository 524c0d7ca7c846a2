//! Conversation export parsing.
//!
//! An export is a JSON array of conversations, each holding a node mapping
//! shaped as a tree. Parsing walks the active path of every tree and turns
//! message payloads into [`MessageRecord`] drafts that have no source id or
//! sequence index yet.

mod content;
mod tree;

pub use content::{ExportContent, normalize_timestamp};
pub use tree::{ExportNode, ExportTree};

use crate::catalog::now_seconds;
use crate::error::ChronicleCoreError;
use chronicle_rs_memory::{ContentKind, MessageRecord, SourceKind};
use chronicle_rs_protocol::Role;
use log::{debug, info};
use serde_json::Value;

pub const UNTITLED_CHAT: &str = "Untitled Chat";

/// One parsed conversation, consumed by the importer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationExport {
    pub title: String,
    /// Epoch seconds.
    pub create_time: f64,
    /// Epoch seconds.
    pub update_time: f64,
    pub messages: Vec<MessageRecord>,
}

/// Result of parsing a whole export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedExport {
    pub conversations: Vec<ConversationExport>,
    /// Conversations that had no root or no usable messages.
    pub dropped: usize,
}

/// Parse an export document.
///
/// Only a non-array document is an error; broken conversations are counted
/// in [`ParsedExport::dropped`].
pub fn parse_export(document: &Value) -> Result<ParsedExport, ChronicleCoreError> {
    let Some(conversations) = document.as_array() else {
        return Err(ChronicleCoreError::InvalidExport(
            "expected a JSON array of conversations".to_string(),
        ));
    };
    let now = now_seconds();
    let mut parsed = ParsedExport::default();
    for conversation in conversations {
        match parse_conversation_at(conversation, now) {
            Some(conversation) => parsed.conversations.push(conversation),
            None => parsed.dropped += 1,
        }
    }
    info!(
        "parsed export (conversations={}, dropped={})",
        parsed.conversations.len(),
        parsed.dropped
    );
    Ok(parsed)
}

/// Parse one conversation object; `None` when it must be dropped.
pub fn parse_conversation(conversation: &Value) -> Option<ConversationExport> {
    parse_conversation_at(conversation, now_seconds())
}

fn parse_conversation_at(conversation: &Value, now: f64) -> Option<ConversationExport> {
    let mapping = conversation.get("mapping")?.as_object()?;
    let tree = ExportTree::from_mapping(mapping)?;

    let mut messages = Vec::new();
    let mut editable_context: Option<(usize, String)> = None;
    for node in tree.active_path() {
        let Some(payload) = node.message.as_ref().filter(|value| !value.is_null()) else {
            continue;
        };
        let Some(record) = parse_message(payload, now) else {
            debug!("skipping unusable export message (node={})", node.id);
            continue;
        };
        if record.content_kind == ContentKind::EditableContext {
            editable_context = Some((messages.len(), record.text));
        } else {
            messages.push(record);
        }
    }

    if let Some((position, instructions)) = editable_context {
        match messages.iter_mut().skip(position).find(|record| !record.hidden) {
            Some(target) => target.custom_instructions = Some(instructions),
            None => debug!("custom instructions have no visible message to attach to"),
        }
    }

    let usable = messages.iter().any(|record| {
        !record.hidden
            && (!record.text.trim().is_empty()
                || record
                    .custom_instructions
                    .as_deref()
                    .is_some_and(|text| !text.trim().is_empty()))
    });
    if !usable {
        debug!("dropping conversation without visible messages");
        return None;
    }

    let title = conversation
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(UNTITLED_CHAT)
        .to_string();
    Some(ConversationExport {
        title,
        create_time: timestamp_field(conversation, "create_time", now),
        update_time: timestamp_field(conversation, "update_time", now),
        messages,
    })
}

fn parse_message(payload: &Value, now: f64) -> Option<MessageRecord> {
    let payload = payload.as_object()?;
    let role = payload
        .get("author")
        .and_then(|author| author.get("role"))
        .and_then(Value::as_str)
        .and_then(Role::parse)?;
    let content = ExportContent::from_value(payload.get("content"));
    let empty = serde_json::Map::new();
    let metadata = payload
        .get("metadata")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let flag = |key: &str| metadata.get(key).and_then(Value::as_bool).unwrap_or(false);

    let kind = content.kind();
    let hidden = flag("is_visually_hidden_from_conversation")
        || role == Role::Tool
        || (role == Role::Assistant && kind == ContentKind::Code);

    let mut record = MessageRecord::new(
        String::new(),
        SourceKind::ConversationImport,
        role,
        content.text(),
    );
    record.content_kind = kind;
    record.hidden = hidden;
    record.created_at = payload
        .get("create_time")
        .and_then(Value::as_f64)
        .map_or(0.0, |raw| normalize_timestamp(raw, now));
    record.model = metadata
        .get("model_slug")
        .and_then(Value::as_str)
        .filter(|slug| !slug.is_empty())
        .map(str::to_string);
    record.citations = metadata
        .get("citations")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    record.media_ref = content.media_ref().map(str::to_string);
    if flag("is_user_system_message") {
        record.custom_instructions = metadata
            .get("user_context_message_data")
            .and_then(|data| data.get("about_model_message"))
            .and_then(Value::as_str)
            .map(str::to_string);
    }
    Some(record)
}

fn timestamp_field(conversation: &Value, key: &str, now: f64) -> f64 {
    conversation
        .get(key)
        .and_then(Value::as_f64)
        .map_or(0.0, |raw| normalize_timestamp(raw, now))
}

#[cfg(test)]
mod tests {
    use super::{UNTITLED_CHAT, parse_conversation, parse_export};
    use chronicle_rs_memory::ContentKind;
    use chronicle_rs_protocol::Role;
    use chronicle_rs_test_utils::{ExportBuilder, NodeSpec};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn walk_order_is_first_child_descent() {
        let conversation = ExportBuilder::new("Walk")
            .node(NodeSpec::user("one"))
            .branch(NodeSpec::user("alternate"))
            .node(NodeSpec::assistant("two"))
            .node(NodeSpec::user("three"))
            .build();
        let parsed = parse_conversation(&conversation).expect("parsed");
        let texts: Vec<&str> = parsed.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn hidden_rule_covers_flag_tool_and_assistant_code() {
        let conversation = ExportBuilder::new("Hidden")
            .node(NodeSpec::user("visible"))
            .node(NodeSpec::user("flagged").hidden())
            .node(NodeSpec::tool("tool output"))
            .node(NodeSpec::assistant_code("print(1)"))
            .node(NodeSpec::assistant("answer"))
            .build();
        let parsed = parse_conversation(&conversation).expect("parsed");
        let hidden: Vec<bool> = parsed.messages.iter().map(|m| m.hidden).collect();
        assert_eq!(hidden, vec![false, true, true, true, false]);
        assert_eq!(parsed.messages[3].content_kind, ContentKind::Code);
        assert_eq!(parsed.messages[2].role, Role::Tool);
    }

    #[test]
    fn editable_context_moves_to_next_visible_message() {
        let conversation = ExportBuilder::new("Instructions")
            .node(NodeSpec::editable_context("first"))
            .node(NodeSpec::editable_context("be terse"))
            .node(NodeSpec::tool("hidden"))
            .node(NodeSpec::user("question"))
            .build();
        let parsed = parse_conversation(&conversation).expect("parsed");
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[0].custom_instructions, None);
        assert_eq!(parsed.messages[1].custom_instructions.as_deref(), Some("be terse"));
    }

    #[test]
    fn metadata_fields_are_carried() {
        let conversation = ExportBuilder::new("Meta")
            .times(1_700_000_000_000.0, 1_700_000_100.0)
            .node(NodeSpec::user("about me").user_system("likes rust"))
            .node(
                NodeSpec::assistant("cited【1†source】")
                    .model("gpt-4o")
                    .citations(vec![json!({"start_ix": 5})])
                    .created(1_700_000_050_000.0),
            )
            .build();
        let parsed = parse_conversation(&conversation).expect("parsed");
        assert_eq!(parsed.title, "Meta");
        assert_eq!(parsed.create_time, 1_700_000_000.0);
        assert_eq!(parsed.update_time, 1_700_000_100.0);
        assert_eq!(parsed.messages[0].custom_instructions.as_deref(), Some("likes rust"));
        let answer = &parsed.messages[1];
        assert_eq!(answer.model.as_deref(), Some("gpt-4o"));
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.created_at, 1_700_000_050.0);
        assert_eq!(parsed.messages[0].created_at, 0.0);
    }

    #[test]
    fn untitled_and_empty_conversations() {
        let conversation = ExportBuilder::untitled().node(NodeSpec::user("hi")).build();
        let parsed = parse_conversation(&conversation).expect("parsed");
        assert_eq!(parsed.title, UNTITLED_CHAT);

        let only_context = ExportBuilder::new("Empty")
            .node(NodeSpec::editable_context("x"))
            .build();
        assert!(parse_conversation(&only_context).is_none());
    }

    #[test]
    fn conversations_without_visible_text_are_dropped() {
        let only_tool = ExportBuilder::new("OnlyTool")
            .node(NodeSpec::tool("x"))
            .build();
        assert!(parse_conversation(&only_tool).is_none());

        let hidden_and_blank = ExportBuilder::new("Hidden")
            .node(NodeSpec::assistant_code("print(1)"))
            .node(NodeSpec::user("secret").hidden())
            .node(NodeSpec::user("   "))
            .build();
        assert!(parse_conversation(&hidden_and_blank).is_none());

        let parsed = parse_export(&json!([only_tool, hidden_and_blank])).expect("parsed");
        assert!(parsed.conversations.is_empty());
        assert_eq!(parsed.dropped, 2);
    }

    #[test]
    fn instructions_alone_keep_a_blank_message() {
        let conversation = ExportBuilder::new("Context")
            .node(NodeSpec::editable_context("answer in french"))
            .node(NodeSpec::user(""))
            .build();
        let parsed = parse_conversation(&conversation).expect("parsed");
        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(
            parsed.messages[0].custom_instructions.as_deref(),
            Some("answer in french")
        );
    }

    #[test]
    fn export_counts_dropped_conversations() {
        let rootless = json!({
            "title": "Loop",
            "mapping": {"a": {"parent": "a", "children": []}}
        });
        let good = ExportBuilder::new("Good").node(NodeSpec::user("hi")).build();
        let parsed = parse_export(&json!([good, rootless, 42])).expect("parsed");
        assert_eq!(parsed.conversations.len(), 1);
        assert_eq!(parsed.dropped, 2);
        assert!(parse_export(&json!({"not": "array"})).is_err());
    }

    #[test]
    fn malformed_nodes_do_not_abort_the_walk() {
        let conversation = json!({
            "title": "Broken",
            "mapping": {
                "r": {"message": null, "parent": null, "children": ["a"]},
                "a": {"message": {"author": {"role": "narrator"}}, "parent": "r", "children": ["b"]},
                "b": {"message": "not an object", "parent": "a", "children": ["c"]},
                "c": {
                    "message": {"author": {"role": "user"}, "content": {"content_type": "text", "parts": ["kept"]}},
                    "parent": "b",
                    "children": []
                }
            }
        });
        let parsed = parse_conversation(&conversation).expect("parsed");
        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(parsed.messages[0].text, "kept");
    }
}
