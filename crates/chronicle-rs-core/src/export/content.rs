//! Message payload content kinds.

use chronicle_rs_memory::ContentKind;
use serde_json::Value;

/// Content of an export message, one variant per payload kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportContent {
    Text(String),
    Code(String),
    /// Multimodal payload carrying at least one image asset.
    ImagePointer { text: String, asset_pointer: String },
    EditableContext(String),
    /// Any other payload, kept as its serialized JSON.
    Unknown(String),
}

impl ExportContent {
    pub fn from_value(content: Option<&Value>) -> Self {
        let Some(content) = content.filter(|value| !value.is_null()) else {
            return ExportContent::Text(String::new());
        };
        let str_field = |key: &str| {
            content
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        match content.get("content_type").and_then(Value::as_str) {
            Some("text") => ExportContent::Text(join_text_parts(content)),
            Some("code") => ExportContent::Code(str_field("text")),
            Some("user_editable_context") => {
                ExportContent::EditableContext(str_field("user_instructions"))
            }
            Some("multimodal_text") => match first_asset_pointer(content) {
                Some(asset_pointer) => ExportContent::ImagePointer {
                    text: join_text_parts(content),
                    asset_pointer,
                },
                None => ExportContent::Text(join_text_parts(content)),
            },
            _ => ExportContent::Unknown(content.to_string()),
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            ExportContent::Text(_) => ContentKind::Text,
            ExportContent::Code(_) => ContentKind::Code,
            ExportContent::ImagePointer { .. } => ContentKind::ImagePointer,
            ExportContent::EditableContext(_) => ContentKind::EditableContext,
            ExportContent::Unknown(_) => ContentKind::Unknown,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ExportContent::Text(text)
            | ExportContent::Code(text)
            | ExportContent::EditableContext(text)
            | ExportContent::Unknown(text) => text,
            ExportContent::ImagePointer { text, .. } => text,
        }
    }

    pub fn media_ref(&self) -> Option<&str> {
        match self {
            ExportContent::ImagePointer { asset_pointer, .. } => Some(asset_pointer),
            _ => None,
        }
    }
}

/// Concatenate string parts; structured parts are ignored.
fn join_text_parts(content: &Value) -> String {
    content
        .get("parts")
        .and_then(Value::as_array)
        .map(|parts| parts.iter().filter_map(Value::as_str).collect::<String>())
        .unwrap_or_default()
}

fn first_asset_pointer(content: &Value) -> Option<String> {
    content
        .get("parts")?
        .as_array()?
        .iter()
        .filter(|part| {
            part.get("content_type").and_then(Value::as_str) == Some("image_asset_pointer")
        })
        .find_map(|part| part.get("asset_pointer").and_then(Value::as_str))
        .map(str::to_string)
}

/// Normalize an epoch value to seconds.
///
/// Values larger than `now * 100` can only be milliseconds.
pub fn normalize_timestamp(raw: f64, now: f64) -> f64 {
    if raw.abs() > now * 100.0 {
        raw / 1000.0
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::{ExportContent, normalize_timestamp};
    use chronicle_rs_memory::ContentKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn text_parts_skip_structured_entries() {
        let content = json!({"content_type": "text", "parts": ["a", {"x": 1}, "b"]});
        let parsed = ExportContent::from_value(Some(&content));
        assert_eq!(parsed, ExportContent::Text("ab".to_string()));
    }

    #[test]
    fn code_and_editable_context_use_their_fields() {
        let code = json!({"content_type": "code", "text": "{\"a\":1}"});
        assert_eq!(ExportContent::from_value(Some(&code)).text(), "{\"a\":1}");
        let context = json!({"content_type": "user_editable_context", "user_instructions": "be brief"});
        let parsed = ExportContent::from_value(Some(&context));
        assert_eq!(parsed.kind(), ContentKind::EditableContext);
        assert_eq!(parsed.text(), "be brief");
    }

    #[test]
    fn image_pointer_keeps_first_asset() {
        let content = json!({
            "content_type": "multimodal_text",
            "parts": [
                {"content_type": "image_asset_pointer", "asset_pointer": "file-service://one"},
                "look at this",
                {"content_type": "image_asset_pointer", "asset_pointer": "file-service://two"},
            ]
        });
        let parsed = ExportContent::from_value(Some(&content));
        assert_eq!(parsed.kind(), ContentKind::ImagePointer);
        assert_eq!(parsed.text(), "look at this");
        assert_eq!(parsed.media_ref(), Some("file-service://one"));
    }

    #[test]
    fn unknown_kinds_are_serialized() {
        let content = json!({"content_type": "tether_quote", "url": "u"});
        let parsed = ExportContent::from_value(Some(&content));
        assert_eq!(parsed.kind(), ContentKind::Unknown);
        assert!(parsed.text().contains("tether_quote"));
        assert_eq!(ExportContent::from_value(None), ExportContent::Text(String::new()));
    }

    #[test]
    fn millisecond_timestamps_are_scaled() {
        let now = 1_700_000_000.0;
        assert_eq!(normalize_timestamp(1_690_000_000.0, now), 1_690_000_000.0);
        assert_eq!(normalize_timestamp(1_690_000_000_000.0, now), 1_690_000_000.0);
        assert_eq!(normalize_timestamp(0.0, now), 0.0);
    }
}
