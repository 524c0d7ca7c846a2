//! Ordering and hidden-step merging.

use super::{ContentPart, DisplayContent, DisplayUnit};
use chronicle_rs_memory::{ContentKind, MessageRecord};
use chronicle_rs_protocol::Role;
use serde_json::Value;

pub const DETAILS_LABEL: &str = "Show Research Task Details";

/// Sort by sequence index, then timestamp, then id.
///
/// Records without an index sort first, matching a missing position.
pub fn order_records(records: &mut [MessageRecord]) {
    records.sort_by(|a, b| {
        a.sequence_index
            .cmp(&b.sequence_index)
            .then_with(|| a.created_at.total_cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn is_visible_assistant(record: &MessageRecord) -> bool {
    record.role == Role::Assistant && !record.hidden
}

/// Collapse hidden steps into the visible assistant turns around them.
///
/// `records` must already be ordered. Hidden records never become units of
/// their own. A hidden run between two visible assistant messages merges the
/// three into one unit. A hidden run after anything other than a visible
/// assistant lends its details to the visible assistant directly after it;
/// any other visible message in between discards them. A run that follows
/// a visible assistant but is not closed by another one is dropped.
pub fn merge_hidden_steps(records: &[MessageRecord]) -> Vec<DisplayUnit> {
    let mut units = Vec::new();
    let mut pending_details: Option<ContentPart> = None;
    let mut index = 0;
    while index < records.len() {
        let current = &records[index];
        if current.hidden {
            let run_end = hidden_run_end(records, index);
            if let Some(details) = find_details(&records[index..run_end]) {
                pending_details = Some(details);
            }
            index = run_end;
            continue;
        }

        if !is_visible_assistant(current) {
            pending_details = None;
            units.push(DisplayUnit::from_record(current));
            index += 1;
            continue;
        }

        let run_end = hidden_run_end(records, index + 1);
        match records.get(run_end) {
            Some(trailing) if is_visible_assistant(trailing) => {
                let details = find_details(&records[index + 1..run_end]).or(pending_details.take());
                units.push(merged_unit(current, trailing, details));
                index = run_end + 1;
            }
            _ => {
                let mut unit = DisplayUnit::from_record(current);
                if let Some(details) = pending_details.take() {
                    unit.content = DisplayContent::Parts {
                        parts: vec![ContentPart::text(current.text.clone()), details],
                    };
                }
                units.push(unit);
                index = run_end;
            }
        }
    }
    units
}

/// First index at or after `start` that is not a hidden record.
fn hidden_run_end(records: &[MessageRecord], start: usize) -> usize {
    let mut end = start;
    while records.get(end).is_some_and(|record| record.hidden) {
        end += 1;
    }
    end
}

fn merged_unit(
    leading: &MessageRecord,
    trailing: &MessageRecord,
    details: Option<ContentPart>,
) -> DisplayUnit {
    let mut parts = vec![ContentPart::text(leading.text.clone())];
    parts.extend(details);
    if !trailing.text.is_empty() && trailing.text != leading.text {
        parts.push(ContentPart::text(trailing.text.clone()));
    }
    DisplayUnit {
        model: leading.model.clone(),
        content: DisplayContent::Parts { parts },
        merged: true,
        ..DisplayUnit::from_record(trailing)
    }
}

/// Details block from the first code step carrying a `{title, prompt}` object.
fn find_details(run: &[MessageRecord]) -> Option<ContentPart> {
    run.iter()
        .filter(|record| record.content_kind == ContentKind::Code)
        .filter(|record| record.text.trim_start().starts_with('{'))
        .find_map(|record| {
            let payload: Value = serde_json::from_str(&record.text).ok()?;
            let title = payload.get("title")?;
            let prompt = payload.get("prompt")?;
            Some(ContentPart::Details {
                title: DETAILS_LABEL.to_string(),
                content: format!(
                    "Title: {}\n\nPrompt: {}",
                    display_value(title),
                    display_value(prompt)
                ),
            })
        })
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
