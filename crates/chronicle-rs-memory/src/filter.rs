//! Equality filters evaluated against entry metadata.

use serde_json::{Map, Value};

/// A single metadata predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `metadata[key] == value`
    Matches { key: String, value: Value },
    /// `metadata[key]` equals one of `values`
    AnyOf { key: String, values: Vec<Value> },
}

impl Condition {
    pub fn matches(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Matches {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn any_of<V: Into<Value>>(key: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Condition::AnyOf {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    fn evaluate(&self, metadata: &Map<String, Value>) -> bool {
        match self {
            Condition::Matches { key, value } => metadata.get(key) == Some(value),
            Condition::AnyOf { key, values } => metadata
                .get(key)
                .is_some_and(|found| values.iter().any(|value| value == found)),
        }
    }
}

/// Conjunction of conditions; an empty filter matches every entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    must: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self {
            must: conditions.into_iter().collect(),
        }
    }

    /// Entries owned by one source.
    pub fn source_id(source_id: impl Into<String>) -> Self {
        Self::must([Condition::matches("source_id", source_id.into())])
    }

    /// Entries owned by any of the given sources.
    pub fn source_ids<S: Into<String>>(source_ids: impl IntoIterator<Item = S>) -> Self {
        Self::must([Condition::any_of(
            "source_id",
            source_ids.into_iter().map(Into::into).collect::<Vec<String>>(),
        )])
    }

    pub fn and(mut self, condition: Condition) -> Self {
        self.must.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.must
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        self.must.iter().all(|condition| condition.evaluate(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::{Condition, Filter};
    use serde_json::{Map, Value, json};

    fn metadata(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&Map::new()));
    }

    #[test]
    fn conditions_are_conjunctive() {
        let meta = metadata(json!({ "source_id": "a", "role": "user" }));
        let filter = Filter::source_id("a").and(Condition::matches("role", "user"));
        assert!(filter.matches(&meta));
        let filter = Filter::source_id("a").and(Condition::matches("role", "assistant"));
        assert!(!filter.matches(&meta));
    }

    #[test]
    fn any_of_requires_the_key() {
        let filter = Filter::source_ids(["a", "b"]);
        assert!(filter.matches(&metadata(json!({ "source_id": "b" }))));
        assert!(!filter.matches(&metadata(json!({ "source_id": "c" }))));
        assert!(!filter.matches(&metadata(json!({ "role": "user" }))));
    }
}
