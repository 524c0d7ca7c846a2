//! Schema validation helpers for Chronicle JSON5 configuration.

use crate::ConfigError;
use serde_json::{Map, Value};

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    let allowed = [
        "$schema",
        "storage",
        "memory",
        "retrieval",
        "assembler",
        "import",
        "tasks",
        "llm",
    ];
    ensure_allowed_keys(map, &allowed, layer, "")?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("storage") {
        validate_storage(value, layer, "storage")?;
    }
    if let Some(value) = map.get("memory") {
        validate_memory(value, layer, "memory")?;
    }
    if let Some(value) = map.get("retrieval") {
        validate_retrieval(value, layer, "retrieval")?;
    }
    if let Some(value) = map.get("assembler") {
        let map = expect_object(value, layer, "assembler")?;
        ensure_allowed_keys(map, &["page_size"], layer, "assembler")?;
        if let Some(value) = map.get("page_size") {
            expect_u64(value, layer, "assembler.page_size")?;
        }
    }
    if let Some(value) = map.get("import") {
        validate_import(value, layer, "import")?;
    }
    if let Some(value) = map.get("tasks") {
        validate_tasks(value, layer, "tasks")?;
    }
    if let Some(value) = map.get("llm") {
        validate_llm(value, layer, "llm")?;
    }

    Ok(())
}

fn validate_storage(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["data_dir"], layer, path)?;
    if let Some(value) = map.get("data_dir") {
        expect_string(value, layer, &join_path(path, "data_dir"))?;
    }
    Ok(())
}

fn validate_memory(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["enabled", "collection"], layer, path)?;
    if let Some(value) = map.get("enabled") {
        expect_bool(value, layer, &join_path(path, "enabled"))?;
    }
    if let Some(value) = map.get("collection") {
        expect_string(value, layer, &join_path(path, "collection"))?;
    }
    Ok(())
}

fn validate_retrieval(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "top_n",
            "screening_model",
            "extra_stopwords",
            "history_window",
        ],
        layer,
        path,
    )?;
    if let Some(value) = map.get("top_n") {
        expect_u64(value, layer, &join_path(path, "top_n"))?;
    }
    if let Some(value) = map.get("screening_model") {
        expect_string(value, layer, &join_path(path, "screening_model"))?;
    }
    if let Some(value) = map.get("extra_stopwords") {
        validate_string_array(value, layer, &join_path(path, "extra_stopwords"))?;
    }
    if let Some(value) = map.get("history_window") {
        expect_u64(value, layer, &join_path(path, "history_window"))?;
    }
    Ok(())
}

fn validate_import(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["chunk_size", "chunk_overlap"], layer, path)?;
    for key in ["chunk_size", "chunk_overlap"] {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    Ok(())
}

fn validate_tasks(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["capacity", "ttl_secs"], layer, path)?;
    for key in ["capacity", "ttl_secs"] {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    Ok(())
}

fn validate_llm(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["default_model", "embedding_model", "models"],
        layer,
        path,
    )?;
    if let Some(value) = map.get("default_model") {
        expect_string(value, layer, &join_path(path, "default_model"))?;
    }
    if let Some(value) = map.get("embedding_model") {
        if !value.is_null() {
            expect_string(value, layer, &join_path(path, "embedding_model"))?;
        }
    }
    if let Some(value) = map.get("models") {
        validate_string_array(value, layer, &join_path(path, "models"))?;
    }
    Ok(())
}

/// Expect a JSON object or return a typed error.
fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(invalid_field(layer, path, "expected object")),
    }
}

fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_string() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected string"))
    }
}

fn expect_bool(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_boolean() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected bool"))
    }
}

/// Non-negative integers only; sizes and counts never go below zero.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

fn validate_string_array(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let Value::Array(arr) = value else {
        return Err(invalid_field(layer, path, "expected array"));
    };
    for (idx, entry) in arr.iter().enumerate() {
        if !entry.is_string() {
            return Err(invalid_field(
                layer,
                &format!("{path}[{idx}]"),
                "expected string",
            ));
        }
    }
    Ok(())
}

/// Ensure an object contains only allowed keys.
fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(invalid_field(layer, &join_path(path, key), "unknown key")),
        None => Ok(()),
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Build a structured invalid-field error.
fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let normalized_path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{normalized_path}"),
        message: message.to_string(),
    }
}
