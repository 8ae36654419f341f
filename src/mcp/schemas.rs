//! JSON schema builders for MCP tools.

use serde_json::{Map, Value, json};

use crate::search::{DEFAULT_SCORE, DEFAULT_TABLE_ALPHA, DEFAULT_TEXT_ALPHA};

/// Build the schema shared by `document_search` and `document_search_json`.
pub(crate) fn search_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert(
        "query".into(),
        string_schema(
            "The search query text to find relevant documents. Be specific and use relevant keywords.",
        ),
    );

    let mut collection_schema = Map::new();
    collection_schema.insert("type".into(), json!(["integer", "number", "string"]));
    collection_schema.insert(
        "description".into(),
        Value::String(
            "The base document collection id (e.g. 1, 4). The mode suffix is appended automatically."
                .into(),
        ),
    );
    collection_schema.insert("minimum".into(), json!(1));
    properties.insert("collection".into(), Value::Object(collection_schema));

    let mut mode_schema = Map::new();
    mode_schema.insert("type".into(), Value::String("string".into()));
    mode_schema.insert(
        "description".into(),
        Value::String(
            "Content to search: 'text' for prose, 'table' for tabular data. Call once per mode for complete results."
                .into(),
        ),
    );
    mode_schema.insert(
        "enum".into(),
        Value::Array(
            ["text", "table"]
                .into_iter()
                .map(|variant| Value::String(variant.into()))
                .collect(),
        ),
    );
    mode_schema.insert("default".into(), Value::String("text".into()));
    properties.insert("mode".into(), Value::Object(mode_schema));

    properties.insert(
        "score".into(),
        unit_schema(
            &format!(
                "Minimum relevance score (0.0 to 1.0). Defaults to {DEFAULT_SCORE}; lower it when nothing matches."
            ),
            Some(DEFAULT_SCORE),
        ),
    );
    properties.insert(
        "alpha".into(),
        unit_schema(
            &format!(
                "Blend between keyword (0.0) and semantic (1.0) scoring. Defaults to {DEFAULT_TEXT_ALPHA} for text and {DEFAULT_TABLE_ALPHA} for tables."
            ),
            None,
        ),
    );

    finalize_object_schema(properties, &["query", "collection", "mode"])
}

fn string_schema(description: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("string".into()));
    schema.insert("description".into(), Value::String(description.into()));
    Value::Object(schema)
}

fn unit_schema(description: &str, default: Option<f64>) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("number".into()));
    schema.insert("description".into(), Value::String(description.into()));
    schema.insert("minimum".into(), json!(0.0));
    schema.insert("maximum".into(), json!(1.0));
    if let Some(default) = default {
        schema.insert("default".into(), json!(default));
    }
    Value::Object(schema)
}

fn finalize_object_schema(properties: Map<String, Value>, required: &[&str]) -> Map<String, Value> {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("object".into()));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert(
            "required".into(),
            Value::Array(
                required
                    .iter()
                    .map(|&key| Value::String(key.into()))
                    .collect(),
            ),
        );
    }
    schema.insert("additionalProperties".into(), Value::Bool(false));
    schema
}
