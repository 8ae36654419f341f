//! Handlers for the `document_search` and `document_search_json` tools.

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content, JsonObject},
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    mcp::{
        format::{json_results_payload, render_text_results},
        handlers::parse_arguments_value,
    },
    search::{CollectionId, SearchError, SearchMode, SearchProtocol, SearchRequest},
};

/// How a tool renders its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResultFormat {
    /// Human-readable text blocks.
    Text,
    /// Structured JSON content.
    Json,
}

/// Raw search arguments accepted from MCP clients.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SearchToolRequest {
    /// Query text.
    pub(crate) query: String,
    /// Document set; integer, integral float, or numeric string.
    pub(crate) collection: CollectionId,
    /// Content partition, `text` when omitted.
    #[serde(default)]
    pub(crate) mode: Option<SearchMode>,
    /// Minimum score override.
    #[serde(default)]
    pub(crate) score: Option<f64>,
    /// Alpha override.
    #[serde(default)]
    pub(crate) alpha: Option<f64>,
}

impl From<SearchToolRequest> for SearchRequest {
    fn from(value: SearchToolRequest) -> Self {
        Self {
            query: value.query,
            collection: value.collection,
            mode: value.mode.unwrap_or(SearchMode::Text),
            score: value.score,
            alpha: value.alpha,
        }
    }
}

/// Handle either search tool by running one retry-aware search.
pub(crate) async fn handle_document_search(
    search: &SearchProtocol,
    arguments: Option<JsonObject>,
    format: ResultFormat,
) -> Result<CallToolResult, McpError> {
    let args: SearchToolRequest = parse_arguments_value(normalize_search_arguments(arguments))?;

    let outcome = match search.search(args.into()).await {
        Ok(outcome) => outcome,
        Err(err) if err.is_validation() => return Err(map_validation_error(&err)),
        Err(err) => {
            tracing::warn!(error = %err, "Search tool call failed");
            return Ok(CallToolResult::error(vec![Content::text(format!(
                "search failed: {err}"
            ))]));
        }
    };

    Ok(match format {
        ResultFormat::Text => {
            CallToolResult::success(vec![Content::text(render_text_results(&outcome))])
        }
        ResultFormat::Json => CallToolResult::structured(json_results_payload(&outcome)),
    })
}

fn map_validation_error(err: &SearchError) -> McpError {
    McpError::invalid_params(err.to_string(), None)
}

/// Normalize search arguments: honor the `collection_id` alias and fold `mode` case.
pub(crate) fn normalize_search_arguments(arguments: Option<JsonObject>) -> Value {
    let mut map = arguments.unwrap_or_default();

    move_alias(&mut map, "collection_id", "collection");

    if let Some(Value::String(mode)) = map.get_mut("mode") {
        let normalized = mode.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            map.remove("mode");
        } else {
            *mode = normalized;
        }
    }

    Value::Object(map)
}

fn move_alias(map: &mut JsonObject, alias: &str, canonical: &str) {
    if let Some(value) = map.remove(alias) {
        if map.contains_key(canonical) {
            tracing::debug!(
                alias = alias,
                canonical = canonical,
                "Alias ignored because canonical key provided"
            );
        } else {
            map.insert(canonical.to_string(), value);
        }
    }
}
