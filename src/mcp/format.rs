//! Formatting helpers shared across MCP handlers and resources.

use std::fmt::Write as _;

use rmcp::model::ResourceContents;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{Value, json};

use crate::search::{
    ALPHA_STEP, DEFAULT_SCORE, DEFAULT_TABLE_ALPHA, DEFAULT_TEXT_ALPHA, LOOSENED_SCORE,
    MAX_RETRIES, SearchOutcome,
};

pub(crate) const APPLICATION_JSON: &str = "application/json";

/// Render a search outcome as prompt-ready text.
pub(crate) fn render_text_results(outcome: &SearchOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Search Parameters: mode={}, collection={}, alpha={:.2}, score_threshold={:.2}",
        outcome.mode, outcome.collection, outcome.alpha, outcome.score_threshold
    );
    let _ = writeln!(out, "Query: {}\n", outcome.query);

    if let Some(hint) = outcome.retry.as_ref() {
        out.push_str("No documents found matching your query.\n\n");
        out.push_str("RETRY SUGGESTIONS:\n");
        let _ = writeln!(out, "- Lower the score threshold to {}", hint.suggested_score);
        let _ = writeln!(out, "- Set alpha to {}", hint.suggested_alpha);
        let _ = writeln!(
            out,
            "- Also search with mode='{}'; text and table content are indexed separately",
            hint.other_mode
        );
        for tip in &hint.tips {
            let _ = writeln!(out, "- {tip}");
        }
        let _ = writeln!(out, "- Max retries allowed: {}", hint.max_retries);
        return out;
    }

    let _ = writeln!(
        out,
        "Found {} relevant {} chunks:\n",
        outcome.results.len(),
        outcome.mode
    );
    for (index, chunk) in outcome.results.iter().enumerate() {
        let _ = writeln!(out, "--- Result {} (Score: {:.2}) ---", index + 1, chunk.score);
        let _ = writeln!(out, "Section: {}", chunk.section_title);
        let _ = writeln!(out, "Content Type: {}", chunk.content_type);
        let _ = writeln!(out, "Page: {}", chunk.page_number);
        let _ = writeln!(out, "Content:\n{}\n", chunk.content);
    }
    let _ = writeln!(
        out,
        "REMINDER: Also search with mode='{}' to cover {} content.",
        outcome.mode.other(),
        outcome.mode.other()
    );
    out
}

/// Structured payload for the JSON search tool.
pub(crate) fn json_results_payload(outcome: &SearchOutcome) -> Value {
    let mut payload = serde_json::to_value(outcome).unwrap_or_else(|error| {
        tracing::warn!(%error, "Failed to serialize search outcome");
        json!({})
    });
    if let Value::Object(map) = &mut payload {
        map.insert("result_count".into(), json!(outcome.results.len()));
    }
    payload
}

/// Serialize a value to JSON, falling back to compact formatting on error.
pub(crate) fn serialize_json<T: Serialize>(value: &T, context_uri: &str) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|error| {
        tracing::warn!(uri = context_uri, %error, "Failed to serialize JSON prettily");
        serde_json::to_string(value).unwrap_or_else(|_| "{}".into())
    })
}

/// Build JSON resource contents for MCP resource responses.
pub(crate) fn json_resource_contents(uri: &str, text: String) -> ResourceContents {
    ResourceContents::TextResourceContents {
        uri: uri.to_string(),
        mime_type: Some(APPLICATION_JSON.into()),
        text,
        meta: None,
    }
}

/// Effective search defaults published through `mcp://settings`.
#[derive(Debug, Serialize, JsonSchema)]
pub(crate) struct SearchSettingsSnapshot {
    /// Score threshold when callers omit `score`.
    pub(crate) default_score: f64,
    /// Alpha for `mode=text` when callers omit `alpha`.
    pub(crate) default_text_alpha: f64,
    /// Alpha for `mode=table` when callers omit `alpha`.
    pub(crate) default_table_alpha: f64,
    /// Score suggested after an empty result set.
    pub(crate) loosened_score: f64,
    /// Alpha adjustment suggested after an empty result set.
    pub(crate) alpha_step: f64,
    /// Advisory retry budget per mode.
    pub(crate) max_retries: u32,
}

impl SearchSettingsSnapshot {
    pub(crate) fn current() -> Self {
        Self {
            default_score: DEFAULT_SCORE,
            default_text_alpha: DEFAULT_TEXT_ALPHA,
            default_table_alpha: DEFAULT_TABLE_ALPHA,
            loosened_score: LOOSENED_SCORE,
            alpha_step: ALPHA_STEP,
            max_retries: MAX_RETRIES,
        }
    }
}

/// Call policy published through `mcp://usage`.
pub(crate) fn usage_payload() -> Value {
    json!({
        "title": "docpipe document search",
        "policy": [
            "Call document_search (or document_search_json) twice: once with mode='text' and once with mode='table'.",
            "Combine both result sets before answering; prose and tables are never mixed in one query.",
            format!("On empty results follow retry.suggested_score and retry.suggested_alpha, at most {MAX_RETRIES} attempts per mode."),
            "Rephrase the query with more specific keywords between retries.",
        ],
        "flows": [
            {
                "name": "Complete coverage",
                "steps": [
                    "document_search({ query, collection, mode: 'text' })",
                    "document_search({ query, collection, mode: 'table' })"
                ]
            },
            {
                "name": "Retry",
                "steps": [
                    "read retry.suggested_score / retry.suggested_alpha",
                    "document_search({ query, collection, mode, score, alpha })"
                ]
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{SearchMode, retry_hint};
    use crate::vector::Chunk;

    fn outcome(results: Vec<Chunk>) -> SearchOutcome {
        let retry = results
            .is_empty()
            .then(|| retry_hint(SearchMode::Table, 0.9, 0.3));
        SearchOutcome {
            query: "net revenue".into(),
            collection_id: 4,
            collection: "Document_4_table".into(),
            mode: SearchMode::Table,
            score_threshold: 0.9,
            alpha: 0.3,
            results,
            retry,
        }
    }

    #[test]
    fn text_rendering_lists_results_with_scores() {
        let body = render_text_results(&outcome(vec![Chunk {
            score: 0.912,
            section_title: "Income statement".into(),
            content_type: "table".into(),
            page_number: 7,
            content: "Revenue | 10".into(),
        }]));

        assert!(body.starts_with(
            "Search Parameters: mode=table, collection=Document_4_table, alpha=0.30, score_threshold=0.90"
        ));
        assert!(body.contains("--- Result 1 (Score: 0.91) ---"));
        assert!(body.contains("Page: 7"));
        assert!(body.contains("mode='text'"));
    }

    #[test]
    fn text_rendering_of_empty_results_carries_retry_advice() {
        let body = render_text_results(&outcome(Vec::new()));
        assert!(body.contains("RETRY SUGGESTIONS:"));
        assert!(body.contains("Lower the score threshold to 0.3"));
        assert!(body.contains("Set alpha to 0.1"));
        assert!(body.contains("Max retries allowed: 3"));
    }

    #[test]
    fn json_payload_adds_result_count() {
        let payload = json_results_payload(&outcome(Vec::new()));
        assert_eq!(payload["result_count"], 0);
        assert_eq!(payload["retry"]["suggested_score"], 0.3);
        assert_eq!(payload["collection"], "Document_4_table");
    }

    #[test]
    fn usage_payload_names_both_modes() {
        let body = serialize_json(&usage_payload(), "mcp://usage");
        assert!(body.contains("mode='text'"));
        assert!(body.contains("mode='table'"));
    }
}
