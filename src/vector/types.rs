//! Shared types for the hybrid vector index client.

use std::fmt;
use std::str::FromStr;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors returned while talking to the vector index.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid index URL: {0}")]
    InvalidUrl(String),
    /// Collection names must be plain identifiers.
    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The index responded with an unexpected status code.
    #[error("Unexpected index response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the index.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The index accepted the request but reported query errors.
    #[error("Index query failed: {0}")]
    Query(String),
    /// One or more objects in a batch write were rejected.
    #[error("Batch write failed: {0}")]
    Batch(String),
}

/// Content partition of a document inside the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// Prose content.
    Text,
    /// Tabular content.
    Table,
}

impl ContentMode {
    /// Wire label (`text` / `table`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Table => "table",
        }
    }

    /// The opposite partition.
    pub fn other(self) -> Self {
        match self {
            Self::Text => Self::Table,
            Self::Table => Self::Text,
        }
    }

    /// Classify a chunk by the `content_type` tag produced by the processor.
    pub fn classify(content_type: &str) -> Self {
        if content_type.trim().eq_ignore_ascii_case("table") {
            Self::Table
        } else {
            Self::Text
        }
    }
}

impl fmt::Display for ContentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "table" => Ok(Self::Table),
            other => Err(format!("mode must be 'text' or 'table' (got '{other}')")),
        }
    }
}

/// Deterministic collection name for a document set and content mode.
pub fn collection_name(collection_id: i64, mode: ContentMode) -> String {
    match mode {
        ContentMode::Text => format!("Document_{collection_id}"),
        ContentMode::Table => format!("Document_{collection_id}_table"),
    }
}

/// A scored chunk returned by a hybrid query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Relevance score in `0.0..=1.0`, higher is better.
    pub score: f64,
    /// Heading of the section the chunk came from.
    pub section_title: String,
    /// `text` or `table`.
    pub content_type: String,
    /// Source page number.
    pub page_number: i64,
    /// Chunk body.
    pub content: String,
}

/// One chunk as written by the external processor into the artifact file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArtifactChunk {
    /// Processor-assigned chunk identifier.
    #[serde(default)]
    pub chunk_id: Option<String>,
    /// Chunk body.
    pub content: String,
    /// `text` or `table`.
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Source page number.
    #[serde(default)]
    pub page_number: i64,
    /// Heading of the section the chunk came from.
    #[serde(default)]
    pub section_title: String,
    /// Position of the chunk in the document.
    #[serde(default)]
    pub chunk_index: i64,
}

fn default_content_type() -> String {
    ContentMode::Text.as_str().to_string()
}

/// Counters describing one document's index write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    /// Objects written to the text collection.
    pub text_chunks: usize,
    /// Objects written to the table collection.
    pub table_chunks: usize,
    /// Batch requests issued.
    pub batches: usize,
}

/// GraphQL envelope returned by the index.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse {
    #[serde(default)]
    pub(crate) data: Option<GraphQlData>,
    #[serde(default)]
    pub(crate) errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlData {
    #[serde(rename = "Get", default)]
    pub(crate) get: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub(crate) message: String,
}

/// A single hit inside `data.Get.<Collection>`.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlHit {
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) section_title: Option<String>,
    #[serde(default)]
    pub(crate) page_number: Option<f64>,
    #[serde(default)]
    pub(crate) content_type: Option<String>,
    #[serde(rename = "_additional", default)]
    pub(crate) additional: Option<GraphQlAdditional>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlAdditional {
    #[serde(default)]
    pub(crate) score: Option<ScoreValue>,
}

/// Hybrid scores arrive as strings from some index versions and as numbers from others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ScoreValue {
    Number(f64),
    Text(String),
}

impl ScoreValue {
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_follow_mode() {
        assert_eq!(collection_name(4, ContentMode::Text), "Document_4");
        assert_eq!(collection_name(4, ContentMode::Table), "Document_4_table");
    }

    #[test]
    fn classify_defaults_to_text() {
        assert_eq!(ContentMode::classify("table"), ContentMode::Table);
        assert_eq!(ContentMode::classify(" TABLE "), ContentMode::Table);
        assert_eq!(ContentMode::classify("text"), ContentMode::Text);
        assert_eq!(ContentMode::classify("figure"), ContentMode::Text);
    }

    #[test]
    fn mode_parsing_rejects_unknown() {
        assert_eq!("Table".parse::<ContentMode>(), Ok(ContentMode::Table));
        assert!("image".parse::<ContentMode>().is_err());
    }

    #[test]
    fn artifact_chunks_tolerate_missing_fields() {
        let chunk: ArtifactChunk =
            serde_json::from_str(r#"{"content": "Revenue grew"}"#).expect("chunk");
        assert_eq!(chunk.content_type, "text");
        assert_eq!(chunk.page_number, 0);
        assert!(chunk.chunk_id.is_none());
    }

    #[test]
    fn scores_parse_from_strings_and_numbers() {
        let text: ScoreValue = serde_json::from_str("\"0.53\"").expect("text");
        let number: ScoreValue = serde_json::from_str("0.25").expect("number");
        let junk: ScoreValue = serde_json::from_str("\"n/a\"").expect("junk");
        assert_eq!(text.as_f64(), Some(0.53));
        assert_eq!(number.as_f64(), Some(0.25));
        assert_eq!(junk.as_f64(), None);
    }
}
