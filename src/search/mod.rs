//! Retry-aware hybrid search for agent callers.
//!
//! Wraps [`VectorIndex::query_hybrid_with_collection`] with per-mode defaults and, when nothing
//! matches, a retry hint describing how to loosen the next attempt. The protocol keeps no state
//! between calls; retry limits are advisory.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::vector::{Chunk, ContentMode, VectorError, VectorIndex, collection_name};

/// Search modes are the index content partitions.
pub type SearchMode = ContentMode;

/// Score threshold applied when the caller gives none.
pub const DEFAULT_SCORE: f64 = 0.5;
/// Alpha applied to `text` searches when the caller gives none (semantic-leaning).
pub const DEFAULT_TEXT_ALPHA: f64 = 0.6;
/// Alpha applied to `table` searches when the caller gives none (keyword-leaning).
pub const DEFAULT_TABLE_ALPHA: f64 = 0.3;
/// Advisory cap on retries suggested to callers.
pub const MAX_RETRIES: u32 = 3;
/// Score suggested after an empty result set.
pub const LOOSENED_SCORE: f64 = 0.3;
/// How far the suggested alpha moves from the one just used.
pub const ALPHA_STEP: f64 = 0.2;

const QUERY_TIPS: [&str; 3] = [
    "Rephrase the query with synonyms or related terms",
    "Use fewer, more specific keywords",
    "Split compound questions into separate searches",
];

/// Alpha used for `mode` when the caller omits one.
pub fn default_alpha(mode: SearchMode) -> f64 {
    match mode {
        ContentMode::Text => DEFAULT_TEXT_ALPHA,
        ContentMode::Table => DEFAULT_TABLE_ALPHA,
    }
}

/// Errors produced by [`SearchProtocol::search`].
#[derive(Debug, Error)]
pub enum SearchError {
    /// Query text was blank.
    #[error("`query` must not be empty")]
    EmptyQuery,
    /// Collection identifier could not be interpreted as a positive integer.
    #[error("`collection` must be a positive integer (got {0})")]
    InvalidCollection(String),
    /// Mode was neither `text` nor `table`.
    #[error("{0}")]
    InvalidMode(String),
    /// A tuning parameter fell outside `0.0..=1.0`.
    #[error("`{field}` must be between 0.0 and 1.0 (got {value})")]
    OutOfRange {
        /// Parameter name.
        field: &'static str,
        /// Value supplied.
        value: f64,
    },
    /// The index rejected or failed the query.
    #[error(transparent)]
    Index(#[from] VectorError),
}

impl SearchError {
    /// Whether the caller supplied bad input (as opposed to the index failing).
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Index(_))
    }
}

/// Strict collection identifier parsed from loosely typed wire values.
///
/// Accepts integers, integral floats, and numeric strings; anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "i64")]
pub struct CollectionId(i64);

impl CollectionId {
    /// Wrap a positive identifier.
    pub fn new(id: i64) -> Result<Self, SearchError> {
        if id > 0 {
            Ok(Self(id))
        } else {
            Err(SearchError::InvalidCollection(id.to_string()))
        }
    }

    /// The raw identifier.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<CollectionId> for i64 {
    fn from(id: CollectionId) -> Self {
        id.0
    }
}

impl TryFrom<Value> for CollectionId {
    type Error = SearchError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let invalid = || SearchError::InvalidCollection(value.to_string());
        let id = match &value {
            Value::Number(number) => match number.as_i64() {
                Some(id) => id,
                None => integral(number.as_f64().ok_or_else(invalid)?).ok_or_else(invalid)?,
            },
            Value::String(text) => {
                let text = text.trim();
                match text.parse::<i64>() {
                    Ok(id) => id,
                    Err(_) => integral(text.parse::<f64>().map_err(|_| invalid())?)
                        .ok_or_else(invalid)?,
                }
            }
            _ => return Err(invalid()),
        };
        Self::new(id)
    }
}

impl std::str::FromStr for CollectionId {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(Value::String(s.to_string()))
    }
}

fn integral(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64)
        .then_some(value as i64)
}

/// Parameters of one search call.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    /// Query text.
    pub query: String,
    /// Logical document set to search.
    pub collection: CollectionId,
    /// Content partition to search.
    pub mode: SearchMode,
    /// Minimum score; defaults to [`DEFAULT_SCORE`].
    #[serde(default)]
    pub score: Option<f64>,
    /// Hybrid blend; defaults per mode.
    #[serde(default)]
    pub alpha: Option<f64>,
}

/// Guidance returned alongside an empty result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryHint {
    /// Lower score threshold to try next.
    pub suggested_score: f64,
    /// Alpha shifted toward the mode's better-performing side.
    pub suggested_alpha: f64,
    /// The partition the caller should also search.
    pub other_mode: SearchMode,
    /// Advisory retry budget.
    pub max_retries: u32,
    /// Human readable summary of the advice.
    pub message: String,
    /// Query rewriting suggestions.
    pub tips: Vec<&'static str>,
}

/// Result of one search call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    /// Query text as searched.
    pub query: String,
    /// Logical document set.
    pub collection_id: i64,
    /// Concrete index collection that was queried.
    pub collection: String,
    /// Content partition searched.
    pub mode: SearchMode,
    /// Effective score threshold.
    pub score_threshold: f64,
    /// Effective alpha.
    pub alpha: f64,
    /// Matching chunks, best first.
    pub results: Vec<Chunk>,
    /// Present exactly when `results` is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryHint>,
}

/// Build the retry hint for an empty search with the given effective parameters.
///
/// The suggested score is [`LOOSENED_SCORE`] when that is looser than `score`, otherwise half of
/// `score`, so it always undercuts a positive threshold.
pub fn retry_hint(mode: SearchMode, score: f64, alpha: f64) -> RetryHint {
    let suggested_score = if score > LOOSENED_SCORE {
        LOOSENED_SCORE
    } else {
        score / 2.0
    };
    let suggested_alpha = match mode {
        ContentMode::Text => round2((alpha + ALPHA_STEP).min(1.0)),
        ContentMode::Table => round2((alpha - ALPHA_STEP).max(0.0)),
    };
    let direction = match mode {
        ContentMode::Text => "toward semantic matching",
        ContentMode::Table => "toward keyword matching",
    };
    let other_mode = mode.other();

    RetryHint {
        suggested_score,
        suggested_alpha,
        other_mode,
        max_retries: MAX_RETRIES,
        message: format!(
            "No {mode} results above score {score}. Retry with score={suggested_score} and \
             alpha={suggested_alpha} ({direction}), at most {MAX_RETRIES} attempts. Also search \
             mode=\"{other_mode}\"; text and table content are indexed separately."
        ),
        tips: QUERY_TIPS.to_vec(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn check_unit(field: &'static str, value: f64) -> Result<f64, SearchError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(SearchError::OutOfRange { field, value })
    }
}

/// Stateless search front-end over a [`VectorIndex`].
#[derive(Clone)]
pub struct SearchProtocol {
    index: Arc<dyn VectorIndex>,
}

impl SearchProtocol {
    /// Wrap an index client.
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    /// Run one hybrid search, applying defaults and attaching a retry hint to empty results.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchOutcome, SearchError> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let score = check_unit("score", request.score.unwrap_or(DEFAULT_SCORE))?;
        let alpha = check_unit("alpha", request.alpha.unwrap_or(default_alpha(request.mode)))?;
        let collection = collection_name(request.collection.get(), request.mode);

        let results = self
            .index
            .query_hybrid_with_collection(&query, &collection, score, alpha)
            .await?;

        let retry = results
            .is_empty()
            .then(|| retry_hint(request.mode, score, alpha));
        tracing::info!(
            collection = %collection,
            mode = %request.mode,
            score,
            alpha,
            hits = results.len(),
            "Search completed"
        );

        Ok(SearchOutcome {
            query,
            collection_id: request.collection.get(),
            collection,
            mode: request.mode,
            score_threshold: score,
            alpha,
            results,
            retry,
        })
    }
}
