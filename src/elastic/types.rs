//! Shared types used by the Elasticsearch client and its callers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors returned while interacting with Elasticsearch.
#[derive(Debug, Error)]
pub enum ElasticError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Elasticsearch URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Request body could not be serialized.
    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
    /// Elasticsearch responded with an unexpected status code.
    #[error("Unexpected Elasticsearch response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Elasticsearch.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Response decoded but did not carry the expected structure.
    #[error("Malformed Elasticsearch response: {0}")]
    MalformedResponse(String),
}

impl ElasticError {
    /// Whether the error is a `404 Not Found` from the server.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnexpectedStatus { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// Result of a delete request where a missing target is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The resource existed and was deleted.
    Deleted,
    /// The resource did not exist.
    NotFound,
}

/// Per-item failure reported inside an otherwise successful bulk response.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemFailure {
    /// Index the item targeted.
    pub index: Option<String>,
    /// HTTP status recorded for the item.
    pub status: u16,
    /// Error payload rendered as a string.
    pub reason: String,
}

/// Aggregated result of one `_bulk` request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    /// Number of items the server accepted.
    pub succeeded: usize,
    /// Items the server rejected.
    pub failures: Vec<BulkItemFailure>,
}

/// Decoded `_search` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    /// Matching documents.
    #[serde(default)]
    pub hits: SearchHits,
    /// Aggregation results keyed by aggregation name.
    #[serde(default)]
    pub aggregations: Option<Map<String, Value>>,
}

/// Container for the hit list of a search response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHits {
    /// Hits in ranking order.
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

/// Single document returned by a search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHit {
    /// Document identifier.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Relevance score, absent for sorted or filtered queries.
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    /// Stored document fields.
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
    /// Highlighted fragments keyed by field.
    #[serde(default)]
    pub highlight: Option<BTreeMap<String, Vec<String>>>,
}

/// Column descriptor in a `_sql` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlColumn {
    /// Column name.
    pub name: String,
    /// Elasticsearch type of the column.
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Decoded `_sql?format=json` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlResponse {
    /// Column metadata.
    #[serde(default)]
    pub columns: Vec<SqlColumn>,
    /// Row values in column order.
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
pub(crate) struct RawBulkResponse {
    #[serde(default)]
    pub(crate) items: Vec<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct RawBulkItem {
    #[serde(rename = "_index", default)]
    pub(crate) index: Option<String>,
    #[serde(default)]
    pub(crate) status: u16,
    #[serde(default)]
    pub(crate) error: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct InferResponse {
    #[serde(default)]
    pub(crate) inference_results: Vec<Value>,
}

impl RawBulkResponse {
    pub(crate) fn into_outcome(self) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for item in self.items {
            // Each item is keyed by its operation type (`index`, `create`, ...).
            let Some(body) = item.into_iter().next().map(|(_, body)| body) else {
                continue;
            };
            let parsed: RawBulkItem = match serde_json::from_value(body) {
                Ok(parsed) => parsed,
                Err(err) => {
                    outcome.failures.push(BulkItemFailure {
                        index: None,
                        status: 0,
                        reason: format!("unreadable bulk item: {err}"),
                    });
                    continue;
                }
            };
            let failed = parsed.error.is_some() || !(200..300).contains(&parsed.status);
            if failed {
                outcome.failures.push(BulkItemFailure {
                    index: parsed.index,
                    status: parsed.status,
                    reason: parsed
                        .error
                        .map(|error| error.to_string())
                        .unwrap_or_else(|| format!("status {}", parsed.status)),
                });
            } else {
                outcome.succeeded += 1;
            }
        }
        outcome
    }
}
