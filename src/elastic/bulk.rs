//! Bulk action model and NDJSON encoding for the `_bulk` endpoint.

use crate::elastic::types::ElasticError;
use serde_json::{Map, Value, json};

/// One `index` operation submitted through the bulk API.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkAction {
    /// Target index.
    pub index: String,
    /// Ingest pipeline applied to the document, if any.
    pub pipeline: Option<String>,
    /// Document body.
    pub source: Map<String, Value>,
}

impl BulkAction {
    /// Create an action for `index` routed through `pipeline`.
    pub fn new(index: impl Into<String>, pipeline: Option<String>, source: Map<String, Value>) -> Self {
        Self {
            index: index.into(),
            pipeline,
            source,
        }
    }

    fn header(&self) -> Value {
        let mut meta = Map::new();
        meta.insert("_index".into(), Value::String(self.index.clone()));
        if let Some(pipeline) = &self.pipeline {
            meta.insert("pipeline".into(), Value::String(pipeline.clone()));
        }
        json!({ "index": meta })
    }
}

/// Encode actions as newline-delimited JSON, header line followed by source line.
pub fn encode_ndjson(actions: &[BulkAction]) -> Result<String, ElasticError> {
    let mut body = String::new();
    for action in actions {
        body.push_str(&serde_json::to_string(&action.header())?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&action.source)?);
        body.push('\n');
    }
    Ok(body)
}
