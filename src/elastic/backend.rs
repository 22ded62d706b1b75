//! Capability traits implemented by [`crate::elastic::ElasticService`].
//!
//! Callers depend on the narrowest trait they need so that provisioning, ingestion, and query
//! orchestration can be exercised against in-memory doubles.

use crate::elastic::{
    bulk::BulkAction,
    types::{BulkOutcome, ElasticError, Removal, SearchResponse, SqlResponse},
};
use async_trait::async_trait;
use serde_json::Value;

/// Index and ingest-pipeline management.
#[async_trait]
pub trait IndexAdmin: Send + Sync {
    /// Whether `index` exists.
    async fn index_exists(&self, index: &str) -> Result<bool, ElasticError>;
    /// Create `index` with the given settings/mappings body.
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), ElasticError>;
    /// Delete `index`, reporting [`Removal::NotFound`] when it is absent.
    async fn delete_index(&self, index: &str) -> Result<Removal, ElasticError>;
    /// Whether the ingest pipeline `id` exists.
    async fn pipeline_exists(&self, id: &str) -> Result<bool, ElasticError>;
    /// Create or replace the ingest pipeline `id`.
    async fn put_pipeline(&self, id: &str, body: &Value) -> Result<(), ElasticError>;
    /// Delete the ingest pipeline `id`, reporting [`Removal::NotFound`] when it is absent.
    async fn delete_pipeline(&self, id: &str) -> Result<Removal, ElasticError>;
}

/// Batched document writes.
#[async_trait]
pub trait BulkWriter: Send + Sync {
    /// Submit `actions` in a single `_bulk` request.
    ///
    /// Transport errors and non-success statuses are returned as `Err`; per-item rejections
    /// are reported inside [`BulkOutcome::failures`].
    async fn bulk(&self, actions: &[BulkAction]) -> Result<BulkOutcome, ElasticError>;
}

/// Read-side queries and model inference.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run a search request body against `index`.
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, ElasticError>;
    /// Execute an SQL query and return tabular results.
    async fn sql_query(&self, query: &str) -> Result<SqlResponse, ElasticError>;
    /// Run inference for `text` on a deployed model, returning the first inference result.
    async fn infer(
        &self,
        model_id: &str,
        text: &str,
        inference_config: Option<Value>,
    ) -> Result<Value, ElasticError>;
}

/// Trained-model lifecycle operations.
#[async_trait]
pub trait ModelAdmin: Send + Sync {
    /// Register a trained model configuration.
    async fn put_trained_model(&self, model_id: &str, body: &Value) -> Result<(), ElasticError>;
    /// Start a deployment for the model.
    async fn start_deployment(&self, model_id: &str) -> Result<(), ElasticError>;
    /// Stop the model's deployment.
    async fn stop_deployment(&self, model_id: &str) -> Result<(), ElasticError>;
    /// Delete the trained model.
    async fn delete_trained_model(&self, model_id: &str) -> Result<(), ElasticError>;
    /// Whether the trained model is installed.
    async fn trained_model_exists(&self, model_id: &str) -> Result<bool, ElasticError>;
}
