//! Idempotent creation and removal of an index and its ingest pipeline.

use crate::elastic::{ElasticError, IndexAdmin, IndexSpec, Removal};
use thiserror::Error;

/// Errors raised while provisioning or verifying an index/pipeline pair.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Elasticsearch rejected a management call.
    #[error(transparent)]
    Elastic(#[from] ElasticError),
    /// The ingest pipeline required for uploads is missing.
    #[error("Pipeline '{0}' does not exist. Please create it first using --create-pipeline")]
    MissingPipeline(String),
    /// The index required for uploads is missing.
    #[error("Index '{0}' does not exist. Please create it first using --create-index")]
    MissingIndex(String),
}

/// What a provisioning call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// The resource was created.
    Created,
    /// The resource was already present; nothing was changed.
    AlreadyExists,
    /// The resource was deleted.
    Deleted,
    /// The resource was absent; nothing was changed.
    NotFound,
}

/// Applies an [`IndexSpec`] through an [`IndexAdmin`].
pub struct Provisioner<'a, A: IndexAdmin + ?Sized> {
    admin: &'a A,
    spec: &'a IndexSpec,
}

impl<'a, A: IndexAdmin + ?Sized> Provisioner<'a, A> {
    /// Bind a provisioner to a backend and spec.
    pub fn new(admin: &'a A, spec: &'a IndexSpec) -> Self {
        Self { admin, spec }
    }

    /// Create the index unless it already exists.
    pub async fn create_index(&self) -> Result<ProvisionOutcome, ProvisionError> {
        let index = &self.spec.index;
        if self.admin.index_exists(index).await? {
            tracing::info!(index = %index, "Index '{index}' already exists");
            return Ok(ProvisionOutcome::AlreadyExists);
        }
        self.admin.create_index(index, &self.spec.index_body).await?;
        tracing::info!(index = %index, "Index '{index}' created successfully");
        Ok(ProvisionOutcome::Created)
    }

    /// Store the ingest pipeline unless it already exists.
    pub async fn create_pipeline(&self) -> Result<ProvisionOutcome, ProvisionError> {
        let pipeline = &self.spec.pipeline;
        if self.admin.pipeline_exists(pipeline).await? {
            tracing::info!(pipeline = %pipeline, "Pipeline '{pipeline}' already exists");
            return Ok(ProvisionOutcome::AlreadyExists);
        }
        self.admin
            .put_pipeline(pipeline, &self.spec.pipeline_body)
            .await?;
        tracing::info!(pipeline = %pipeline, "Pipeline '{pipeline}' created successfully");
        Ok(ProvisionOutcome::Created)
    }

    /// Delete the index; a missing index is a no-op.
    pub async fn delete_index(&self) -> Result<ProvisionOutcome, ProvisionError> {
        let index = &self.spec.index;
        let outcome = match self.admin.delete_index(index).await? {
            Removal::Deleted => {
                tracing::info!(index = %index, "Index '{index}' deleted successfully");
                ProvisionOutcome::Deleted
            }
            Removal::NotFound => {
                tracing::info!(index = %index, "Index '{index}' not found");
                ProvisionOutcome::NotFound
            }
        };
        Ok(outcome)
    }

    /// Delete the pipeline; a missing pipeline is a no-op.
    pub async fn delete_pipeline(&self) -> Result<ProvisionOutcome, ProvisionError> {
        let pipeline = &self.spec.pipeline;
        let outcome = match self.admin.delete_pipeline(pipeline).await? {
            Removal::Deleted => {
                tracing::info!(pipeline = %pipeline, "Pipeline '{pipeline}' deleted successfully");
                ProvisionOutcome::Deleted
            }
            Removal::NotFound => {
                tracing::info!(pipeline = %pipeline, "Pipeline '{pipeline}' not found");
                ProvisionOutcome::NotFound
            }
        };
        Ok(outcome)
    }

    /// Verify that both the pipeline and the index exist before an upload.
    pub async fn ensure_ready(&self) -> Result<(), ProvisionError> {
        if !self.admin.pipeline_exists(&self.spec.pipeline).await? {
            return Err(ProvisionError::MissingPipeline(self.spec.pipeline.clone()));
        }
        if !self.admin.index_exists(&self.spec.index).await? {
            return Err(ProvisionError::MissingIndex(self.spec.index.clone()));
        }
        Ok(())
    }
}
