//! Batched bulk uploads with retry.

use crate::{
    elastic::{BulkAction, BulkWriter},
    metrics::IngestTally,
    retry::RetryPolicy,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Errors that stop an upload before any batch is sent.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The input directory could not be listed.
    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        /// Directory that was being listed.
        path: PathBuf,
        /// Underlying walk error.
        #[source]
        source: walkdir::Error,
    },
}

/// Submits documents through the bulk API in fixed-size batches.
///
/// A batch that fails as a whole is retried per the [`RetryPolicy`]; once the policy gives up
/// the entire batch is counted as failed and the upload moves on.
pub struct BulkUploader<'a, W: BulkWriter + ?Sized> {
    writer: &'a W,
    policy: RetryPolicy,
    batch_size: usize,
}

impl<'a, W: BulkWriter + ?Sized> BulkUploader<'a, W> {
    /// Create an uploader; a zero batch size is treated as one.
    pub fn new(writer: &'a W, policy: RetryPolicy, batch_size: usize) -> Self {
        Self {
            writer,
            policy,
            batch_size: batch_size.max(1),
        }
    }

    /// Upload every `*.pdf` file in `dir` (non-recursive) through `pipeline` into `index`.
    pub async fn upload_directory(
        &self,
        dir: &Path,
        index: &str,
        pipeline: &str,
    ) -> Result<IngestTally, UploadError> {
        let files = list_pdf_files(dir)?;
        if files.is_empty() {
            tracing::info!(dir = %dir.display(), "No PDF files found in {}", dir.display());
            return Ok(IngestTally::new());
        }

        let total_batches = files.len().div_ceil(self.batch_size);
        let mut tally = IngestTally::new();

        for (number, batch) in files.chunks(self.batch_size).enumerate() {
            let number = number + 1;
            tracing::info!("Processing batch {number} of {total_batches}");

            let actions = match read_batch(batch, index, pipeline).await {
                Ok(actions) => actions,
                Err(err) => {
                    tracing::error!(batch = number, error = %err, "Failed to process batch {number}: {err}");
                    tally.record_failed_batch(batch.len());
                    continue;
                }
            };
            self.submit_batch(number, &actions, &mut tally).await;
        }

        tracing::info!(
            succeeded = tally.succeeded,
            failed = tally.failed,
            "Ingestion complete. Total succeeded: {}, Total failed: {}",
            tally.succeeded,
            tally.failed
        );
        Ok(tally)
    }

    /// Upload prepared actions in batches, numbering batches from one.
    pub async fn upload_actions(&self, actions: &[BulkAction]) -> IngestTally {
        let mut tally = IngestTally::new();
        for (number, batch) in actions.chunks(self.batch_size).enumerate() {
            self.submit_batch(number + 1, batch, &mut tally).await;
        }
        tally
    }

    /// Send one batch, retrying whole-batch failures, and record the result in `tally`.
    async fn submit_batch(&self, number: usize, actions: &[BulkAction], tally: &mut IngestTally) {
        if actions.is_empty() {
            return;
        }

        let label = format!("bulk batch {number}");
        match self
            .policy
            .run(&label, |_| self.writer.bulk(actions))
            .await
        {
            Ok(outcome) => {
                let failed = outcome.failures.len();
                for failure in &outcome.failures {
                    tracing::warn!(
                        batch = number,
                        index = ?failure.index,
                        status = failure.status,
                        reason = %failure.reason,
                        "Document rejected"
                    );
                }
                tracing::info!(
                    "Batch {number} complete: {} succeeded, {failed} failed",
                    outcome.succeeded
                );
                tally.record_batch(outcome.succeeded, failed);
            }
            Err(err) => {
                tracing::error!(batch = number, error = %err, "Failed to process batch {number}: {err}");
                tally.record_failed_batch(actions.len());
            }
        }
    }
}

/// List `*.pdf` files directly inside `dir`, sorted by file name.
pub fn list_pdf_files(dir: &Path) -> Result<Vec<PathBuf>, UploadError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| UploadError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if entry.file_type().is_file() && is_pdf {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Build the bulk action for one file: base64 content in `data`, base name in `file_name`.
pub async fn file_action(path: &Path, index: &str, pipeline: &str) -> std::io::Result<BulkAction> {
    let content = tokio::fs::read(path).await?;
    let mut source = Map::new();
    source.insert("data".into(), Value::String(STANDARD.encode(content)));
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.insert("file_name".into(), Value::String(file_name));
    Ok(BulkAction::new(index, Some(pipeline.to_string()), source))
}

async fn read_batch(
    batch: &[PathBuf],
    index: &str,
    pipeline: &str,
) -> std::io::Result<Vec<BulkAction>> {
    let mut actions = Vec::with_capacity(batch.len());
    for path in batch {
        actions.push(file_action(path, index, pipeline).await?);
    }
    Ok(actions)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::elastic::{BulkItemFailure, BulkOutcome, ElasticError};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Bulk writer that records every request and fails according to a script.
    #[derive(Default)]
    pub(crate) struct ScriptedWriter {
        pub(crate) requests: Mutex<Vec<Vec<BulkAction>>>,
        failures: Mutex<VecDeque<bool>>,
        rejected_per_batch: usize,
    }

    impl ScriptedWriter {
        pub(crate) fn failing(plan: &[bool]) -> Self {
            Self {
                failures: Mutex::new(plan.iter().copied().collect()),
                ..Self::default()
            }
        }

        fn with_rejections(rejected_per_batch: usize) -> Self {
            Self {
                rejected_per_batch,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl BulkWriter for ScriptedWriter {
        async fn bulk(&self, actions: &[BulkAction]) -> Result<BulkOutcome, ElasticError> {
            self.requests.lock().expect("lock").push(actions.to_vec());
            let fail = self
                .failures
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or(false);
            if fail {
                return Err(ElasticError::UnexpectedStatus {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: "unavailable".into(),
                });
            }
            let rejected = self.rejected_per_batch.min(actions.len());
            Ok(BulkOutcome {
                succeeded: actions.len() - rejected,
                failures: (0..rejected)
                    .map(|_| BulkItemFailure {
                        index: Some("healthcare".into()),
                        status: 400,
                        reason: "mapper_parsing_exception".into(),
                    })
                    .collect(),
            })
        }
    }

    fn actions(count: usize) -> Vec<BulkAction> {
        (0..count)
            .map(|n| {
                let mut source = Map::new();
                source.insert("file_name".into(), Value::String(format!("report-{n}.pdf")));
                BulkAction::new("healthcare", Some("pipeline-healthcare".into()), source)
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn batch_recovering_on_third_attempt_counts_as_succeeded() {
        let writer = ScriptedWriter::failing(&[true, true, false]);
        let uploader = BulkUploader::new(&writer, RetryPolicy::new(3, Duration::from_secs(5)), 10);
        let started = Instant::now();

        let tally = uploader.upload_actions(&actions(4)).await;

        assert_eq!(tally.succeeded, 4);
        assert_eq!(tally.failed, 0);
        assert_eq!(writer.requests.lock().expect("lock").len(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(5) + Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_batch_counts_every_document_as_failed_and_continues() {
        let writer = ScriptedWriter::failing(&[true, true, true]);
        let uploader = BulkUploader::new(&writer, RetryPolicy::new(3, Duration::from_secs(1)), 3);

        let tally = uploader.upload_actions(&actions(5)).await;

        // First batch (3 docs) exhausts its retries, second batch (2 docs) succeeds.
        assert_eq!(tally.failed, 3);
        assert_eq!(tally.succeeded, 2);
        assert_eq!(tally.batches, 2);
        assert_eq!(writer.requests.lock().expect("lock").len(), 4);
    }

    #[tokio::test]
    async fn per_item_rejections_are_counted_individually() {
        let writer = ScriptedWriter::with_rejections(1);
        let uploader = BulkUploader::new(&writer, RetryPolicy::single_attempt(), 2);

        let tally = uploader.upload_actions(&actions(4)).await;

        assert_eq!(tally.succeeded, 2);
        assert_eq!(tally.failed, 2);
    }

    #[tokio::test]
    async fn directory_upload_encodes_pdfs_in_batches() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["b.pdf", "a.pdf", "c.PDF"] {
            std::fs::write(dir.path().join(name), format!("%PDF {name}")).expect("write");
        }
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let writer = ScriptedWriter::default();
        let uploader = BulkUploader::new(&writer, RetryPolicy::single_attempt(), 2);
        let tally = uploader
            .upload_directory(dir.path(), "healthcare", "pipeline-healthcare")
            .await
            .expect("upload");

        assert_eq!(tally.succeeded, 3);
        assert_eq!(tally.batches, 2);

        let requests = writer.requests.lock().expect("lock");
        assert_eq!(requests[0].len(), 2);
        assert_eq!(requests[1].len(), 1);
        let first = &requests[0][0];
        assert_eq!(first.source["file_name"], "a.pdf");
        assert_eq!(first.pipeline.as_deref(), Some("pipeline-healthcare"));
        let decoded = STANDARD
            .decode(first.source["data"].as_str().expect("data"))
            .expect("base64");
        assert_eq!(decoded, b"%PDF a.pdf");
    }

    #[tokio::test]
    async fn empty_directory_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ScriptedWriter::default();
        let uploader = BulkUploader::new(&writer, RetryPolicy::default(), 10);

        let tally = uploader
            .upload_directory(dir.path(), "healthcare", "pipeline-healthcare")
            .await
            .expect("upload");

        assert_eq!(tally, IngestTally::new());
        assert!(writer.requests.lock().expect("lock").is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let error = list_pdf_files(Path::new("/definitely/not/here")).expect_err("missing");
        assert!(matches!(error, UploadError::ReadDir { .. }));
    }
}
