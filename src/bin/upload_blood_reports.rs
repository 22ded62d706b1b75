//! Provision the blood report index and pipeline, or bulk-upload a folder of PDF reports.
use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use insightmed::{
    config,
    elastic::{ElasticService, blood_report_spec},
    ingest::BulkUploader,
    logging,
    provision::Provisioner,
    retry::RetryPolicy,
};
use std::{path::PathBuf, time::Duration};

const UPLOAD_ATTEMPTS: u32 = 3;

#[derive(Parser)]
#[command(
    name = "insightmed-upload-reports",
    about = "Manage the blood report index and upload PDF reports",
    group(
        ArgGroup::new("action")
            .required(true)
            .args(["create_pipeline", "create_index", "delete_index", "delete_pipeline", "folder"])
    )
)]
struct Cli {
    /// Create the ingest pipeline
    #[arg(long)]
    create_pipeline: bool,
    /// Create the Elasticsearch index
    #[arg(long)]
    create_index: bool,
    /// Delete the Elasticsearch index
    #[arg(long)]
    delete_index: bool,
    /// Delete the ingest pipeline
    #[arg(long)]
    delete_pipeline: bool,
    /// Path to the folder containing PDF files
    #[arg(long)]
    folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();
    let config = config::init_config().context("failed to load configuration")?;
    let elastic = ElasticService::new(config).context("failed to build Elasticsearch client")?;
    let spec = blood_report_spec(config);
    let provisioner = Provisioner::new(&elastic, &spec);

    if cli.create_pipeline {
        provisioner.create_pipeline().await?;
    } else if cli.create_index {
        provisioner.create_index().await?;
    } else if cli.delete_index {
        provisioner.delete_index().await?;
    } else if cli.delete_pipeline {
        provisioner.delete_pipeline().await?;
    } else if let Some(folder) = cli.folder {
        provisioner.ensure_ready().await?;
        let policy = RetryPolicy::new(
            UPLOAD_ATTEMPTS,
            Duration::from_secs(config.bulk_backoff_seconds),
        );
        let uploader = BulkUploader::new(&elastic, policy, config.bulk_batch_size);
        uploader
            .upload_directory(&folder, &spec.index, &spec.pipeline)
            .await
            .with_context(|| format!("failed to upload reports from {}", folder.display()))?;
    }
    Ok(())
}
