//! Provision the clinical notes index and pipeline, or generate and upload notes from a CSV.
use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use insightmed::{
    config,
    elastic::{ElasticService, clinical_notes_spec},
    ingest::{NotesIngestor, load_condition_groups},
    logging,
    provision::Provisioner,
    reports::patient::RandomUserClient,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "insightmed-clinical-notes",
    about = "Manage the clinical notes index and ingest synthetic clinical notes",
    group(
        ArgGroup::new("action")
            .required(true)
            .args(["create_pipeline", "create_index", "delete_index", "delete_pipeline", "input_csv"])
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
    /// Input CSV file containing symptom data
    #[arg(long)]
    input_csv: Option<PathBuf>,
    /// Simulate data generation without uploading to Elasticsearch
    #[arg(long)]
    simulate: bool,
    /// Enable debug mode
    #[arg(long)]
    debug: bool,
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
    logging::init_tracing_with_default(if cli.debug { "debug" } else { "info" });
    let config = config::init_config().context("failed to load configuration")?;
    let elastic = ElasticService::new(config).context("failed to build Elasticsearch client")?;
    let spec = clinical_notes_spec(config);
    let provisioner = Provisioner::new(&elastic, &spec);

    if cli.create_pipeline {
        provisioner.create_pipeline().await?;
    } else if cli.create_index {
        provisioner.create_index().await?;
    } else if cli.delete_index {
        provisioner.delete_index().await?;
    } else if cli.delete_pipeline {
        provisioner.delete_pipeline().await?;
    } else if let Some(path) = cli.input_csv {
        provisioner.ensure_ready().await?;
        let groups = load_condition_groups(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        tracing::debug!(conditions = groups.len(), "Loaded condition groups");
        let people = RandomUserClient::new(config.random_user_url.clone())
            .context("failed to build random-person client")?;
        let summary = NotesIngestor::new(&elastic, &people, &spec)
            .run(&groups, cli.simulate)
            .await?;
        tracing::info!(
            generated = summary.generated,
            succeeded = summary.tally.succeeded,
            failed = summary.tally.failed,
            simulate = cli.simulate,
            "Clinical notes run complete"
        );
    }
    Ok(())
}
