//! Deploy, remove, or check the trained models used by the dashboard.
use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser};
use insightmed::{config, elastic::ElasticService, logging, ml::ModelManager};

#[derive(Parser)]
#[command(
    name = "insightmed-models",
    about = "Manage the ELSER, NER, sentiment, and zero-shot models",
    group(ArgGroup::new("action").required(true).args(["deploy", "remove", "check"]))
)]
struct Cli {
    /// Deploy the models
    #[arg(long)]
    deploy: bool,
    /// Remove the models
    #[arg(long)]
    remove: bool,
    /// Check which models are not installed
    #[arg(long)]
    check: bool,
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
    let manager = ModelManager::new(&elastic, config);

    if cli.check {
        let status = manager.check().await;
        for role in &status.installed {
            tracing::info!(model = %role, "Model installed: {}", role.model_id(config));
        }
        for role in &status.missing {
            tracing::warn!(model = %role, "Model not installed: {}", role.model_id(config));
        }
        if status.missing.is_empty() {
            tracing::info!("All models are installed");
        }
        return Ok(());
    }

    let report = if cli.deploy {
        manager.deploy_all().await
    } else {
        manager.remove_all().await
    };
    tracing::info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "Model lifecycle pass complete"
    );
    if report.succeeded.is_empty() && !report.failed.is_empty() {
        bail!("every model operation failed");
    }
    Ok(())
}
