//! Generate synthetic blood reports to the console, PDF, or CSV.
use anyhow::{Context, Result};
use clap::Parser;
use insightmed::{
    config, logging,
    reports::{ReportGenerator, ReportOptions, patient::RandomUserClient},
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "insightmed-blood-report",
    about = "Generate synthetic blood reports for random patients"
)]
struct Cli {
    /// Number of patients to generate
    #[arg(long)]
    patients: usize,
    /// Number of samples to generate per patient
    #[arg(long)]
    samples: usize,
    /// Start year for the reports
    #[arg(long)]
    start_year: i32,
    /// End year for the reports
    #[arg(long)]
    end_year: i32,
    /// Minimum percentage to extend the range
    #[arg(long, default_value_t = 0.0)]
    percentage_min: f64,
    /// Maximum percentage to extend the range
    #[arg(long, default_value_t = 10.0)]
    percentage_max: f64,
    /// Suppress the within range or out of range status in the report
    #[arg(long)]
    silent: bool,
    /// Save the reports as PDF files
    #[arg(long)]
    to_pdf: bool,
    /// Save the reports as CSV files
    #[arg(long)]
    to_csv: bool,
    /// Directory to save the PDF/CSV files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
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
    let options = ReportOptions {
        patients: cli.patients,
        samples: cli.samples,
        start_year: cli.start_year,
        end_year: cli.end_year,
        percentage_min: cli.percentage_min,
        percentage_max: cli.percentage_max,
        silent: cli.silent,
        to_pdf: cli.to_pdf,
        to_csv: cli.to_csv,
        output_dir: cli.output_dir,
    };
    let people = RandomUserClient::new(config::random_user_url())
        .context("failed to build random-person client")?;
    let generator = ReportGenerator::new(&people, options).context("invalid report options")?;

    let mut stdout = std::io::stdout().lock();
    let written = generator
        .run(&mut stdout)
        .await
        .context("failed to generate reports")?;
    tracing::info!(files = written.len(), "Report generation complete");
    Ok(())
}
