//! Command-line entry point: investigate alert payloads read from files.
//!
//! Run with: cargo run --bin triage-agent -- [OPTIONS] <ALERT_FILE>...

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use triage_agent::{
    config::Config,
    metrics::{gather_metrics, register_metrics},
    AlertContext, InvestigationOutcome, Pipeline, TriageEngine,
};

#[derive(Parser)]
#[command(author, version, about = "Triage monitoring alerts into a first-line incident report", long_about = None)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    metrics: bool,

    /// Alert payloads: Azure Monitor common alert schema or bare alert JSON
    #[arg(required = true)]
    alerts: Vec<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if std::env::var("LOG_FORMAT").map(|f| f.eq_ignore_ascii_case("json")).unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_text(path: &Path, outcome: &InvestigationOutcome) {
    println!("=== {} ===", path.display());
    println!("Classification: {}", outcome.classification);
    if let Some(verification) = outcome.verification {
        println!("Verification: {}", verification);
    }
    println!();
    println!("{}", outcome.report);
    println!();
    println!("Steps:");
    for (i, step) in outcome.steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step.replace('\n', "\n     "));
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = Config::load().context("invalid configuration")?;
    info!(
        "Loaded configuration: provider={}, workspace configured={}",
        config.llm.provider,
        !config.logs.workspace_id.is_empty()
    );
    register_metrics().context("failed to register metrics")?;

    let mut alerts = Vec::with_capacity(cli.alerts.len());
    for path in &cli.alerts {
        let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        let alert = AlertContext::from_json(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
        alerts.push(alert);
    }

    let pipeline = Arc::new(Pipeline::from_config(&config).context("failed to assemble the triage pipeline")?);
    let engine = Arc::new(TriageEngine::new(pipeline, alerts.len()));
    engine.clone().start().await;

    let mut handles = Vec::with_capacity(alerts.len());
    for alert in alerts {
        handles.push(engine.submit(alert).await?);
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (path, handle) in cli.alerts.iter().zip(handles) {
        let outcome = handle.outcome().await?;
        if cli.format == OutputFormat::Text {
            print_text(path, &outcome);
        }
        outcomes.push(serde_json::json!({
            "file": path.display().to_string(),
            "outcome": outcome,
        }));
    }

    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    }

    if cli.metrics {
        println!("{}", gather_metrics()?);
    }

    Ok(())
}
