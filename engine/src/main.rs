//! Flakehawk — one-shot CI flakiness analysis for a repository.
//!
//! Pulls a repository's workflow runs and releases, extracts test
//! outcomes from report artifacts and job logs, associates builds
//! with releases, and prints a flakiness report as JSON. Records live
//! in an in-memory store for the duration of the run; embedders wire
//! the library against their own `Store` implementation.

use clap::Parser;
use uuid::Uuid;

use flakehawk_engine::github::GithubClient;
use flakehawk_engine::models::flakiness::TimeRange;
use flakehawk_engine::services::{flakiness, releases, sync};
use flakehawk_engine::store::MemoryStore;
use flakehawk_engine::EngineConfig;

#[derive(Parser)]
#[command(name = "flakehawk", about = "CI flakiness analysis engine")]
struct Cli {
    /// Repository to analyze (owner/name)
    #[arg(short, long)]
    repo: String,

    /// Team identity to scope stored records (random if omitted)
    #[arg(long)]
    team: Option<Uuid>,

    /// Provider API token
    #[arg(long, env = "FLAKEHAWK_GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Analysis window: 7d, 30d, 90d, or all
    #[arg(long, default_value = "all")]
    time_range: String,

    /// Minimum runs before a test group is analyzed
    #[arg(long)]
    min_runs: Option<usize>,

    /// Flakiness threshold (0.0 - 1.0)
    #[arg(long)]
    threshold: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env();
    if let Some(token) = cli.token {
        config.github_token = token;
    }

    flakehawk_engine::metrics::init_metrics();

    let provider = GithubClient::from_config(&config)?;
    let store = MemoryStore::new();
    let team = cli.team.unwrap_or_else(Uuid::new_v4);

    let sync_summary = sync::sync_repository(&store, &provider, team, &cli.repo, &config).await?;
    let association =
        releases::associate_releases(&store, &provider, team, &cli.repo).await?;

    let time_range: TimeRange = cli.time_range.parse().unwrap_or_default();
    let report = flakiness::analyze_flakiness(
        &store,
        team,
        time_range,
        cli.min_runs.unwrap_or(config.min_runs),
        cli.threshold.unwrap_or(config.flakiness_threshold),
    )
    .await?;

    let output = serde_json::json!({
        "sync": sync_summary,
        "releases": association,
        "flakiness": report,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
