//! Benchmark dashboard. Serves the result store and case source read-only
//! while a run is in progress (or after it finished).
//!
//! Usage:
//!   cargo run --bin bench_dash
//!   cargo run --bin bench_dash -- --bind 127.0.0.1:5050 --results results/run.json

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use oraclebench::config::Config;
use oraclebench::dashboard::{self, DashboardState};

#[derive(Parser, Debug)]
#[command(name = "bench_dash", version, about = "Serve the benchmark dashboard")]
struct Cli {
    #[arg(long, default_value = "oraclebench.toml")]
    config: PathBuf,
    #[arg(long, help = "Listen address, overrides dashboard.bind")]
    bind: Option<String>,
    #[arg(long)]
    results: Option<PathBuf>,
    #[arg(long)]
    cases: Option<PathBuf>,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(_) => Config::from_env(),
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let results = cli.results.unwrap_or(config.paths.results);
    let cases = cli.cases.unwrap_or(config.paths.cases);
    let bind = cli.bind.unwrap_or(config.dashboard.bind);

    info!(
        results = %results.display(),
        cases = %cases.display(),
        "serving benchmark dashboard on http://{}",
        bind
    );
    dashboard::serve(DashboardState::new(results, cases), &bind).await
}
