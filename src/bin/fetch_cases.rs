//! Build a case source from settled Polymarket markets.
//!
//! Scans closed markets on the CLOB API, keeps binary markets with a clear
//! YES/NO winner and a resolution URL in the description, and writes them as
//! `{runId, markets}` ready for `oraclebench`.
//!
//! Usage:
//!   cargo run --bin fetch_cases -- --max-cases 50 --out data/markets.json

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use oraclebench::market::discovery::ClosedMarketScanner;

#[derive(Parser, Debug)]
#[command(name = "fetch_cases", version, about = "Fetch settled markets into a case source")]
struct Cli {
    #[arg(long, default_value = "https://clob.polymarket.com")]
    clob_url: String,
    #[arg(long, default_value_t = 20, help = "Maximum CLOB pages to scan")]
    max_pages: usize,
    #[arg(long, default_value_t = 100)]
    max_cases: usize,
    #[arg(long, default_value = "data/markets.json")]
    out: PathBuf,
    #[arg(long, help = "Run id written into the case source (default: timestamp)")]
    run_id: Option<String>,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let run_id = cli
        .run_id
        .unwrap_or_else(|| format!("bench-{}", Utc::now().format("%Y%m%d-%H%M%S")));

    let scanner = ClosedMarketScanner::new(cli.clob_url.trim_end_matches('/').to_string());
    let (source, stats) = scanner
        .discover(run_id, cli.max_pages, cli.max_cases)
        .await?;

    if let Some(parent) = cli.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(&source)?;
    std::fs::write(&cli.out, body).with_context(|| format!("cannot write {}", cli.out.display()))?;

    info!(
        out = %cli.out.display(),
        scanned = stats.scanned,
        settled = stats.settled,
        cases = stats.cases,
        "case source written"
    );

    println!("=== {} ===", source.run_id);
    println!("Scanned: {}  |  Settled: {}  |  Cases: {}", stats.scanned, stats.settled, stats.cases);
    println!("By category:");
    for (cat, n) in &stats.by_category {
        println!("  {cat:<16} {n}");
    }
    println!("By source type:");
    for (kind, n) in &stats.by_source_type {
        println!("  {kind:<16} {n}");
    }
    Ok(())
}
