use anyhow::Context;
use clap::Parser;
use oraclebench::config::Config;
use oraclebench::fetch::{Fetcher, HttpFetcher};
use oraclebench::llm::{Inference, LlmClient};
use oraclebench::market::CaseSource;
use oraclebench::pipeline::Resolver;
use oraclebench::runner::{RunOptions, Runner};
use oraclebench::store::ResultStore;
use oraclebench::validate::ContentValidator;
use oraclebench::verdict::{EquivalentInference, VerdictRequester};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "oraclebench",
    version,
    about = "Benchmark an LLM oracle against settled Polymarket resolutions"
)]
struct Cli {
    #[arg(long, default_value = "oraclebench.toml", help = "Config file (optional)")]
    config: PathBuf,
    #[arg(long, help = "Case source JSON, overrides paths.cases")]
    cases: Option<PathBuf>,
    #[arg(long, help = "Result store JSON, overrides paths.results")]
    results: Option<PathBuf>,
    #[arg(long, help = "Only run the first N cases")]
    limit: Option<usize>,
    #[arg(long, help = "Cases resolved at once (1 = sequential)")]
    concurrency: Option<usize>,
    #[arg(long, help = "Delay between sequential cases in milliseconds")]
    pacing_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    let _ = dotenvy::dotenv();

    // Load config
    let (mut config, from_file) = if cli.config.exists() {
        (Config::load(&cli.config).context("failed to load config")?, true)
    } else {
        (Config::from_env(), false)
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("oraclebench v{} starting", env!("CARGO_PKG_VERSION"));
    if !from_file {
        info!(path = %cli.config.display(), "no config file found, using env-only config");
    }

    // CLI overrides
    if let Some(p) = cli.cases {
        config.paths.cases = p;
    }
    if let Some(p) = cli.results {
        config.paths.results = p;
    }
    if cli.limit.is_some() {
        config.run.limit = cli.limit;
    }
    if let Some(n) = cli.concurrency {
        config.run.concurrency = n;
    }
    if let Some(ms) = cli.pacing_ms {
        config.run.pacing_ms = ms;
    }

    if !config.has_llm_credentials() {
        warn!(
            base_url = %config.llm.base_url,
            "no LLM API key configured (set LLM_API_KEY or OPENAI_API_KEY) - requests may be rejected"
        );
    }

    // --- Cases ---
    let mut source = CaseSource::load(&config.paths.cases)
        .with_context(|| format!("cannot load case source {}", config.paths.cases.display()))?;
    source.truncate(config.run.limit);

    // --- Collaborators ---
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(&config.fetch)?);

    let client = LlmClient::new(config.llm.clone());
    info!(model = client.model(), rounds = config.llm.equivalence_rounds, "inference configured");
    let inference: Arc<dyn Inference> = if config.llm.equivalence_rounds > 1 {
        Arc::new(EquivalentInference::new(client, config.llm.equivalence_rounds))
    } else {
        Arc::new(client)
    };

    let resolver = Resolver::new(
        fetcher,
        ContentValidator::new(config.validation.min_content_chars),
        VerdictRequester::new(inference, config.llm.prompt_window_chars, config.llm.timeout()),
        config.fetch.budget(),
    );

    // --- Run ---
    let store = ResultStore::open(&config.paths.results, &source.run_id, source.markets.len())
        .context("cannot open result store")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping; in-flight cases are dropped");
                cancel.cancel();
            }
        });
    }

    let runner = Runner::new(
        Arc::new(resolver),
        RunOptions {
            concurrency: config.run.concurrency,
            pacing: Duration::from_millis(config.run.pacing_ms),
        },
    );
    let summary = runner
        .run(source.markets, store, cancel)
        .await
        .context("result store write failed")?;

    let m = &summary.metrics;
    println!();
    println!("=== {} ===", summary.run_id);
    println!(
        "Processed:     {}/{}{}",
        summary.completed(),
        summary.total_cases,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    println!(
        "Resolvability: {:.1}% ({}/{})",
        m.resolvability_rate() * 100.0,
        m.accessible,
        m.processed
    );
    println!(
        "Accuracy:      {:.1}% ({}/{})",
        m.accuracy_rate() * 100.0,
        m.correct,
        m.accessible
    );
    println!("Avg time:      {:.0}ms", m.avg_resolution_time_ms());
    println!("Results:       {}", config.paths.results.display());

    Ok(())
}
