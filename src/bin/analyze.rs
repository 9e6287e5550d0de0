//! Fault-attribution report for a result store.
//!
//! Usage:
//!   cargo run --bin analyze
//!   cargo run --bin analyze -- --results results/run.json --json
//!   cargo run --bin analyze -- --wrong --ambiguous

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use oraclebench::analysis::{ambiguous_cases, render_notes, wrong_answers, FaultReport};
use oraclebench::store::RunDocument;

#[derive(Parser, Debug)]
#[command(name = "analyze", version, about = "Attribute benchmark failures")]
struct Cli {
    #[arg(long, default_value = "results/benchmark_results.json")]
    results: PathBuf,
    #[arg(long, help = "Output machine-readable JSON")]
    json: bool,
    #[arg(long, help = "List resolvable cases the oracle got wrong")]
    wrong: bool,
    #[arg(long, help = "List cases the oracle judged UNRESOLVABLE, with reasoning")]
    ambiguous: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let doc = RunDocument::load(&cli.results)
        .with_context(|| format!("cannot read result store {}", cli.results.display()))?;
    let report = FaultReport::from_results(&doc.results);
    let wrong = cli.wrong.then(|| wrong_answers(&doc.results));
    let ambiguous = cli.ambiguous.then(|| ambiguous_cases(&doc.results));

    if cli.json {
        let mut out = serde_json::json!({
            "runId": doc.run_id,
            "status": doc.status,
            "report": report,
        });
        if let Some(wrong) = &wrong {
            out["wrongAnswers"] = serde_json::to_value(wrong)?;
        }
        if let Some(ambiguous) = &ambiguous {
            out["ambiguous"] = serde_json::to_value(ambiguous)?;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Run {} ({}, {}/{} cases)\n", doc.run_id, doc.status, doc.completed, doc.total_cases);
        print!("{}", report.render());
        if let Some(wrong) = &wrong {
            print!("\n{}", render_notes("WRONG ANSWERS", wrong));
        }
        if let Some(ambiguous) = &ambiguous {
            print!("\n{}", render_notes("AMBIGUOUS (llm_unresolvable)", ambiguous));
        }
    }
    Ok(())
}
