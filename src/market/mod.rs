//! Benchmark cases: resolved Polymarket markets with a known outcome and the
//! URL the oracle should resolve them from.
//!
//! The case source is loaded once before a run and never written to.

pub mod discovery;

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum CaseSourceError {
    #[error("failed to read case source {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed case source: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The label Polymarket settled on. Only binary markets are benchmarked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "YES", alias = "Yes", alias = "yes")]
    Yes,
    #[serde(rename = "NO", alias = "No", alias = "no")]
    No,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Yes => "YES",
            Outcome::No => "NO",
        }
    }

    /// Case-insensitive parse of a winner label. Anything but yes/no is `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_uppercase().as_str() {
            "YES" => Some(Outcome::Yes),
            "NO" => Some(Outcome::No),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One market to resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCase {
    pub id: String,
    pub question: String,
    #[serde(alias = "resolution_source", alias = "resolution_url")]
    pub resolution_url: String,
    #[serde(alias = "polymarket_resolution", alias = "outcome")]
    pub ground_truth: Outcome,
}

/// `{runId, markets: [...]}` as written by `fetch_cases` or by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSource {
    #[serde(alias = "benchmark_id")]
    pub run_id: String,
    pub markets: Vec<MarketCase>,
}

impl CaseSource {
    /// Load the case source. Any failure here is fatal to the run.
    pub fn load(path: &Path) -> Result<Self, CaseSourceError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CaseSourceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let source = Self::parse(&contents)?;
        info!(
            path = %path.display(),
            run_id = %source.run_id,
            cases = source.markets.len(),
            "loaded case source"
        );
        Ok(source)
    }

    pub fn parse(contents: &str) -> Result<Self, CaseSourceError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Keep only the first `limit` cases, preserving order.
    pub fn truncate(&mut self, limit: Option<usize>) {
        if let Some(n) = limit {
            self.markets.truncate(n);
        }
    }
}
