//! JSON result store for one benchmark run.
//!
//! Document layout:
//!   runId, startedAt, status (running|completed), totalCases, completed,
//!   results[]     → one CaseResult per processed case, input order
//!   metrics       → RunMetrics snapshot matching results[]
//!   completedAt   → set by finish()
//!
//! The whole document is rewritten after every case through a temp file and
//! a rename, so a reader (the dashboard) never sees a half-written file.

use crate::metrics::RunMetrics;
use crate::pipeline::CaseResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed result document: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDocument {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    pub total_cases: usize,
    pub completed: usize,
    pub results: Vec<CaseResult>,
    pub metrics: RunMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunDocument {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Owns the result document for the lifetime of a run.
pub struct ResultStore {
    path: PathBuf,
    doc: RunDocument,
}

impl ResultStore {
    /// Create (or truncate) the result file with an empty `running` document.
    pub fn open(path: impl Into<PathBuf>, run_id: &str, total_cases: usize) -> Result<Self, StoreError> {
        let store = Self {
            path: path.into(),
            doc: RunDocument {
                run_id: run_id.to_string(),
                started_at: Utc::now(),
                status: RunStatus::Running,
                total_cases,
                completed: 0,
                results: Vec::with_capacity(total_cases),
                metrics: RunMetrics::new(),
                completed_at: None,
            },
        };
        store.flush()?;
        info!(path = %store.path.display(), run_id, total_cases, "result store opened");
        Ok(store)
    }

    /// Append one result together with the metrics that include it.
    pub fn record(&mut self, result: CaseResult, metrics: &RunMetrics) -> Result<(), StoreError> {
        self.doc.results.push(result);
        self.doc.completed = self.doc.results.len();
        self.doc.metrics = metrics.clone();
        self.flush()?;
        debug!(completed = self.doc.completed, total = self.doc.total_cases, "result persisted");
        Ok(())
    }

    /// Mark the run completed and return the final document.
    pub fn finish(mut self) -> Result<RunDocument, StoreError> {
        self.doc.status = RunStatus::Completed;
        self.doc.completed_at = Some(Utc::now());
        self.flush()?;
        info!(
            path = %self.path.display(),
            completed = self.doc.completed,
            total = self.doc.total_cases,
            "run completed"
        );
        Ok(self.doc)
    }

    pub fn document(&self) -> &RunDocument {
        &self.doc
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let body = serde_json::to_vec_pretty(&self.doc)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}
