//! Benchmark run loop.
//!
//! Drives every case through the [`Resolver`], folds results into
//! [`RunMetrics`] and persists them, one case at a time, in input order.
//! With `concurrency > 1` several cases are resolved at once, but results are
//! still consumed in order by this single loop, so the metrics and the store
//! never see interleaved updates.

use crate::market::MarketCase;
use crate::metrics::RunMetrics;
use crate::pipeline::{CaseResult, Resolver};
use crate::store::{ResultStore, StoreError};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Cases resolved at once. 1 means strictly sequential.
    pub concurrency: usize,
    /// Delay between cases in sequential mode.
    pub pacing: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            pacing: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub total_cases: usize,
    pub results: Vec<CaseResult>,
    pub metrics: RunMetrics,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn completed(&self) -> usize {
        self.results.len()
    }
}

pub struct Runner {
    resolver: Arc<Resolver>,
    opts: RunOptions,
}

impl Runner {
    pub fn new(resolver: Arc<Resolver>, opts: RunOptions) -> Self {
        Self {
            resolver,
            opts: RunOptions {
                concurrency: opts.concurrency.max(1),
                ..opts
            },
        }
    }

    /// Resolve all cases. Only a store write failure aborts the run.
    ///
    /// On cancellation the loop stops between cases; in-flight cases are
    /// dropped and the store keeps the records completed so far, with status
    /// still `running`.
    pub async fn run(
        &self,
        cases: Vec<MarketCase>,
        mut store: ResultStore,
        cancel: CancellationToken,
    ) -> Result<RunSummary, StoreError> {
        let total = cases.len();
        let run_id = store.document().run_id.clone();
        let sequential = self.opts.concurrency == 1;
        info!(
            run_id = %run_id,
            total,
            concurrency = self.opts.concurrency,
            "starting benchmark run"
        );

        let resolver = self.resolver.clone();
        let mut resolved = stream::iter(cases)
            .map(move |case| {
                let resolver = resolver.clone();
                async move { resolver.resolve(&case).await }
            })
            .buffered(self.opts.concurrency);

        let mut metrics = RunMetrics::new();
        let mut results = Vec::with_capacity(total);
        let mut cancelled = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = resolved.next() => next,
            };
            let Some(result) = next else { break };

            metrics.record(&result);
            log_case(results.len() + 1, total, &result);
            store.record(result.clone(), &metrics)?;
            results.push(result);

            if sequential && results.len() < total && !self.opts.pacing.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.opts.pacing) => {}
                }
            }
        }

        if cancelled {
            warn!(completed = results.len(), total, "run cancelled, partial results kept");
        } else {
            store.finish()?;
        }
        metrics.log_summary();

        Ok(RunSummary {
            run_id,
            total_cases: total,
            results,
            metrics,
            cancelled,
        })
    }
}

fn log_case(n: usize, total: usize, r: &CaseResult) {
    match r.failure_reason {
        None => info!(
            case = %r.case_id,
            verdict = %r.verdict,
            truth = %r.ground_truth,
            correct = r.correct,
            ms = r.elapsed_ms,
            "[{}/{}] resolved",
            n,
            total
        ),
        Some(reason) => info!(
            case = %r.case_id,
            reason = %reason,
            status = ?r.status_code,
            ms = r.elapsed_ms,
            "[{}/{}] unresolved",
            n,
            total
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchOutcome, Fetcher};
    use crate::llm::{Inference, InferenceError, ResponseFormat};
    use crate::market::Outcome;
    use crate::store::{RunDocument, RunStatus};
    use crate::validate::ContentValidator;
    use crate::verdict::VerdictRequester;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// Slower for lower case numbers, so completion order is reversed.
    struct SlowFirst;

    #[async_trait]
    impl Fetcher for SlowFirst {
        async fn fetch(&self, url: &str, _budget: Duration) -> FetchOutcome {
            let n: u64 = url.rsplit('/').next().and_then(|s| s.parse().ok()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(50u64.saturating_sub(n * 10))).await;
            FetchOutcome::Accessible {
                content: "The official results page confirms the event happened. ".repeat(4),
                status_code: Some(200),
            }
        }
    }

    /// Cancels the run when case `at` is fetched, and never finishes that fetch.
    struct CancelAt {
        at: usize,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl Fetcher for CancelAt {
        async fn fetch(&self, url: &str, _budget: Duration) -> FetchOutcome {
            if url.ends_with(&format!("/{}", self.at)) {
                self.cancel.cancel();
                std::future::pending::<()>().await;
            }
            FetchOutcome::Accessible {
                content: "The official results page confirms the event happened. ".repeat(4),
                status_code: Some(200),
            }
        }
    }

    struct AlwaysYes;

    #[async_trait]
    impl Inference for AlwaysYes {
        async fn infer(&self, _: &str, _: ResponseFormat) -> Result<Value, InferenceError> {
            Ok(json!({"answer": "YES", "reasoning": "confirmed"}))
        }
    }

    fn runner(concurrency: usize) -> Runner {
        runner_with(Arc::new(SlowFirst), concurrency)
    }

    fn runner_with(fetcher: Arc<dyn Fetcher>, concurrency: usize) -> Runner {
        let resolver = Resolver::new(
            fetcher,
            ContentValidator::default(),
            VerdictRequester::new(Arc::new(AlwaysYes), 8000, Duration::from_secs(5)),
            Duration::from_secs(5),
        );
        Runner::new(
            Arc::new(resolver),
            RunOptions {
                concurrency,
                pacing: Duration::ZERO,
            },
        )
    }

    fn cases(n: usize) -> Vec<MarketCase> {
        (0..n)
            .map(|i| MarketCase {
                id: format!("case-{i}"),
                question: format!("Did event {i} happen?"),
                resolution_url: format!("example.com/{i}"),
                ground_truth: if i % 2 == 0 { Outcome::Yes } else { Outcome::No },
            })
            .collect()
    }

    #[tokio::test]
    async fn test_concurrent_run_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let store = ResultStore::open(&path, "order", 5).unwrap();

        let summary = runner(4)
            .run(cases(5), store, CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<_> = summary.results.iter().map(|r| r.case_id.clone()).collect();
        assert_eq!(ids, ["case-0", "case-1", "case-2", "case-3", "case-4"]);
        assert!(!summary.cancelled);
        assert_eq!(summary.metrics.processed, 5);
        assert_eq!(summary.metrics.accessible, 5);
        assert_eq!(summary.metrics.correct, 3);

        let doc = RunDocument::load(&path).unwrap();
        assert_eq!(doc.status, RunStatus::Completed);
        let stored: Vec<_> = doc.results.iter().map(|r| r.case_id.clone()).collect();
        assert_eq!(stored, ids);
    }

    #[tokio::test]
    async fn test_cancelled_run_stays_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let store = ResultStore::open(&path, "cancel", 3).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = runner(1).run(cases(3), store, cancel).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.completed(), 0);

        let doc = RunDocument::load(&path).unwrap();
        assert_eq!(doc.status, RunStatus::Running);
        assert!(doc.results.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_run_keeps_completed_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let store = ResultStore::open(&path, "midway", 5).unwrap();
        let cancel = CancellationToken::new();
        let fetcher = CancelAt {
            at: 2,
            cancel: cancel.clone(),
        };

        let summary = runner_with(Arc::new(fetcher), 1)
            .run(cases(5), store, cancel)
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.completed(), 2);

        let doc = RunDocument::load(&path).unwrap();
        assert_eq!(doc.status, RunStatus::Running);
        assert!(doc.completed_at.is_none());
        assert_eq!(doc.completed, 2);
        assert_eq!(doc.results.len(), 2);
        let stored: Vec<_> = doc.results.iter().map(|r| r.case_id.as_str()).collect();
        assert_eq!(stored, ["case-0", "case-1"]);
        assert_eq!(doc.metrics.processed, 2);
        assert_eq!(doc.metrics.correct, 1);
        assert_eq!(doc.metrics, summary.metrics);
    }

    #[tokio::test]
    async fn test_empty_run_completes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let store = ResultStore::open(&path, "empty", 0).unwrap();

        let summary = runner(1)
            .run(Vec::new(), store, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.metrics.resolvability_rate(), 0.0);
        assert_eq!(RunDocument::load(&path).unwrap().status, RunStatus::Completed);
    }
}
