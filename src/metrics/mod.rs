//! Run metrics.
//!
//! Only raw counters are kept. Resolvability, accuracy and average time are
//! recomputed from them on every read, so the persisted rates always equal
//! the counters they were written next to.

use crate::pipeline::CaseResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Histogram key for resolvable cases that disagreed with the ground truth.
pub const WRONG_RESOLUTION: &str = "wrong_resolution";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "MetricsSnapshot", from = "MetricsSnapshot")]
pub struct RunMetrics {
    pub processed: u64,
    /// Cases whose fetch returned page text.
    pub fetched: u64,
    /// Cases that reached a YES/NO verdict.
    pub accessible: u64,
    pub correct: u64,
    pub wrong_resolution: u64,
    /// Failure tag → count, plus `wrong_resolution`.
    pub failure_breakdown: BTreeMap<String, u64>,
    pub total_elapsed_ms: u64,
}

/// Wire form: counters plus derived rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub processed: u64,
    pub fetched: u64,
    pub accessible: u64,
    pub correct: u64,
    pub wrong_resolution: u64,
    pub failure_breakdown: BTreeMap<String, u64>,
    pub total_elapsed_ms: u64,
    #[serde(default)]
    pub resolvability_rate: f64,
    #[serde(default)]
    pub accuracy_rate: f64,
    #[serde(default)]
    pub avg_resolution_time_ms: f64,
}

impl From<RunMetrics> for MetricsSnapshot {
    fn from(m: RunMetrics) -> Self {
        Self {
            resolvability_rate: m.resolvability_rate(),
            accuracy_rate: m.accuracy_rate(),
            avg_resolution_time_ms: m.avg_resolution_time_ms(),
            processed: m.processed,
            fetched: m.fetched,
            accessible: m.accessible,
            correct: m.correct,
            wrong_resolution: m.wrong_resolution,
            failure_breakdown: m.failure_breakdown,
            total_elapsed_ms: m.total_elapsed_ms,
        }
    }
}

// Derived rates on the wire are ignored; they are recomputed.
impl From<MetricsSnapshot> for RunMetrics {
    fn from(s: MetricsSnapshot) -> Self {
        Self {
            processed: s.processed,
            fetched: s.fetched,
            accessible: s.accessible,
            correct: s.correct,
            wrong_resolution: s.wrong_resolution,
            failure_breakdown: s.failure_breakdown,
            total_elapsed_ms: s.total_elapsed_ms,
        }
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a batch of results in order.
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a CaseResult>) -> Self {
        let mut m = Self::new();
        for r in results {
            m.record(r);
        }
        m
    }

    /// Fold one case result into the counters.
    pub fn record(&mut self, result: &CaseResult) {
        self.processed += 1;
        self.total_elapsed_ms += result.elapsed_ms;
        if result.url_accessible {
            self.fetched += 1;
        }

        if result.resolvable {
            self.accessible += 1;
            if result.correct {
                self.correct += 1;
            } else {
                self.wrong_resolution += 1;
                *self
                    .failure_breakdown
                    .entry(WRONG_RESOLUTION.to_string())
                    .or_default() += 1;
            }
        } else if let Some(reason) = result.failure_reason {
            *self
                .failure_breakdown
                .entry(reason.as_str().to_string())
                .or_default() += 1;
        }
    }

    /// accessible / processed, 0 before the first case.
    pub fn resolvability_rate(&self) -> f64 {
        ratio(self.accessible, self.processed)
    }

    /// correct / accessible, 0 while nothing is accessible.
    pub fn accuracy_rate(&self) -> f64 {
        ratio(self.correct, self.accessible)
    }

    pub fn avg_resolution_time_ms(&self) -> f64 {
        ratio(self.total_elapsed_ms, self.processed)
    }

    pub fn failures(&self, tag: &str) -> u64 {
        self.failure_breakdown.get(tag).copied().unwrap_or(0)
    }

    pub fn log_summary(&self) {
        info!(
            processed = self.processed,
            fetched = self.fetched,
            accessible = self.accessible,
            correct = self.correct,
            wrong = self.wrong_resolution,
            resolvability = format!("{:.1}%", self.resolvability_rate() * 100.0),
            accuracy = format!("{:.1}%", self.accuracy_rate() * 100.0),
            avg_time = format!("{:.0}ms", self.avg_resolution_time_ms()),
            "run metrics"
        );
        for (tag, count) in &self.failure_breakdown {
            info!(reason = %tag, count, "failure breakdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchFailureKind;
    use crate::market::Outcome;
    use crate::pipeline::FailureReason;
    use crate::validate::ContentFailureKind;
    use crate::verdict::{InferenceFailureKind, Verdict};
    use chrono::Utc;

    fn result(verdict: Verdict, failure: Option<FailureReason>, correct: bool, elapsed_ms: u64) -> CaseResult {
        let resolvable = failure.is_none();
        CaseResult {
            case_id: "c".into(),
            question: "Q?".into(),
            resolution_url: "https://a.b".into(),
            ground_truth: Outcome::Yes,
            url_accessible: !matches!(failure, Some(FailureReason::Fetch(_))),
            resolvable,
            verdict,
            correct,
            failure_reason: failure,
            status_code: None,
            detail: String::new(),
            reasoning: String::new(),
            elapsed_ms,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_empty_metrics_are_zero() {
        let m = RunMetrics::new();
        assert_eq!(m.resolvability_rate(), 0.0);
        assert_eq!(m.accuracy_rate(), 0.0);
        assert_eq!(m.avg_resolution_time_ms(), 0.0);
    }

    #[test]
    fn test_record_mixed_batch() {
        let batch = vec![
            result(Verdict::Yes, None, true, 100),
            result(Verdict::No, None, false, 200),
            result(Verdict::Unresolvable, Some(FailureReason::Fetch(FetchFailureKind::Forbidden)), false, 50),
            result(Verdict::Unresolvable, Some(FailureReason::Content(ContentFailureKind::Paywall)), false, 70),
            result(
                Verdict::Unresolvable,
                Some(FailureReason::Inference(InferenceFailureKind::Unresolvable)),
                false,
                80,
            ),
        ];
        let m = RunMetrics::from_results(&batch);

        assert_eq!(m.processed, 5);
        assert_eq!(m.fetched, 4);
        assert_eq!(m.accessible, 2);
        assert_eq!(m.correct, 1);
        assert_eq!(m.wrong_resolution, 1);
        assert_eq!(m.failures("web_forbidden"), 1);
        assert_eq!(m.failures("content_paywall"), 1);
        assert_eq!(m.failures("llm_unresolvable"), 1);
        assert_eq!(m.failures(WRONG_RESOLUTION), 1);
        assert_eq!(m.resolvability_rate(), 2.0 / 5.0);
        assert_eq!(m.accuracy_rate(), 1.0 / 2.0);
        assert_eq!(m.avg_resolution_time_ms(), 500.0 / 5.0);
    }

    #[test]
    fn test_rates_hold_after_every_step() {
        let mut m = RunMetrics::new();
        for i in 0..30u64 {
            let r = match i % 3 {
                0 => result(Verdict::Yes, None, true, i),
                1 => result(Verdict::No, None, i % 2 == 0, i),
                _ => result(
                    Verdict::Unresolvable,
                    Some(FailureReason::Fetch(FetchFailureKind::Timeout)),
                    false,
                    i,
                ),
            };
            m.record(&r);
            assert_eq!(m.resolvability_rate(), m.accessible as f64 / m.processed as f64);
            let expected_acc = if m.accessible == 0 {
                0.0
            } else {
                m.correct as f64 / m.accessible as f64
            };
            assert_eq!(m.accuracy_rate(), expected_acc);
        }
    }

    #[test]
    fn test_snapshot_carries_derived_rates() {
        let m = RunMetrics::from_results(&[
            result(Verdict::Yes, None, true, 10),
            result(Verdict::Unresolvable, Some(FailureReason::Fetch(FetchFailureKind::DnsError)), false, 30),
        ]);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["processed"], 2);
        assert_eq!(json["resolvabilityRate"], 0.5);
        assert_eq!(json["accuracyRate"], 1.0);
        assert_eq!(json["avgResolutionTimeMs"], 20.0);
        assert_eq!(json["failureBreakdown"]["web_dns_error"], 1);

        // Stale rates on disk do not survive a reload.
        let mut tampered = json.clone();
        tampered["accuracyRate"] = serde_json::json!(0.1);
        let back: RunMetrics = serde_json::from_value(tampered).unwrap();
        assert_eq!(back.accuracy_rate(), 1.0);
        assert_eq!(back, m);
    }
}
