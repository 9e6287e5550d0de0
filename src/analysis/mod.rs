//! Fault attribution over a finished (or partial) run.
//!
//! Every unresolved case lands in one issue bucket (web access, content
//! quality, inference) and is attributed to whoever could have prevented it:
//! the source site (external), the oracle itself, or neither (the page was
//! fine but genuinely did not settle the question).
//!
//! Besides the counts, the module lists the cases worth reading by hand:
//! resolvable answers that disagree with Polymarket, and readable pages the
//! oracle could not settle.

use crate::market::Outcome;
use crate::pipeline::{CaseResult, FailureReason};
use crate::text::snippet;
use crate::validate::ContentFailureKind;
use crate::verdict::{InferenceFailureKind, Verdict};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueBucket {
    Web,
    Content,
    Inference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    /// The source site or its content.
    External,
    /// The oracle's inference.
    Oracle,
    /// The content was readable but did not settle the question.
    Ambiguous,
}

/// Bucket and fault for one failure tag. Bot walls count as web access
/// issues even though they are detected on the page content.
pub fn attribute(reason: FailureReason) -> (IssueBucket, Fault) {
    match reason {
        FailureReason::Fetch(_) => (IssueBucket::Web, Fault::External),
        FailureReason::Content(ContentFailureKind::AntiBot) => (IssueBucket::Web, Fault::External),
        FailureReason::Content(_) => (IssueBucket::Content, Fault::External),
        FailureReason::Inference(InferenceFailureKind::Unresolvable) => {
            (IssueBucket::Inference, Fault::Ambiguous)
        }
        FailureReason::Inference(_) => (IssueBucket::Inference, Fault::Oracle),
    }
}

/// Leading text of an `llm_error` detail produced by a failed equivalence check.
pub const CONSENSUS_MARKER: &str = "equivalence check failed";

/// An `llm_error` caused by repeated inference rounds disagreeing.
pub fn is_consensus_failure(result: &CaseResult) -> bool {
    result.failure_reason == Some(FailureReason::Inference(InferenceFailureKind::Error))
        && result.detail.contains(CONSENSUS_MARKER)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BucketCounts {
    pub total: u64,
    pub by_reason: BTreeMap<String, u64>,
}

impl BucketCounts {
    fn add(&mut self, reason: FailureReason) {
        self.total += 1;
        *self.by_reason.entry(reason.as_str().to_string()).or_default() += 1;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FaultReport {
    pub total: u64,
    pub resolvable: u64,
    pub correct: u64,
    pub wrong: u64,
    pub web: BucketCounts,
    pub content: BucketCounts,
    pub inference: BucketCounts,
    /// Subset of `llm_error` where the equivalence rounds disagreed.
    pub consensus_failures: u64,
    pub external_fault: u64,
    pub oracle_fault: u64,
    pub ambiguous: u64,
}

impl FaultReport {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a CaseResult>) -> Self {
        let mut report = Self::default();
        for r in results {
            report.total += 1;
            if r.resolvable {
                report.resolvable += 1;
                if r.correct {
                    report.correct += 1;
                } else {
                    report.wrong += 1;
                }
                continue;
            }
            let Some(reason) = r.failure_reason else { continue };
            if is_consensus_failure(r) {
                report.consensus_failures += 1;
            }
            let (bucket, fault) = attribute(reason);
            match bucket {
                IssueBucket::Web => report.web.add(reason),
                IssueBucket::Content => report.content.add(reason),
                IssueBucket::Inference => report.inference.add(reason),
            }
            match fault {
                Fault::External => report.external_fault += 1,
                Fault::Oracle => report.oracle_fault += 1,
                Fault::Ambiguous => report.ambiguous += 1,
            }
        }
        report
    }

    fn pct(&self, n: u64, of: u64) -> f64 {
        if of == 0 {
            0.0
        } else {
            n as f64 * 100.0 / of as f64
        }
    }

    /// Plain-text report for the terminal.
    pub fn render(&self) -> String {
        let rule = "═".repeat(60);
        let mut out = String::new();
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "  ORACLE BENCHMARK ANALYSIS");
        let _ = writeln!(out, "{rule}\n");

        let _ = writeln!(out, "OVERALL");
        let _ = writeln!(out, "  Total cases:  {}", self.total);
        let _ = writeln!(
            out,
            "  Resolvable:   {} ({:.1}%)",
            self.resolvable,
            self.pct(self.resolvable, self.total)
        );
        let _ = writeln!(
            out,
            "  Correct:      {} / {} ({:.1}%)",
            self.correct,
            self.resolvable,
            self.pct(self.correct, self.resolvable)
        );
        let _ = writeln!(out, "  Wrong:        {}\n", self.wrong);

        let _ = writeln!(out, "FAULT ATTRIBUTION");
        let _ = writeln!(
            out,
            "  External:     {} ({:.1}%)",
            self.external_fault,
            self.pct(self.external_fault, self.total)
        );
        let _ = writeln!(
            out,
            "  Oracle:       {} ({:.1}%)",
            self.oracle_fault,
            self.pct(self.oracle_fault, self.total)
        );
        let _ = writeln!(out, "  Ambiguous:    {}\n", self.ambiguous);

        for (title, bucket) in [
            ("WEB ACCESS", &self.web),
            ("CONTENT QUALITY", &self.content),
            ("INFERENCE", &self.inference),
        ] {
            let _ = writeln!(out, "{title} ({})", bucket.total);
            for (tag, n) in &bucket.by_reason {
                let _ = writeln!(out, "  {tag:<24} {n}");
            }
            if title == "INFERENCE" && self.consensus_failures > 0 {
                let _ = writeln!(out, "  of which consensus failures: {}", self.consensus_failures);
            }
            let _ = writeln!(out);
        }
        let _ = writeln!(out, "{rule}");
        out
    }
}

/// One case pulled out for manual review.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseNote {
    pub case_id: String,
    pub question: String,
    pub resolution_url: String,
    pub expected: Outcome,
    pub verdict: Verdict,
    pub reasoning: String,
}

impl From<&CaseResult> for CaseNote {
    fn from(r: &CaseResult) -> Self {
        Self {
            case_id: r.case_id.clone(),
            question: r.question.clone(),
            resolution_url: r.resolution_url.clone(),
            expected: r.ground_truth,
            verdict: r.verdict,
            reasoning: r.reasoning.clone(),
        }
    }
}

/// Resolvable cases whose verdict differs from the settled outcome.
pub fn wrong_answers<'a>(results: impl IntoIterator<Item = &'a CaseResult>) -> Vec<CaseNote> {
    results
        .into_iter()
        .filter(|r| r.resolvable && !r.correct)
        .map(CaseNote::from)
        .collect()
}

/// Cases where the page was read but the oracle answered UNRESOLVABLE.
pub fn ambiguous_cases<'a>(results: impl IntoIterator<Item = &'a CaseResult>) -> Vec<CaseNote> {
    results
        .into_iter()
        .filter(|r| {
            r.failure_reason == Some(FailureReason::Inference(InferenceFailureKind::Unresolvable))
        })
        .map(CaseNote::from)
        .collect()
}

/// Numbered listing of `notes` under `title`.
pub fn render_notes(title: &str, notes: &[CaseNote]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{title} ({})", notes.len());
    let _ = writeln!(out, "{}", "─".repeat(60));
    for (i, n) in notes.iter().enumerate() {
        let _ = writeln!(out, "{}. [{}] {}", i + 1, n.case_id, snippet(&n.question, 100));
        let _ = writeln!(out, "   Expected: {}  |  Oracle: {}", n.expected, n.verdict);
        let _ = writeln!(out, "   URL: {}", n.resolution_url);
        if n.reasoning.is_empty() {
            let _ = writeln!(out, "   Reasoning: (none)");
        } else {
            let _ = writeln!(out, "   Reasoning: {}", snippet(&n.reasoning, 300));
        }
    }
    let _ = writeln!(out);
    out
}
