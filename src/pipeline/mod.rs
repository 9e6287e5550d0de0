//! Per-case resolution state machine.
//!
//! ```text
//! Start → Fetching → [FetchFailed]
//!                  → ContentCheck → [ContentRejected]
//!                                 → Inferring → [InferenceFailed]
//!                                             → Resolved{YES|NO}
//! ```
//!
//! Every case reaches exactly one terminal state and yields exactly one
//! [`CaseResult`]. No stage error escapes [`Resolver::resolve`].

pub mod url;

use crate::fetch::{FetchFailureKind, FetchOutcome, Fetcher};
use crate::market::{MarketCase, Outcome};
use crate::validate::{ContentFailureKind, ContentValidator, ValidationOutcome};
use crate::verdict::{is_correct, InferenceFailureKind, Verdict, VerdictOutcome, VerdictRequester};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub use url::normalize_url;

/// Why a case did not resolve. Serialized as its tag, e.g. `web_forbidden`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum FailureReason {
    Fetch(FetchFailureKind),
    Content(ContentFailureKind),
    Inference(InferenceFailureKind),
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Fetch(k) => k.as_str(),
            FailureReason::Content(k) => k.as_str(),
            FailureReason::Inference(k) => k.as_str(),
        }
    }

    pub fn all() -> impl Iterator<Item = FailureReason> {
        FetchFailureKind::ALL
            .into_iter()
            .map(FailureReason::Fetch)
            .chain(ContentFailureKind::ALL.into_iter().map(FailureReason::Content))
            .chain(InferenceFailureKind::ALL.into_iter().map(FailureReason::Inference))
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureReason::all()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown failure reason: {s}"))
    }
}

impl From<FailureReason> for String {
    fn from(r: FailureReason) -> Self {
        r.as_str().to_string()
    }
}

impl TryFrom<String> for FailureReason {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Terminal state of one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    FetchFailed,
    ContentRejected,
    InferenceFailed,
    Resolved(Verdict),
}

/// The single, immutable record produced per case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub case_id: String,
    pub question: String,
    /// Normalized URL that was fetched.
    pub resolution_url: String,
    pub ground_truth: Outcome,
    /// The fetch returned page text (it may still have been rejected).
    pub url_accessible: bool,
    /// A YES/NO verdict was reached.
    pub resolvable: bool,
    pub verdict: Verdict,
    pub correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub reasoning: String,
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl CaseResult {
    pub fn terminal(&self) -> Terminal {
        match self.failure_reason {
            None => Terminal::Resolved(self.verdict),
            Some(FailureReason::Fetch(_)) => Terminal::FetchFailed,
            Some(FailureReason::Content(_)) => Terminal::ContentRejected,
            Some(FailureReason::Inference(InferenceFailureKind::Unresolvable)) => {
                Terminal::Resolved(Verdict::Unresolvable)
            }
            Some(FailureReason::Inference(_)) => Terminal::InferenceFailed,
        }
    }
}

/// Stage output before timing and comparison are attached.
struct Settled {
    url_accessible: bool,
    verdict: Verdict,
    failure: Option<FailureReason>,
    status_code: Option<u16>,
    detail: String,
    reasoning: String,
}

impl Settled {
    fn failed(url_accessible: bool, failure: FailureReason, status_code: Option<u16>, detail: String) -> Self {
        Self {
            url_accessible,
            verdict: Verdict::Unresolvable,
            failure: Some(failure),
            status_code,
            detail,
            reasoning: String::new(),
        }
    }
}

/// Runs one case through fetch, validation and inference.
///
/// The fetcher and the inference behind the requester are injected, so the
/// same state machine serves local runs and hosted collaborators.
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
    validator: ContentValidator,
    requester: VerdictRequester,
    fetch_budget: Duration,
}

impl Resolver {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        validator: ContentValidator,
        requester: VerdictRequester,
        fetch_budget: Duration,
    ) -> Self {
        Self {
            fetcher,
            validator,
            requester,
            fetch_budget,
        }
    }

    pub async fn resolve(&self, case: &MarketCase) -> CaseResult {
        let started = Instant::now();
        let url = normalize_url(&case.resolution_url);

        let settled = self.settle(case, &url).await;

        let resolvable = settled.failure.is_none() && settled.verdict.is_resolved();
        CaseResult {
            case_id: case.id.clone(),
            question: case.question.clone(),
            resolution_url: url,
            ground_truth: case.ground_truth,
            url_accessible: settled.url_accessible,
            resolvable,
            verdict: settled.verdict,
            correct: is_correct(settled.verdict, resolvable, case.ground_truth),
            failure_reason: settled.failure,
            status_code: settled.status_code,
            detail: settled.detail,
            reasoning: settled.reasoning,
            elapsed_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        }
    }

    async fn settle(&self, case: &MarketCase, url: &str) -> Settled {
        debug!(case = %case.id, url, "fetching");
        let fetched = tokio::time::timeout(self.fetch_budget, self.fetcher.fetch(url, self.fetch_budget))
            .await
            .unwrap_or_else(|_| FetchOutcome::timed_out(self.fetch_budget));

        let (content, fetch_status) = match fetched {
            FetchOutcome::Failed {
                reason,
                status_code,
                detail,
            } => return Settled::failed(false, FailureReason::Fetch(reason), status_code, detail),
            FetchOutcome::Accessible {
                content,
                status_code,
            } => (content, status_code),
        };

        debug!(case = %case.id, chars = content.len(), "checking content");
        let content = match self.validator.validate(&content) {
            ValidationOutcome::Rejected { reason, detail } => {
                return Settled::failed(true, FailureReason::Content(reason), fetch_status, detail)
            }
            ValidationOutcome::Valid { content } => content,
        };

        debug!(case = %case.id, "inferring");
        match self.requester.request(&case.question, url, &content).await {
            VerdictOutcome::Resolved { verdict, reasoning } => Settled {
                url_accessible: true,
                verdict,
                failure: None,
                status_code: fetch_status,
                detail: String::new(),
                reasoning,
            },
            VerdictOutcome::Failed {
                reason,
                detail,
                reasoning,
            } => Settled {
                reasoning,
                ..Settled::failed(true, FailureReason::Inference(reason), fetch_status, detail)
            },
        }
    }
}
