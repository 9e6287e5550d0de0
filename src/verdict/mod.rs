//! Verdict requests and comparison against the ground truth.
//!
//! The requester turns validated page text into a prompt, runs it through an
//! [`Inference`] collaborator and folds whatever comes back into exactly one
//! of YES / NO / UNRESOLVABLE. Free text never leaves this module.

pub mod equivalence;

use crate::llm::{Inference, InferenceError, ResponseFormat};
use crate::market::Outcome;
use crate::text::{snippet, truncate_chars};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use equivalence::EquivalentInference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Yes,
    No,
    Unresolvable,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Yes => "YES",
            Verdict::No => "NO",
            Verdict::Unresolvable => "UNRESOLVABLE",
        }
    }

    /// Upper-case, trim, then YES if it contains "YES", else NO if it contains
    /// "NO", else UNRESOLVABLE. The YES check always runs first.
    pub fn normalize(raw: &str) -> Verdict {
        let answer = raw.trim().to_uppercase();
        if answer.contains("YES") {
            Verdict::Yes
        } else if answer.contains("NO") {
            Verdict::No
        } else {
            Verdict::Unresolvable
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Verdict::Yes | Verdict::No)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InferenceFailureKind {
    /// The collaborator raised or timed out.
    Error,
    /// The reply was not a JSON object.
    Malformed,
    /// The reply had no usable `answer`.
    MissingAnswer,
    /// The answer normalized to neither YES nor NO.
    Unresolvable,
}

impl InferenceFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferenceFailureKind::Error => "llm_error",
            InferenceFailureKind::Malformed => "llm_invalid_response",
            InferenceFailureKind::MissingAnswer => "llm_no_answer",
            InferenceFailureKind::Unresolvable => "llm_unresolvable",
        }
    }

    pub const ALL: [InferenceFailureKind; 4] = [
        InferenceFailureKind::Error,
        InferenceFailureKind::Malformed,
        InferenceFailureKind::MissingAnswer,
        InferenceFailureKind::Unresolvable,
    ];
}

impl std::fmt::Display for InferenceFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerdictOutcome {
    /// Verdict is YES or NO.
    Resolved { verdict: Verdict, reasoning: String },
    /// Verdict is UNRESOLVABLE.
    Failed {
        reason: InferenceFailureKind,
        detail: String,
        reasoning: String,
    },
}

impl VerdictOutcome {
    pub fn verdict(&self) -> Verdict {
        match self {
            VerdictOutcome::Resolved { verdict, .. } => *verdict,
            VerdictOutcome::Failed { .. } => Verdict::Unresolvable,
        }
    }

    fn failed(reason: InferenceFailureKind, detail: impl Into<String>, reasoning: String) -> Self {
        VerdictOutcome::Failed {
            reason,
            detail: detail.into(),
            reasoning,
        }
    }
}

/// Verdict label an inference reply would normalize to, if it has an answer.
pub fn answer_label(reply: &Value) -> Option<Verdict> {
    reply
        .get("answer")
        .and_then(Value::as_str)
        .filter(|a| !a.is_empty())
        .map(Verdict::normalize)
}

/// Fold a raw inference reply into a verdict outcome.
pub fn interpret_reply(reply: &Value) -> VerdictOutcome {
    let Some(obj) = reply.as_object() else {
        return VerdictOutcome::failed(
            InferenceFailureKind::Malformed,
            "LLM did not return a JSON object",
            String::new(),
        );
    };

    let reasoning = obj
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let answer = match obj.get("answer") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            return VerdictOutcome::failed(
                InferenceFailureKind::Malformed,
                "LLM 'answer' field is not a string",
                reasoning,
            )
        }
    };
    let Some(answer) = answer else {
        return VerdictOutcome::failed(
            InferenceFailureKind::MissingAnswer,
            "LLM response missing 'answer' field",
            reasoning,
        );
    };

    match Verdict::normalize(answer) {
        Verdict::Unresolvable => VerdictOutcome::failed(
            InferenceFailureKind::Unresolvable,
            "LLM could not determine YES/NO from content",
            reasoning,
        ),
        verdict => VerdictOutcome::Resolved { verdict, reasoning },
    }
}

/// Prompt asking for a strict JSON verdict. Content is cut to `window` chars.
pub fn build_prompt(question: &str, url: &str, content: &str, window: usize) -> String {
    format!(
        "You are resolving a prediction market.

Question: {question}

Webpage content (from {url}):
{page}

Using ONLY the webpage content above, decide whether the question resolved YES or NO.

Reply with a JSON object:
{{
  \"answer\": \"YES\" or \"NO\" or \"UNRESOLVABLE\",
  \"reasoning\": \"One or two sentences citing the evidence on the page\"
}}

If the page does not contain enough information to answer definitively, answer \"UNRESOLVABLE\".",
        page = truncate_chars(content, window),
    )
}

pub struct VerdictRequester {
    inference: Arc<dyn Inference>,
    prompt_window: usize,
    timeout: Duration,
}

impl VerdictRequester {
    pub fn new(inference: Arc<dyn Inference>, prompt_window: usize, timeout: Duration) -> Self {
        Self {
            inference,
            prompt_window,
            timeout,
        }
    }

    pub async fn request(&self, question: &str, url: &str, content: &str) -> VerdictOutcome {
        let prompt = build_prompt(question, url, content, self.prompt_window);

        let reply = match tokio::time::timeout(
            self.timeout,
            self.inference.infer(&prompt, ResponseFormat::Json),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(InferenceError::Malformed(msg))) => {
                return VerdictOutcome::failed(
                    InferenceFailureKind::Malformed,
                    format!("LLM returned invalid JSON: {}", snippet(&msg, 150)),
                    String::new(),
                )
            }
            Ok(Err(e)) => {
                return VerdictOutcome::failed(
                    InferenceFailureKind::Error,
                    format!("LLM execution failed: {}", snippet(&e.to_string(), 150)),
                    String::new(),
                )
            }
            Err(_) => {
                return VerdictOutcome::failed(
                    InferenceFailureKind::Error,
                    format!("LLM execution failed: {}", InferenceError::Timeout(self.timeout)),
                    String::new(),
                )
            }
        };

        let outcome = interpret_reply(&reply);
        debug!(verdict = %outcome.verdict(), "verdict received");
        outcome
    }
}

/// True only for a YES/NO verdict on a resolvable case that equals the truth.
pub fn is_correct(verdict: Verdict, resolvable: bool, ground_truth: Outcome) -> bool {
    resolvable && verdict.is_resolved() && verdict.as_str() == ground_truth.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct Canned {
        reply: Result<Value, fn() -> InferenceError>,
        prompts: Mutex<Vec<String>>,
    }

    impl Canned {
        fn ok(v: Value) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(v),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn err(f: fn() -> InferenceError) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(f),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Inference for Canned {
        async fn infer(&self, prompt: &str, _: ResponseFormat) -> Result<Value, InferenceError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(v) => Ok(v.clone()),
                Err(f) => Err(f()),
            }
        }
    }

    fn requester(inf: Arc<Canned>) -> VerdictRequester {
        VerdictRequester::new(inf, 8000, Duration::from_secs(5))
    }

    #[test]
    fn test_normalize() {
        assert_eq!(Verdict::normalize("Yes, confirmed"), Verdict::Yes);
        assert_eq!(Verdict::normalize("  no  "), Verdict::No);
        assert_eq!(Verdict::normalize("MAYBE"), Verdict::Unresolvable);
        // YES is checked before NO
        assert_eq!(Verdict::normalize("yes and no"), Verdict::Yes);
        assert_eq!(Verdict::normalize("NOT YES"), Verdict::Yes);
        // substring rule: "unknown" contains "NO"
        assert_eq!(Verdict::normalize("unknown"), Verdict::No);
    }

    #[test]
    fn test_normalize_idempotent() {
        for v in [Verdict::Yes, Verdict::No, Verdict::Unresolvable] {
            assert_eq!(Verdict::normalize(v.as_str()), v);
            assert_eq!(Verdict::normalize(Verdict::normalize(v.as_str()).as_str()), v);
        }
    }

    #[test]
    fn test_interpret_reply() {
        assert!(matches!(
            interpret_reply(&json!({"answer": "Yes, confirmed", "reasoning": "r"})),
            VerdictOutcome::Resolved { verdict: Verdict::Yes, ref reasoning } if reasoning == "r"
        ));
        assert!(matches!(
            interpret_reply(&json!("YES")),
            VerdictOutcome::Failed { reason: InferenceFailureKind::Malformed, .. }
        ));
        assert!(matches!(
            interpret_reply(&json!({"answer": true})),
            VerdictOutcome::Failed { reason: InferenceFailureKind::Malformed, .. }
        ));
        assert!(matches!(
            interpret_reply(&json!({"reasoning": "no idea"})),
            VerdictOutcome::Failed { reason: InferenceFailureKind::MissingAnswer, .. }
        ));
        assert!(matches!(
            interpret_reply(&json!({"answer": ""})),
            VerdictOutcome::Failed { reason: InferenceFailureKind::MissingAnswer, .. }
        ));
        assert!(matches!(
            interpret_reply(&json!({"answer": null})),
            VerdictOutcome::Failed { reason: InferenceFailureKind::MissingAnswer, .. }
        ));
        assert!(matches!(
            interpret_reply(&json!({"answer": "MAYBE"})),
            VerdictOutcome::Failed { reason: InferenceFailureKind::Unresolvable, .. }
        ));
    }

    #[test]
    fn test_blank_answer_is_unresolvable() {
        match interpret_reply(&json!({"answer": "   ", "reasoning": "r"})) {
            VerdictOutcome::Failed {
                reason,
                reasoning,
                ..
            } => {
                assert_eq!(reason, InferenceFailureKind::Unresolvable);
                assert_eq!(reasoning, "r");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(answer_label(&json!({"answer": "  "})), Some(Verdict::Unresolvable));
        assert_eq!(answer_label(&json!({"answer": ""})), None);
    }

    #[test]
    fn test_prompt_window() {
        let content = "z".repeat(20_000);
        let prompt = build_prompt("Will it?", "https://a.b", &content, 8000);
        assert_eq!(prompt.matches('z').count(), 8000);
        assert!(prompt.contains("Question: Will it?"));
        assert!(prompt.contains("UNRESOLVABLE"));
    }

    #[tokio::test]
    async fn test_request_resolved() {
        let inf = Canned::ok(json!({"answer": "NO", "reasoning": "lost"}));
        let outcome = requester(inf.clone()).request("Q?", "https://a.b", "page").await;
        assert_eq!(outcome.verdict(), Verdict::No);
        assert_eq!(inf.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_request_collaborator_error() {
        let inf = Canned::err(|| InferenceError::Request("boom".into()));
        let outcome = requester(inf).request("Q?", "u", "page").await;
        match outcome {
            VerdictOutcome::Failed { reason, detail, .. } => {
                assert_eq!(reason, InferenceFailureKind::Error);
                assert!(detail.contains("boom"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_unparseable_is_malformed() {
        let inf = Canned::err(|| InferenceError::Malformed("not json".into()));
        let outcome = requester(inf).request("Q?", "u", "page").await;
        assert!(matches!(
            outcome,
            VerdictOutcome::Failed { reason: InferenceFailureKind::Malformed, .. }
        ));
    }

    #[tokio::test]
    async fn test_request_timeout_is_error() {
        struct Slow;
        #[async_trait]
        impl Inference for Slow {
            async fn infer(&self, _: &str, _: ResponseFormat) -> Result<Value, InferenceError> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(json!({"answer": "YES"}))
            }
        }

        let req = VerdictRequester::new(Arc::new(Slow), 8000, Duration::from_millis(20));
        let outcome = req.request("Q?", "u", "page").await;
        assert!(matches!(
            outcome,
            VerdictOutcome::Failed { reason: InferenceFailureKind::Error, .. }
        ));
    }

    #[test]
    fn test_is_correct() {
        assert!(is_correct(Verdict::Yes, true, Outcome::Yes));
        assert!(!is_correct(Verdict::No, true, Outcome::Yes));
        assert!(!is_correct(Verdict::Yes, false, Outcome::Yes));
        assert!(!is_correct(Verdict::Unresolvable, true, Outcome::No));
    }
}
