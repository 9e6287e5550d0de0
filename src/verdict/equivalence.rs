//! Repeated-inference agreement check.
//!
//! Wraps an [`Inference`] and asks the same prompt several times. The first
//! reply is accepted only if every round's answer normalizes to the same
//! label; reasoning text is ignored. Any disagreement becomes an inference
//! error, so callers see the same contract as a single request.

use super::answer_label;
use crate::llm::{Inference, InferenceError, ResponseFormat};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

pub struct EquivalentInference<I> {
    inner: I,
    rounds: usize,
}

impl<I: Inference> EquivalentInference<I> {
    /// `rounds` below 1 is treated as 1.
    pub fn new(inner: I, rounds: usize) -> Self {
        Self {
            inner,
            rounds: rounds.max(1),
        }
    }
}

#[async_trait]
impl<I: Inference> Inference for EquivalentInference<I> {
    async fn infer(&self, prompt: &str, format: ResponseFormat) -> Result<Value, InferenceError> {
        let first = self.inner.infer(prompt, format).await?;
        let expected = answer_label(&first);

        for round in 2..=self.rounds {
            let next = self.inner.infer(prompt, format).await?;
            let got = answer_label(&next);
            if got != expected {
                warn!(round, ?expected, ?got, "inference rounds disagree");
                return Err(InferenceError::Disagreement(format!(
                    "round {round} answered {} but round 1 answered {}",
                    label(got),
                    label(expected)
                )));
            }
        }

        Ok(first)
    }
}

fn label(v: Option<super::Verdict>) -> &'static str {
    v.map(|v| v.as_str()).unwrap_or("nothing")
}
