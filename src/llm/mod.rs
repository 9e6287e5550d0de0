//! Inference collaborator.
//!
//! The pipeline only needs `infer(prompt, format) -> JSON`; [`LlmClient`]
//! provides that over any OpenAI-compatible chat completions endpoint.

use crate::config::LlmConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("LLM request failed: {0}")]
    Request(String),
    #[error("LLM API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("LLM returned unparseable output: {0}")]
    Malformed(String),
    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),
    #[error("equivalence check failed: {0}")]
    Disagreement(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Text,
}

#[async_trait]
pub trait Inference: Send + Sync {
    /// Run one prompt. With [`ResponseFormat::Json`] the reply is the parsed
    /// JSON value; with `Text` it is a JSON string.
    async fn infer(&self, prompt: &str, format: ResponseFormat) -> Result<Value, InferenceError>;
}

#[async_trait]
impl<T: Inference + ?Sized> Inference for std::sync::Arc<T> {
    async fn infer(&self, prompt: &str, format: ResponseFormat) -> Result<Value, InferenceError> {
        (**self).infer(prompt, format).await
    }
}

#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    cfg: LlmConfig,
}

impl LlmClient {
    pub fn new(cfg: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            cfg,
        }
    }

    pub fn model(&self) -> &str {
        &self.cfg.model
    }
}

#[async_trait]
impl Inference for LlmClient {
    async fn infer(&self, prompt: &str, format: ResponseFormat) -> Result<Value, InferenceError> {
        let mut req_body = json!({
            "model": self.cfg.model,
            "messages": [
                {"role": "system", "content": "You resolve prediction markets from web evidence."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.0
        });
        if format == ResponseFormat::Json {
            req_body["response_format"] = json!({"type": "json_object"});
        }

        let url = format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'));
        debug!(url = %url, model = %self.cfg.model, prompt_len = prompt.len(), "calling LLM");

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.cfg.api_key)
            .timeout(self.cfg.timeout())
            .json(&req_body)
            .send()
            .await
            .map_err(|e| InferenceError::Request(e.without_url().to_string()))?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(InferenceError::Api { status, body });
        }

        let resp_json: Value = res
            .json()
            .await
            .map_err(|e| InferenceError::Malformed(format!("response body: {e}")))?;

        let content = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| InferenceError::Malformed("No content in LLM response".to_string()))?;

        match format {
            ResponseFormat::Text => Ok(Value::String(content.to_string())),
            ResponseFormat::Json => parse_json_reply(content),
        }
    }
}

/// Parse a JSON reply, tolerating markdown code fences around it.
pub fn parse_json_reply(content: &str) -> Result<Value, InferenceError> {
    let clean = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(clean).map_err(|e| InferenceError::Malformed(format!("{e}: {clean}")))
}
