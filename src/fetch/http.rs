//! Direct HTTP fetcher.
//!
//! Fetches with reqwest, treats non-2xx as an error, and reduces HTML to its
//! visible text so the validator and prompt see roughly what a rendering
//! service in text mode would return.

use super::{FetchErrorClassifier, FetchOutcome, Fetcher, KeywordErrorClassifier};
use crate::config::FetchConfig;
use crate::text::truncate_chars;
use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use tracing::debug;

lazy_static::lazy_static! {
    static ref HIDDEN_RE: Regex =
        Regex::new(r"(?is)<(script|style|noscript|template)\b[^>]*>.*?</(script|style|noscript|template)\s*>").unwrap();
    static ref COMMENT_RE: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
    static ref BLOCK_RE: Regex = Regex::new(r"(?i)<(br|/p|/div|/li|/h[1-6]|/tr|/title)\b[^>]*>").unwrap();
    static ref TAG_RE: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    static ref SPACE_RE: Regex = Regex::new(r"[ \t\x0B\x0C\r]+").unwrap();
}

pub struct HttpFetcher {
    http: reqwest::Client,
    max_content_chars: usize,
    classifier: Box<dyn FetchErrorClassifier>,
}

impl HttpFetcher {
    pub fn new(cfg: &FetchConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.timeout())
            .build()?;
        Ok(Self {
            http,
            max_content_chars: cfg.max_content_chars,
            classifier: Box::new(KeywordErrorClassifier),
        })
    }

    /// Swap in a different error classifier.
    pub fn with_classifier(mut self, classifier: Box<dyn FetchErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    async fn get_text(&self, url: &str) -> Result<(u16, String), reqwest::Error> {
        let resp = self.http.get(url).send().await?.error_for_status()?;
        let status = resp.status().as_u16();
        Ok((status, resp.text().await?))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, budget: Duration) -> FetchOutcome {
        let (status, body) = match tokio::time::timeout(budget, self.get_text(url)).await {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(e)) => {
                // The URL is dropped so digits in it can't pass for a status code.
                let e = e.without_url();
                let status = e.status().map(|s| s.as_u16());
                return FetchOutcome::from_error(self.classifier.as_ref(), &error_chain(&e), status);
            }
            Err(_) => return FetchOutcome::timed_out(budget),
        };

        let text = html_to_text(&body);
        let content = truncate_chars(&text, self.max_content_chars).to_string();
        debug!(url, status, raw_len = body.len(), text_len = content.len(), "fetched page");
        FetchOutcome::Accessible {
            content,
            status_code: Some(status),
        }
    }
}

/// Error message with its source chain, skipping parts already included.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        let part = s.to_string();
        if !msg.contains(&part) {
            msg.push_str(": ");
            msg.push_str(&part);
        }
        source = s.source();
    }
    msg
}

/// Visible text of an HTML document, one non-empty line per block.
///
/// Plain text passes through with whitespace normalized.
pub fn html_to_text(html: &str) -> String {
    let stripped = HIDDEN_RE.replace_all(html, " ");
    let stripped = COMMENT_RE.replace_all(&stripped, " ");
    let stripped = BLOCK_RE.replace_all(&stripped, "\n");
    let stripped = TAG_RE.replace_all(&stripped, " ");
    let decoded = decode_entities(&stripped);

    decoded
        .lines()
        .map(|line| SPACE_RE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
