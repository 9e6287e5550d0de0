//! Page retrieval for the resolution pipeline.
//!
//! A [`Fetcher`] turns a normalized URL into either page text or a
//! [`FetchFailureKind`]. Failures are classified from the error text by a
//! [`FetchErrorClassifier`]; the keyword rules below are the reference
//! classifier and their order is part of the contract.

pub mod http;

use crate::text::snippet;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use http::HttpFetcher;

/// Characters of the underlying error kept in `detail`.
pub const DETAIL_SNIPPET_CHARS: usize = 200;

/// Status codes looked for in error text, in capture priority order.
const KNOWN_STATUS_CODES: [u16; 7] = [403, 404, 500, 502, 503, 429, 401];

lazy_static::lazy_static! {
    static ref STATUS_RE: Regex = Regex::new(r"\b([1-5][0-9]{2})\b").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchFailureKind {
    Forbidden,
    NotFound,
    RateLimited,
    Timeout,
    SslError,
    DnsError,
    ConnectionError,
    ServerError,
    UnknownError,
}

impl FetchFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchFailureKind::Forbidden => "web_forbidden",
            FetchFailureKind::NotFound => "web_not_found",
            FetchFailureKind::RateLimited => "web_rate_limited",
            FetchFailureKind::Timeout => "web_timeout",
            FetchFailureKind::SslError => "web_ssl_error",
            FetchFailureKind::DnsError => "web_dns_error",
            FetchFailureKind::ConnectionError => "web_connection_error",
            FetchFailureKind::ServerError => "web_server_error",
            FetchFailureKind::UnknownError => "web_unknown_error",
        }
    }

    pub const ALL: [FetchFailureKind; 9] = [
        FetchFailureKind::Forbidden,
        FetchFailureKind::NotFound,
        FetchFailureKind::RateLimited,
        FetchFailureKind::Timeout,
        FetchFailureKind::SslError,
        FetchFailureKind::DnsError,
        FetchFailureKind::ConnectionError,
        FetchFailureKind::ServerError,
        FetchFailureKind::UnknownError,
    ];

    fn summary(&self, status: Option<u16>) -> String {
        match self {
            FetchFailureKind::Forbidden => "403 Forbidden - access denied".to_string(),
            FetchFailureKind::NotFound => "404 Not Found - page does not exist".to_string(),
            FetchFailureKind::RateLimited => "429 Too Many Requests - rate limited".to_string(),
            FetchFailureKind::Timeout => "Request timed out".to_string(),
            FetchFailureKind::SslError => "SSL/certificate error".to_string(),
            FetchFailureKind::DnsError => "DNS resolution failed - domain may not exist".to_string(),
            FetchFailureKind::ConnectionError => "Connection refused or failed".to_string(),
            FetchFailureKind::ServerError => match status {
                Some(code) => format!("Server error ({code})"),
                None => "Server error".to_string(),
            },
            FetchFailureKind::UnknownError => "Fetch failed".to_string(),
        }
    }
}

impl std::fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Accessible {
        content: String,
        /// HTTP status of the response, when the fetcher saw one.
        status_code: Option<u16>,
    },
    Failed {
        reason: FetchFailureKind,
        status_code: Option<u16>,
        detail: String,
    },
}

impl FetchOutcome {
    /// Classify a raw error message into a failed outcome.
    ///
    /// `known_status` wins over a status scraped from the text.
    pub fn from_error(
        classifier: &dyn FetchErrorClassifier,
        error_text: &str,
        known_status: Option<u16>,
    ) -> Self {
        let reason = classifier.classify(error_text);
        let status_code = known_status.or_else(|| extract_status_code(error_text));
        FetchOutcome::Failed {
            reason,
            status_code,
            detail: format!(
                "{}: {}",
                reason.summary(status_code),
                snippet(error_text, DETAIL_SNIPPET_CHARS)
            ),
        }
    }

    /// The caller's wall-clock budget ran out before the fetch returned.
    pub fn timed_out(budget: Duration) -> Self {
        FetchOutcome::Failed {
            reason: FetchFailureKind::Timeout,
            status_code: None,
            detail: format!("Request timed out after {}s", budget.as_secs_f64()),
        }
    }
}

/// Retrieves page text. Implementations classify their own failures and must
/// not retry.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, budget: Duration) -> FetchOutcome;
}

/// Maps fetch error text to a failure kind.
pub trait FetchErrorClassifier: Send + Sync {
    fn classify(&self, error_text: &str) -> FetchFailureKind;
}

/// Substring rules over the lower-cased error text. First match wins.
const FETCH_RULES: &[(FetchFailureKind, &[&str])] = &[
    (FetchFailureKind::Forbidden, &["403", "forbidden"]),
    (FetchFailureKind::NotFound, &["404", "not found"]),
    (FetchFailureKind::RateLimited, &["429", "rate limit"]),
    (FetchFailureKind::Timeout, &["timeout", "timed out"]),
    (FetchFailureKind::SslError, &["ssl", "certificate"]),
    (FetchFailureKind::DnsError, &["dns", "resolve", "getaddrinfo"]),
    (FetchFailureKind::ConnectionError, &["connection", "refused"]),
    (FetchFailureKind::ServerError, &["500", "502", "503"]),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordErrorClassifier;

impl FetchErrorClassifier for KeywordErrorClassifier {
    fn classify(&self, error_text: &str) -> FetchFailureKind {
        let lower = error_text.to_lowercase();
        FETCH_RULES
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
            .map(|(kind, _)| *kind)
            .unwrap_or(FetchFailureKind::UnknownError)
    }
}

/// HTTP status mentioned in an error message, if any.
///
/// Well-known codes are matched as plain substrings first; otherwise the first
/// standalone three-digit number in 100..=599 is taken.
pub fn extract_status_code(error_text: &str) -> Option<u16> {
    KNOWN_STATUS_CODES
        .iter()
        .find(|code| error_text.contains(&code.to_string()))
        .copied()
        .or_else(|| {
            STATUS_RE
                .captures(error_text)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok())
        })
}
