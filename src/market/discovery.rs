//! Closed-market discovery from the Polymarket CLOB REST API.
//!
//! Pulls settled markets, keeps the ones with a clear binary winner and a
//! description long enough to carry resolution rules, and turns them into
//! benchmark cases. The resolution URL is the first link in the description.

use super::{CaseSource, MarketCase, Outcome};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Cursor the CLOB API returns once the last page has been served.
const END_CURSOR: &str = "LTE=";

lazy_static::lazy_static! {
    static ref URL_RE: Regex = Regex::new(r#"https?://[^\s)"<>]+"#).unwrap();
    static ref SPORTS_SLUG_RE: Regex = Regex::new(r"^(nba-|nfl-|nhl-|mlb-|ncaab-|ufc-)").unwrap();
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClobToken {
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub winner: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClobMarket {
    #[serde(default)]
    pub condition_id: String,
    #[serde(default)]
    pub market_slug: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub end_date_iso: Option<String>,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub tokens: Vec<ClobToken>,
}

#[derive(Debug, Deserialize)]
struct ClobPage {
    #[serde(default)]
    data: Vec<ClobMarket>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// How a market's description says it will be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Url,
    Consensus,
    Official,
    None,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Url => "url",
            SourceType::Consensus => "consensus",
            SourceType::Official => "official",
            SourceType::None => "none",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A settled market with its winner, before it is narrowed to a case.
#[derive(Debug, Clone, Serialize)]
pub struct SettledMarket {
    pub id: String,
    pub question: String,
    pub winner: String,
    pub end_date: Option<DateTime<Utc>>,
    pub resolution_url: Option<String>,
    pub source_type: SourceType,
    pub category: String,
}

impl SettledMarket {
    /// Returns None unless the market is closed, has a winning token and a
    /// description longer than 20 characters.
    pub fn from_clob(m: &ClobMarket) -> Option<Self> {
        if !m.closed || m.description.chars().count() <= 20 {
            return None;
        }
        let winner = m.tokens.iter().find(|t| t.winner)?.outcome.clone();
        let id = if m.market_slug.is_empty() {
            m.condition_id.clone()
        } else {
            m.market_slug.clone()
        };

        Some(Self {
            id,
            question: m.question.clone(),
            winner,
            end_date: m
                .end_date_iso
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            resolution_url: extract_resolution_url(&m.description),
            source_type: classify_source_type(&m.description),
            category: categorize(&m.market_slug, &m.question).to_string(),
        })
    }

    /// A benchmark case, if the market has a URL and a YES/NO winner.
    pub fn to_case(&self) -> Option<MarketCase> {
        Some(MarketCase {
            id: self.id.clone(),
            question: self.question.clone(),
            resolution_url: self.resolution_url.clone()?,
            ground_truth: Outcome::from_label(&self.winner)?,
        })
    }
}

/// First http(s) link in a description, trailing punctuation removed.
pub fn extract_resolution_url(description: &str) -> Option<String> {
    let found = URL_RE.find(description)?.as_str();
    let trimmed = found.trim_end_matches([',', '.', ')']);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn classify_source_type(description: &str) -> SourceType {
    let d = description.to_lowercase();
    if d.contains("https://") || d.contains("http://") {
        SourceType::Url
    } else if d.contains("consensus of") || d.contains("credible reporting") {
        SourceType::Consensus
    } else if d.contains("official") || d.contains("government") {
        SourceType::Official
    } else {
        SourceType::None
    }
}

pub fn categorize(slug: &str, question: &str) -> &'static str {
    let q = question.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| q.contains(w));

    if SPORTS_SLUG_RE.is_match(&slug.to_lowercase()) {
        "sports"
    } else if has(&["president", "election", "governor", "senate", "congress"]) {
        "politics"
    } else if has(&["oscar", "grammy", "emmy", "award"]) {
        "entertainment"
    } else if has(&["fed", "interest rate", "inflation", "gdp"]) {
        "economics"
    } else if has(&["bitcoin", "ethereum", "crypto", "token", "airdrop"]) {
        "crypto"
    } else if has(&["ceo", "company", "stock", "ipo"]) {
        "business"
    } else {
        "other"
    }
}

/// Counts printed after a discovery pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryStats {
    pub scanned: usize,
    pub settled: usize,
    pub cases: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_source_type: BTreeMap<SourceType, usize>,
}

/// Most recently ended markets first; markets without an end date last.
pub fn build_cases(raw: &[ClobMarket], max_cases: usize) -> (Vec<MarketCase>, DiscoveryStats) {
    let mut settled: Vec<SettledMarket> = raw.iter().filter_map(SettledMarket::from_clob).collect();
    settled.sort_by(|a, b| b.end_date.cmp(&a.end_date));

    let mut stats = DiscoveryStats {
        scanned: raw.len(),
        settled: settled.len(),
        ..Default::default()
    };

    let mut cases = Vec::new();
    for m in &settled {
        if cases.len() >= max_cases {
            break;
        }
        *stats.by_category.entry(m.category.clone()).or_default() += 1;
        *stats.by_source_type.entry(m.source_type).or_default() += 1;
        if let Some(case) = m.to_case() {
            cases.push(case);
        }
    }
    stats.cases = cases.len();

    (cases, stats)
}

/// Pages through `/markets?closed=true` on the CLOB API.
pub struct ClosedMarketScanner {
    clob_url: String,
    http: reqwest::Client,
}

impl ClosedMarketScanner {
    pub fn new(clob_url: String) -> Self {
        Self {
            clob_url,
            http: reqwest::Client::new(),
        }
    }

    pub async fn fetch_closed(&self, max_pages: usize) -> Result<Vec<ClobMarket>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;

        for page_no in 0..max_pages {
            let mut req = self
                .http
                .get(format!("{}/markets", self.clob_url))
                .query(&[("closed", "true")]);
            if let Some(ref c) = cursor {
                req = req.query(&[("next_cursor", c.as_str())]);
            }

            let resp = req.send().await.context("CLOB markets request failed")?;
            if !resp.status().is_success() {
                bail!("CLOB API returned status {} on page {}", resp.status(), page_no);
            }
            let page: ClobPage = resp.json().await.context("Failed to parse CLOB markets page")?;

            debug!(page = page_no, markets = page.data.len(), "fetched closed markets page");
            let empty = page.data.is_empty();
            all.extend(page.data);

            match page.next_cursor {
                Some(c) if !empty && !c.is_empty() && c != END_CURSOR => cursor = Some(c),
                _ => break,
            }
        }

        info!(total = all.len(), "fetched closed markets from CLOB API");
        Ok(all)
    }

    /// Scan and assemble a case source ready for a benchmark run.
    pub async fn discover(
        &self,
        run_id: String,
        max_pages: usize,
        max_cases: usize,
    ) -> Result<(CaseSource, DiscoveryStats)> {
        let raw = self.fetch_closed(max_pages).await?;
        let (markets, stats) = build_cases(&raw, max_cases);
        Ok((CaseSource { run_id, markets }, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn clob(slug: &str, question: &str, desc: &str, end: &str, winner: Option<&str>) -> ClobMarket {
        ClobMarket {
            condition_id: format!("0x{slug}"),
            market_slug: slug.to_string(),
            question: question.to_string(),
            description: desc.to_string(),
            end_date_iso: Some(end.to_string()),
            closed: true,
            tokens: vec![
                ClobToken {
                    outcome: "Yes".into(),
                    winner: winner == Some("Yes"),
                },
                ClobToken {
                    outcome: "No".into(),
                    winner: winner == Some("No"),
                },
            ],
        }
    }

    #[test]
    fn test_extract_url_trims_punctuation() {
        let d = "Resolves per the official results (https://www.fec.gov/results/2024).";
        assert_eq!(
            extract_resolution_url(d).as_deref(),
            Some("https://www.fec.gov/results/2024")
        );
        assert_eq!(extract_resolution_url("no link here"), None);
    }

    #[test]
    fn test_categorize() {
        assert_eq!(categorize("nba-lal-bos", "Lakers vs Celtics"), "sports");
        assert_eq!(categorize("x", "Will the Senate pass the bill?"), "politics");
        assert_eq!(categorize("x", "Will Bitcoin hit 100k?"), "crypto");
        assert_eq!(categorize("x", "Will it rain?"), "other");
    }

    #[test]
    fn test_source_type() {
        assert_eq!(classify_source_type("see https://a.b"), SourceType::Url);
        assert_eq!(classify_source_type("a consensus of credible reporting"), SourceType::Consensus);
        assert_eq!(classify_source_type("the official announcement"), SourceType::Official);
        assert_eq!(classify_source_type("whatever"), SourceType::None);
    }

    #[test]
    fn test_build_cases_filters_and_sorts() {
        let long = "This market resolves according to https://example.com/result, nothing else.";
        let raw = vec![
            clob("old", "Old?", long, "2024-01-01T00:00:00Z", Some("No")),
            clob("new", "New?", long, "2024-06-01T00:00:00Z", Some("Yes")),
            clob("nowinner", "Open?", long, "2024-07-01T00:00:00Z", None),
            clob("short", "Short?", "tiny", "2024-08-01T00:00:00Z", Some("Yes")),
            clob(
                "nourl",
                "No url?",
                "Resolves by a consensus of credible reporting.",
                "2024-05-01T00:00:00Z",
                Some("Yes"),
            ),
        ];

        let (cases, stats) = build_cases(&raw, 10);
        assert_eq!(stats.scanned, 5);
        assert_eq!(stats.settled, 3);
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].id, "new");
        assert_eq!(cases[0].ground_truth, Outcome::Yes);
        assert_eq!(cases[0].resolution_url, "https://example.com/result");
        assert_eq!(cases[1].id, "old");
        assert_eq!(stats.by_source_type.get(&SourceType::Consensus), Some(&1));
    }

    #[test]
    fn test_non_binary_winner_is_skipped() {
        let mut m = clob("team", "Who wins?", "Resolves via https://a.example/x today", "2024-01-01T00:00:00Z", None);
        m.tokens = vec![ClobToken {
            outcome: "Lakers".into(),
            winner: true,
        }];
        let settled = SettledMarket::from_clob(&m).unwrap();
        assert!(settled.to_case().is_none());
    }

    #[tokio::test]
    async fn test_scanner_follows_cursor() {
        let server = MockServer::start().await;
        let market = serde_json::json!({
            "condition_id": "0x1",
            "market_slug": "m1",
            "question": "Q?",
            "description": "Resolves according to https://example.com/page for sure.",
            "end_date_iso": "2024-01-01T00:00:00Z",
            "closed": true,
            "tokens": [{"outcome": "Yes", "winner": true}, {"outcome": "No", "winner": false}]
        });

        Mock::given(method("GET"))
            .and(path("/markets"))
            .and(query_param("next_cursor", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [market.clone()],
                "next_cursor": "LTE="
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [market],
                "next_cursor": "abc"
            })))
            .mount(&server)
            .await;

        let scanner = ClosedMarketScanner::new(server.uri());
        let raw = scanner.fetch_closed(5).await.unwrap();
        assert_eq!(raw.len(), 2);
    }
}
