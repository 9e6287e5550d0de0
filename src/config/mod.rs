use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Case source document (`{runId, markets: [...]}`).
    #[serde(default = "default_cases_path")]
    pub cases: PathBuf,
    /// Result store, rewritten after every case.
    #[serde(default = "default_results_path")]
    pub results: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout handed to the HTTP client.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// Wall-clock budget the pipeline enforces around the whole fetch.
    #[serde(default = "default_fetch_budget")]
    pub budget_secs: u64,
    /// Page text beyond this many characters is discarded.
    #[serde(default = "default_max_content")]
    pub max_content_chars: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    /// Trimmed pages shorter than this are rejected as insufficient.
    #[serde(default = "default_min_content")]
    pub min_content_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base, e.g. `https://api.openai.com/v1`.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Loaded from env LLM_API_KEY or OPENAI_API_KEY.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Page text beyond this many characters never reaches the prompt.
    #[serde(default = "default_prompt_window")]
    pub prompt_window_chars: usize,
    /// How many agreeing answers the equivalence check requires (1 = off).
    #[serde(default = "default_equivalence_rounds")]
    pub equivalence_rounds: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Cases resolved at once. Results are still recorded in input order.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Delay between cases in sequential mode.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// Only run the first N cases.
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_cases_path() -> PathBuf {
    PathBuf::from("data/markets.json")
}
fn default_results_path() -> PathBuf {
    PathBuf::from("results/benchmark_results.json")
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_fetch_budget() -> u64 {
    35
}
fn default_max_content() -> usize {
    50_000
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".to_string()
}
fn default_min_content() -> usize {
    100
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_prompt_window() -> usize {
    8_000
}
fn default_equivalence_rounds() -> usize {
    1
}
fn default_concurrency() -> usize {
    1
}
fn default_pacing_ms() -> u64 {
    1000
}
fn default_bind() -> String {
    "0.0.0.0:5050".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cases: default_cases_path(),
            results: default_results_path(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            budget_secs: default_fetch_budget(),
            max_content_chars: default_max_content(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_content_chars: default_min_content(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: String::new(),
            timeout_secs: default_llm_timeout(),
            prompt_window_chars: default_prompt_window(),
            equivalence_rounds: default_equivalence_rounds(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            pacing_ms: default_pacing_ms(),
            limit: None,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.budget_secs)
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env();
        Ok(config)
    }

    /// Parse TOML without touching the environment.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Defaults plus env overrides (no file needed).
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            config.llm.model = model;
        }
        config.apply_env();
        config
    }

    // Secrets never live in the config file.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("LLM_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY")) {
            self.llm.api_key = key;
        }
    }

    pub fn has_llm_credentials(&self) -> bool {
        !self.llm.api_key.is_empty()
    }
}
