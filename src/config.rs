use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::constants::{api, crawler, llm, scoring, search};
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const ENV_CONFIG_PATH: &str = "MARKET_PULSE_CONFIG";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub max_candidates: usize,
    /// Total attempts per fetch (first try included)
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub acceptance_threshold: f64,
    pub fetch_timeout_ms: u64,
    pub overall_crawl_timeout_ms: u64,
    pub max_document_chars: usize,
    /// Candidate fetches kept in flight at once
    pub fetch_concurrency: usize,
    pub respect_robots: bool,
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_candidates: crawler::DEFAULT_MAX_CANDIDATES,
            max_retries: crawler::DEFAULT_MAX_RETRIES,
            backoff_base_ms: crawler::DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: crawler::DEFAULT_BACKOFF_CAP_MS,
            acceptance_threshold: crawler::DEFAULT_ACCEPTANCE_THRESHOLD,
            fetch_timeout_ms: crawler::DEFAULT_FETCH_TIMEOUT_MS,
            overall_crawl_timeout_ms: crawler::DEFAULT_OVERALL_CRAWL_TIMEOUT_MS,
            max_document_chars: crawler::DEFAULT_MAX_DOCUMENT_CHARS,
            fetch_concurrency: 1,
            respect_robots: true,
            user_agent: crawler::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn overall_crawl_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_crawl_timeout_ms)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub domain_weight: f64,
    pub keyword_weight: f64,
    pub recency_weight: f64,
    pub trusted_domains: Vec<String>,
    pub recency_horizon_days: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            domain_weight: scoring::DEFAULT_DOMAIN_WEIGHT,
            keyword_weight: scoring::DEFAULT_KEYWORD_WEIGHT,
            recency_weight: scoring::DEFAULT_RECENCY_WEIGHT,
            trusted_domains: scoring::TRUSTED_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            recency_horizon_days: scoring::DEFAULT_RECENCY_HORIZON_DAYS,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// SearXNG-compatible JSON endpoint
    pub endpoint: String,
    pub max_queries: usize,
    pub results_per_query: usize,
    pub query_delay_ms: u64,
    pub query_templates: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: search::DEFAULT_ENDPOINT.to_string(),
            max_queries: search::DEFAULT_MAX_QUERIES,
            results_per_query: search::DEFAULT_RESULTS_PER_QUERY,
            query_delay_ms: search::DEFAULT_QUERY_DELAY_MS,
            query_templates: search::QUERY_TEMPLATES
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_concurrent: usize,
    pub queue_size: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: llm::DEFAULT_MODEL.to_string(),
            temperature: llm::DEFAULT_TEMPERATURE,
            max_tokens: llm::DEFAULT_MAX_TOKENS,
            max_concurrent: llm::DEFAULT_MAX_CONCURRENT,
            queue_size: llm::DEFAULT_QUEUE_SIZE,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub event_capacity: usize,
    /// Seconds a finished run stays inspectable
    pub finished_run_ttl_secs: u64,
    pub max_finished_runs: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            event_capacity: 1000,
            finished_run_ttl_secs: api::DEFAULT_FINISHED_RUN_TTL_SECS,
            max_finished_runs: api::DEFAULT_MAX_FINISHED_RUNS,
        }
    }
}

impl ServerConfig {
    pub fn finished_run_ttl(&self) -> Duration {
        Duration::from_secs(self.finished_run_ttl_secs)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub progress_log: String,
    pub report_dir: String,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            progress_log: "./data/progress.jsonl".to_string(),
            report_dir: "./reports".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crawler: CrawlerConfig,
    pub scoring: ScoringConfig,
    pub search: SearchConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub reporting: ReportingConfig,
}

impl AppConfig {
    /// Load from `$MARKET_PULSE_CONFIG`, else `config.yaml`, else defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = Path::new(&path);
        if !path.exists() {
            let mut config = AppConfig::default();
            config.apply_env();
            config.validate()?;
            return Ok(config);
        }
        Self::load_from(path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // Strip BOM if present
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        if content.trim().is_empty() {
            return Ok(AppConfig::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_env(&mut self) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scoring;
        let weights = [s.domain_weight, s.keyword_weight, s.recency_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Invalid(
                "scoring weights must be finite and non-negative".to_string(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if !((sum - 1.0).abs() <= scoring::WEIGHT_SUM_EPSILON) {
            return Err(ConfigError::Invalid(format!(
                "scoring weights must sum to 1.0 (got {:.6})",
                sum
            )));
        }
        if s.recency_horizon_days <= 0 {
            return Err(ConfigError::Invalid(
                "recency_horizon_days must be positive".to_string(),
            ));
        }

        let c = &self.crawler;
        if !(0.0..=1.0).contains(&c.acceptance_threshold) {
            return Err(ConfigError::Invalid(format!(
                "acceptance_threshold must be within [0, 1] (got {})",
                c.acceptance_threshold
            )));
        }
        if c.max_candidates == 0 {
            return Err(ConfigError::Invalid("max_candidates must be at least 1".to_string()));
        }
        if c.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".to_string()));
        }
        if c.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid("fetch_concurrency must be at least 1".to_string()));
        }
        if c.backoff_cap_ms < c.backoff_base_ms {
            return Err(ConfigError::Invalid(
                "backoff_cap_ms must be >= backoff_base_ms".to_string(),
            ));
        }
        if c.max_document_chars == 0 {
            return Err(ConfigError::Invalid("max_document_chars must be at least 1".to_string()));
        }

        if self.search.max_queries == 0 || self.search.query_templates.is_empty() {
            return Err(ConfigError::Invalid(
                "search needs at least one query template and max_queries >= 1".to_string(),
            ));
        }
        if self
            .search
            .query_templates
            .iter()
            .any(|t| !t.contains("{company}"))
        {
            return Err(ConfigError::Invalid(
                "every query template must contain {company}".to_string(),
            ));
        }
        Ok(())
    }
}
