//! Custom error types for the analysis pipeline
//!
//! Provides structured, typed errors instead of generic Box<dyn Error>

use thiserror::Error;

/// Whether retrying the same request could ever succeed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    Permanent,
}

/// Top-level pipeline errors. Every stage failure ends up as one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No candidates found after {queries_attempted} search queries")]
    NoCandidatesFound { queries_attempted: usize },

    #[error("Crawl failed after trying {tried_candidates} candidates: {}", last_errors.join("; "))]
    CrawlFailed {
        tried_candidates: usize,
        last_errors: Vec<String>,
    },

    #[error("{agent} generation failed: {reason}")]
    GenerationFailed { agent: String, reason: String },

    #[error("Run cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn generation(agent: &str, reason: impl Into<String>) -> Self {
        PipelineError::GenerationFailed {
            agent: agent.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures of a single fetch call (after the retry budget is applied).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Transient failure fetching {url} after {attempts} attempts: {reason}")]
    Transient {
        url: String,
        reason: String,
        attempts: u32,
    },

    #[error("Permanent failure fetching {url} (attempt {attempts}): {reason}")]
    Permanent {
        url: String,
        reason: String,
        attempts: u32,
    },

    #[error("Fetch of {url} cancelled")]
    Cancelled { url: String },
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Transient { .. } => FailureKind::Transient,
            FetchError::Permanent { .. } | FetchError::Cancelled { .. } => FailureKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }

    pub fn attempts(&self) -> u32 {
        match self {
            FetchError::Transient { attempts, .. } | FetchError::Permanent { attempts, .. } => {
                *attempts
            }
            FetchError::Cancelled { .. } => 0,
        }
    }
}

/// Raw network-level failures reported by an `HttpFetch` implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connection reset: {0}")]
    Reset(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    Other(String),
}

impl NetworkError {
    pub fn kind(&self) -> FailureKind {
        match self {
            NetworkError::InvalidRequest(_) => FailureKind::Permanent,
            _ => FailureKind::Transient,
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout
        } else if err.is_connect() {
            NetworkError::Connect(err.to_string())
        } else if err.is_builder() || err.is_redirect() {
            NetworkError::InvalidRequest(err.to_string())
        } else if err.is_body() || err.is_request() {
            NetworkError::Reset(err.to_string())
        } else {
            NetworkError::Other(err.to_string())
        }
    }
}

/// Search capability errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("Search HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Search network error: {0}")]
    Network(String),

    #[error("Search response could not be parsed: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        SearchError::Network(err.to_string())
    }
}

/// Text-generation capability errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned an empty completion")]
    EmptyResponse,

    #[error("LLM queue unavailable: {0}")]
    Queue(String),
}

impl From<async_openai::error::OpenAIError> for LlmError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        LlmError::Request(err.to_string())
    }
}

/// Configuration loading/validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Report and progress-log persistence errors
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Report I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
