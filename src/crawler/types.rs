use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::search::COMPANY_SUFFIXES;
use crate::error::PipelineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    CompanyName,
    PressReleaseUrl,
}

/// What the user asked to analyze. Immutable once submitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub kind: RequestKind,
    pub value: String,
}

impl AnalysisRequest {
    pub fn company(name: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::CompanyName,
            value: name.into(),
        }
    }

    pub fn press_release(url: impl Into<String>) -> Self {
        Self {
            kind: RequestKind::PressReleaseUrl,
            value: url.into(),
        }
    }

    /// Classify raw user input: an http(s) URL with a host, else a company name.
    pub fn parse(input: &str) -> Result<Self, PipelineError> {
        let trimmed = input.trim();
        if let Ok(parsed) = url::Url::parse(trimmed) {
            if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() {
                return Ok(Self::press_release(trimmed));
            }
        }
        if trimmed.chars().filter(|c| !c.is_whitespace()).count() < 2 {
            return Err(PipelineError::InvalidInput {
                reason: "company name must contain at least two characters".to_string(),
            });
        }
        Ok(Self::company(trimmed))
    }

    /// Company name without legal suffixes or punctuation. Empty for URL requests.
    pub fn normalized_company(&self) -> String {
        match self.kind {
            RequestKind::CompanyName => normalize_company_name(&self.value),
            RequestKind::PressReleaseUrl => String::new(),
        }
    }

    /// Lowercase terms used for keyword overlap.
    pub fn terms(&self) -> Vec<String> {
        let source = match self.kind {
            RequestKind::CompanyName => self.normalized_company(),
            RequestKind::PressReleaseUrl => url_slug_words(&self.value),
        };
        source
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| t.chars().count() >= 3)
            .collect()
    }
}

pub fn normalize_company_name(name: &str) -> String {
    let words: Vec<&str> = name
        .split_whitespace()
        .filter(|w| !COMPANY_SUFFIXES.contains(&w.to_lowercase().trim_end_matches(',')))
        .collect();
    let joined = words.join(" ");
    let cleaned: String = joined
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn url_slug_words(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(u) => u
            .path_segments()
            .map(|segs| {
                segs.flat_map(|s| s.split(|c: char| !c.is_alphanumeric()))
                    .filter(|w| !w.is_empty() && !w.chars().all(|c| c.is_ascii_digit()))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// One hit from the search capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// A possible source URL considered during one resolution attempt.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
    /// Domain tier, 0 = most trusted
    pub domain_rank: i32,
    /// Named explicitly by the caller; skips search-time scoring
    pub pinned: bool,
    /// Leading part of the fetched document, once fetched
    #[serde(skip)]
    pub excerpt: Option<String>,
}

impl Candidate {
    pub fn from_hit(hit: SearchHit, domain_rank: i32) -> Self {
        Self {
            url: hit.url,
            title: hit.title,
            snippet: hit.snippet,
            score: 0.0,
            domain_rank,
            pinned: false,
            excerpt: None,
        }
    }
}

/// The accepted document handed to the analysis stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSource {
    pub url: String,
    pub fetched_text: String,
    pub fetched_at: DateTime<Utc>,
    pub source_score: f64,
    pub title: String,
    pub fetch_attempts: u32,
}

/// Raw answer of the network capability.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub content_type: Option<String>,
}

impl HttpResponse {
    pub fn ok_html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_type: Some("text/html; charset=utf-8".to_string()),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            content_type: None,
        }
    }
}
