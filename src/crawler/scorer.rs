//! Candidate relevance/trust scoring.
//!
//! score = domain_weight * domain_trust
//!       + keyword_weight * keyword_overlap
//!       + recency_weight * recency
//!
//! Each signal is normalized to [0,1] and the weights sum to 1.0, so the score
//! is in [0,1] too. Recency is measured against a fixed reference date held by
//! the scorer, never the wall clock, which keeps scoring pure.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use super::traits::RelevanceScorer;
use super::types::{AnalysisRequest, Candidate};
use crate::config::ScoringConfig;
use crate::constants::scoring::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoringWeights {
    pub domain_weight: f64,
    pub keyword_weight: f64,
    pub recency_weight: f64,
}

impl ScoringWeights {
    pub fn is_normalized(&self) -> bool {
        let weights = [self.domain_weight, self.keyword_weight, self.recency_weight];
        let sum: f64 = weights.iter().sum();
        (sum - 1.0).abs() <= WEIGHT_SUM_EPSILON && weights.iter().all(|w| w.is_finite() && *w >= 0.0)
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            domain_weight: DEFAULT_DOMAIN_WEIGHT,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
            recency_weight: DEFAULT_RECENCY_WEIGHT,
        }
    }
}

/// Domain tiers, most trusted first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DomainTier {
    TrustedNews = 0,
    PressReleasePath = 1,
    CompanyDomain = 2,
    PipelinePath = 3,
    BiotechTld = 4,
    Other = 5,
}

impl DomainTier {
    pub fn rank(&self) -> i32 {
        *self as i32
    }

    pub fn trust(&self) -> f64 {
        match self {
            DomainTier::TrustedNews => 1.0,
            DomainTier::PressReleasePath => 0.8,
            DomainTier::CompanyDomain => 0.7,
            DomainTier::PipelinePath => 0.5,
            DomainTier::BiotechTld => 0.35,
            DomainTier::Other => 0.2,
        }
    }
}

/// Best tier a URL qualifies for.
pub fn domain_tier(raw_url: &str, company_terms: &[String], trusted_domains: &[String]) -> DomainTier {
    let Ok(parsed) = url::Url::parse(raw_url) else {
        return DomainTier::Other;
    };
    let host = parsed
        .host_str()
        .unwrap_or_default()
        .to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    let path = parsed.path().to_lowercase();

    let trusted = trusted_domains.iter().any(|d| {
        let d = d.to_lowercase();
        host == d || host.ends_with(&format!(".{}", d))
    });
    if trusted {
        return DomainTier::TrustedNews;
    }
    if PRESS_PATH_PATTERNS.iter().any(|p| path.contains(p)) {
        return DomainTier::PressReleasePath;
    }
    let compact_host = host.replace('-', "");
    if company_terms
        .iter()
        .any(|t| t.chars().count() >= 4 && compact_host.contains(t.as_str()))
    {
        return DomainTier::CompanyDomain;
    }
    if PIPELINE_PATH_PATTERNS.iter().any(|p| path.contains(p)) {
        return DomainTier::PipelinePath;
    }
    if BIOTECH_TLDS.iter().any(|tld| host.ends_with(tld)) {
        return DomainTier::BiotechTld;
    }
    DomainTier::Other
}

static RE_ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})-(\d{1,2})-(\d{1,2})\b").unwrap());
static RE_PATH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/((?:19|20)\d{2})/(\d{1,2})/(\d{1,2})(?:/|$)").unwrap());
static RE_MONTH_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2}),?\s+((?:19|20)\d{2})\b")
        .unwrap()
});
static RE_DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?,?\s+((?:19|20)\d{2})\b")
        .unwrap()
});

fn month_number(name: &str) -> Option<u32> {
    let idx = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ]
    .iter()
    .position(|m| name.to_lowercase().starts_with(m))?;
    Some(idx as u32 + 1)
}

/// First publication-looking date in `text`, if any.
pub fn extract_date(text: &str) -> Option<NaiveDate> {
    let ymd = |y: &str, m: &str, d: &str| -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?)
    };

    if let Some(c) = RE_ISO_DATE.captures(text) {
        if let Some(date) = ymd(&c[1], &c[2], &c[3]) {
            return Some(date);
        }
    }
    if let Some(c) = RE_PATH_DATE.captures(text) {
        if let Some(date) = ymd(&c[1], &c[2], &c[3]) {
            return Some(date);
        }
    }
    if let Some(c) = RE_MONTH_DAY_YEAR.captures(text) {
        let month = month_number(&c[1])?;
        return NaiveDate::from_ymd_opt(c[3].parse().ok()?, month, c[2].parse().ok()?);
    }
    if let Some(c) = RE_DAY_MONTH_YEAR.captures(text) {
        let month = month_number(&c[2])?;
        return NaiveDate::from_ymd_opt(c[3].parse().ok()?, month, c[1].parse().ok()?);
    }
    None
}

pub struct CandidateScorer {
    weights: ScoringWeights,
    trusted_domains: Vec<String>,
    reference_date: NaiveDate,
    recency_horizon_days: i64,
}

impl CandidateScorer {
    pub fn new(config: &ScoringConfig, reference_date: NaiveDate) -> Self {
        Self {
            weights: ScoringWeights {
                domain_weight: config.domain_weight,
                keyword_weight: config.keyword_weight,
                recency_weight: config.recency_weight,
            },
            trusted_domains: config.trusted_domains.clone(),
            reference_date,
            recency_horizon_days: config.recency_horizon_days.max(FRESH_WINDOW_DAYS + 1),
        }
    }

    /// Scorer anchored to today's date (UTC).
    pub fn for_today(config: &ScoringConfig) -> Self {
        Self::new(config, chrono::Utc::now().date_naive())
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    pub fn trusted_domains(&self) -> &[String] {
        &self.trusted_domains
    }

    pub fn domain_trust(&self, candidate: &Candidate, request: &AnalysisRequest) -> f64 {
        domain_tier(&candidate.url, &request.terms(), &self.trusted_domains).trust()
    }

    pub fn keyword_overlap(&self, candidate: &Candidate, request: &AnalysisRequest) -> f64 {
        let text = format!(
            "{} {} {}",
            candidate.title,
            candidate.snippet,
            candidate.excerpt.as_deref().unwrap_or_default()
        )
        .to_lowercase();

        let domain_hits = DOMAIN_KEYWORDS.iter().filter(|k| text.contains(*k)).count();
        let domain_part =
            domain_hits.min(DOMAIN_KEYWORD_SATURATION) as f64 / DOMAIN_KEYWORD_SATURATION as f64;

        let terms = request.terms();
        if terms.is_empty() {
            return domain_part;
        }
        let found = terms.iter().filter(|t| text.contains(t.as_str())).count();
        let company_part = found as f64 / terms.len() as f64;

        COMPANY_TERM_SHARE * company_part + (1.0 - COMPANY_TERM_SHARE) * domain_part
    }

    pub fn recency(&self, candidate: &Candidate) -> f64 {
        let date = extract_date(&candidate.title)
            .or_else(|| extract_date(&candidate.snippet))
            .or_else(|| extract_date(&candidate.url))
            .or_else(|| candidate.excerpt.as_deref().and_then(extract_date));

        match date {
            Some(d) => self.recency_for_date(d),
            None => NEUTRAL_RECENCY,
        }
    }

    fn recency_for_date(&self, date: NaiveDate) -> f64 {
        let age = (self.reference_date - date).num_days();
        if age <= FRESH_WINDOW_DAYS {
            return 1.0;
        }
        if age >= self.recency_horizon_days {
            return 0.0;
        }
        let span = (self.recency_horizon_days - FRESH_WINDOW_DAYS) as f64;
        1.0 - (age - FRESH_WINDOW_DAYS) as f64 / span
    }
}

impl RelevanceScorer for CandidateScorer {
    fn score(&self, candidate: &Candidate, request: &AnalysisRequest) -> f64 {
        let w = &self.weights;
        let raw = w.domain_weight * self.domain_trust(candidate, request)
            + w.keyword_weight * self.keyword_overlap(candidate, request)
            + w.recency_weight * self.recency(candidate);
        raw.clamp(0.0, 1.0)
    }
}
