//! Deterministic extraction of pipeline assets, deals, trends and risks
//! from a normalized source document. Used when the model leaves these out.

use once_cell::sync::Lazy;
use regex::Regex;

use super::artifacts::{Deal, PipelineAsset};
use crate::constants::signals::{
    DEAL_TYPES, MAX_EXTRACTED_ITEMS, MAX_EXTRACT_SENTENCE_CHARS, PHASE_PATTERNS, RISK_PATTERNS,
    TREND_PATTERNS,
};
use crate::crawler::normalize::truncate_chars;

static RE_PHASES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    PHASE_PATTERNS
        .iter()
        .map(|(label, p)| (*label, Regex::new(&format!("(?i){}", p)).unwrap()))
        .collect()
});
static RE_TRENDS: Lazy<Vec<Regex>> = Lazy::new(|| case_insensitive(TREND_PATTERNS));
static RE_RISKS: Lazy<Vec<Regex>> = Lazy::new(|| case_insensitive(RISK_PATTERNS));

// AC-101, ABC123, Drug-12
static RE_DRUG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z]{2,}-?\d+[A-Za-z]?|[A-Z][a-z]+-\d+)\b").unwrap());
static RE_INDICATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:for|in)\s+(?:the\s+treatment\s+of\s+|patients\s+with\s+)?([^.,;:()]+)").unwrap()
});
static RE_PARTNER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:with|by|to)\s+([A-Z][\w&'-]*(?:\s+[A-Z][\w&'-]*){0,3})").unwrap()
});

/// Codes that look like assets but are not.
const NOT_ASSETS: &[&str] = &["COVID-19"];
const MAX_INDICATION_CHARS: usize = 80;

fn case_insensitive(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
        .collect()
}

/// Split on sentence punctuation followed by whitespace, and on newlines.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let boundary = c == '\n'
            || (matches!(c, '.' | '!' | '?')
                && chars.peek().map_or(true, |(_, next)| next.is_whitespace()));
        if boundary {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn drug_name(sentence: &str) -> Option<regex::Match<'_>> {
    RE_DRUG
        .find_iter(sentence)
        .find(|m| !NOT_ASSETS.contains(&m.as_str()))
}

fn indication_after(rest: &str) -> String {
    RE_INDICATION
        .captures(rest)
        .and_then(|c| c.get(1))
        .map(|m| truncate_chars(m.as_str().trim(), MAX_INDICATION_CHARS))
        .filter(|s| s.chars().count() >= 3)
        .unwrap_or_default()
}

/// Pipeline assets named next to a development phase, one entry per asset.
pub fn extract_pipeline(text: &str) -> Vec<PipelineAsset> {
    let sentences = sentences(text);
    let mut assets: Vec<PipelineAsset> = Vec::new();

    for (phase, re) in RE_PHASES.iter() {
        for sentence in sentences.iter().filter(|s| re.is_match(s)) {
            let Some(drug) = drug_name(sentence) else {
                continue;
            };
            if assets.iter().any(|a| a.asset == drug.as_str()) {
                continue;
            }
            assets.push(PipelineAsset {
                asset: drug.as_str().to_string(),
                indication: indication_after(&sentence[drug.end()..]),
                phase: phase.to_string(),
            });
        }
    }
    assets.truncate(MAX_EXTRACTED_ITEMS);
    assets
}

/// Deals whose sentence names a counterparty other than `company`.
pub fn extract_deals(text: &str, company: &str) -> Vec<Deal> {
    let company = company.trim().to_lowercase();
    let sentences = sentences(text);
    let mut deals: Vec<Deal> = Vec::new();

    for (deal_type, keywords) in DEAL_TYPES {
        for sentence in &sentences {
            let lower = sentence.to_lowercase();
            if !keywords.iter().any(|k| lower.contains(k)) {
                continue;
            }
            let Some(partner) = RE_PARTNER
                .captures_iter(sentence)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().trim())
                .find(|p| {
                    let p = p.to_lowercase();
                    company.is_empty() || !(company.contains(&p) || p.contains(&company))
                })
            else {
                continue;
            };
            if deals
                .iter()
                .any(|d| d.partner == partner && d.deal_type == *deal_type)
            {
                continue;
            }
            deals.push(Deal {
                partner: partner.to_string(),
                deal_type: deal_type.to_string(),
                summary: truncate_chars(sentence, MAX_EXTRACT_SENTENCE_CHARS),
            });
        }
    }
    deals.truncate(MAX_EXTRACTED_ITEMS);
    deals
}

fn matching_sentences(text: &str, patterns: &[Regex]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for sentence in sentences(text) {
        if found.len() == MAX_EXTRACTED_ITEMS {
            break;
        }
        if patterns.iter().any(|re| re.is_match(sentence)) {
            let sentence = truncate_chars(sentence, MAX_EXTRACT_SENTENCE_CHARS);
            if !found.contains(&sentence) {
                found.push(sentence);
            }
        }
    }
    found
}

pub fn identify_trends(text: &str) -> Vec<String> {
    matching_sentences(text, &RE_TRENDS)
}

pub fn identify_risks(text: &str) -> Vec<String> {
    matching_sentences(text, &RE_RISKS)
}
