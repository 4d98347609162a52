//! HTML → main document text.
//!
//! Strips non-content elements, prefers `<article>`/`<main>` when present,
//! decodes entities, removes press-release artifacts and navigation noise,
//! and truncates to a character budget.

use once_cell::sync::Lazy;
use regex::Regex;

const NON_CONTENT_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "aside", "form", "svg", "iframe",
    "template",
];

/// Minimum text a main-content container must carry before we trust it.
const MIN_MAIN_CONTENT_CHARS: usize = 200;

/// Lines that are navigation/cookie chrome, matched only on short lines.
const NOISE_PHRASES: &[&str] = &[
    "skip to main content",
    "skip to content",
    "cookie",
    "privacy policy",
    "terms of use",
    "all rights reserved",
    "sign in",
    "subscribe",
    "toggle navigation",
    "share this article",
];
const NOISE_LINE_MAX_CHARS: usize = 120;

/// Press-release artifact lines (matched as prefixes, case-insensitive).
const ARTIFACT_PREFIXES: &[&str] = &[
    "for immediate release",
    "for release upon receipt",
    "media contact",
    "investor contact",
    "contact:",
    "source:",
    "©",
    "copyright ©",
];

/// Headings after which the remainder of a release is legal boilerplate.
const TRAILING_BOILERPLATE: &[&str] = &[
    "forward-looking statements",
    "forward looking statements",
    "safe harbor",
    "cautionary note regarding forward-looking statements",
    "legal notice",
];

static RE_COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static RE_NON_CONTENT: Lazy<Vec<Regex>> = Lazy::new(|| {
    NON_CONTENT_TAGS
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).unwrap())
        .collect()
});
static RE_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<article\b[^>]*>(.*)</article\s*>").unwrap());
static RE_MAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<main\b[^>]*>(.*)</main\s*>").unwrap());
static RE_BLOCK_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(p|div|br|li|ul|ol|h[1-6]|tr|td|table|section|article|main|blockquote)\b[^>]*>")
        .unwrap()
});
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());
static RE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").unwrap());

/// Whether a response content type can carry a readable document.
pub fn is_textual_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/") || ct.contains("html") || ct.contains("xml")
        }
    }
}

/// Extract the main readable text of an HTML (or plain text) document.
pub fn extract_main_text(raw: &str, max_chars: usize) -> String {
    let mut html = RE_COMMENTS.replace_all(raw, " ").into_owned();
    for re in RE_NON_CONTENT.iter() {
        html = re.replace_all(&html, " ").into_owned();
    }

    let main = [&*RE_ARTICLE, &*RE_MAIN].iter().find_map(|re| {
        re.captures(&html)
            .map(|c| c[1].to_string())
            .filter(|inner| html_to_lines(inner).iter().map(|l| l.len()).sum::<usize>() >= MIN_MAIN_CONTENT_CHARS)
    });
    let body = main.unwrap_or(html);

    let lines = strip_boilerplate(html_to_lines(&body));
    truncate_chars(&lines.join("\n"), max_chars)
}

/// Document `<title>`, entity-decoded and whitespace-collapsed.
pub fn extract_title(raw: &str) -> Option<String> {
    let captured = RE_TITLE.captures(raw)?;
    let decoded = html_escape::decode_html_entities(&captured[1]).to_string();
    let title = RE_WS.replace_all(decoded.trim(), " ").replace('\n', " ");
    (!title.is_empty()).then_some(title)
}

fn html_to_lines(html: &str) -> Vec<String> {
    let text = RE_BLOCK_TAGS.replace_all(html, "\n");
    let text = RE_TAGS.replace_all(&text, " ");
    let decoded = html_escape::decode_html_entities(&text).to_string();

    decoded
        .lines()
        .map(|l| RE_WS.replace_all(l, " ").trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

fn strip_boilerplate(lines: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let lower = line.to_lowercase();
        if TRAILING_BOILERPLATE.iter().any(|h| lower.starts_with(h)) {
            break;
        }
        if ARTIFACT_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            continue;
        }
        if line.chars().count() <= NOISE_LINE_MAX_CHARS
            && NOISE_PHRASES.iter().any(|p| lower.contains(p))
        {
            continue;
        }
        out.push(line);
    }
    out
}

/// Cut `text` to at most `max_chars` characters, never splitting a char.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].trim_end().to_string(),
        None => text.to_string(),
    }
}
