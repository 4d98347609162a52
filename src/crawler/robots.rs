//! robots.txt policy, cached per origin.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::HttpFetch;

/// `MarketPulse/1.0 (+https://...)` -> `marketpulse`
fn product_token(agent: &str) -> String {
    agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RobotsRules {
    allow: Vec<String>,
    disallow: Vec<String>,
}

impl RobotsRules {
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse robots.txt, keeping the group for `agent_token` or else `*`.
    pub fn parse(content: &str, agent_token: &str) -> Self {
        let token = agent_token.to_lowercase();
        let mut specific: Option<RobotsRules> = None;
        let mut wildcard: Option<RobotsRules> = None;

        let mut group_agents: Vec<String> = Vec::new();
        let mut group_rules = RobotsRules::default();
        let mut in_rules = false;

        let mut flush = |agents: &[String], rules: &RobotsRules| {
            for agent in agents {
                if agent == "*" {
                    wildcard.get_or_insert_with(RobotsRules::default).merge(rules);
                } else if !token.is_empty() && product_token(agent) == token {
                    specific.get_or_insert_with(RobotsRules::default).merge(rules);
                }
            }
        };

        for raw in content.lines() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if in_rules {
                        flush(&group_agents, &group_rules);
                        group_agents.clear();
                        group_rules = RobotsRules::default();
                        in_rules = false;
                    }
                    group_agents.push(value.to_lowercase());
                }
                "allow" => {
                    in_rules = true;
                    if !value.is_empty() {
                        group_rules.allow.push(value.to_string());
                    }
                }
                "disallow" => {
                    in_rules = true;
                    if !value.is_empty() {
                        group_rules.disallow.push(value.to_string());
                    }
                }
                _ => {}
            }
        }
        flush(&group_agents, &group_rules);

        specific.or(wildcard).unwrap_or_default()
    }

    fn merge(&mut self, other: &RobotsRules) {
        self.allow.extend(other.allow.iter().cloned());
        self.disallow.extend(other.disallow.iter().cloned());
    }

    /// Longest matching rule wins; `Allow` wins ties.
    pub fn is_allowed(&self, path: &str) -> bool {
        let best = |rules: &[String]| {
            rules
                .iter()
                .filter(|r| pattern_matches(r, path))
                .map(|r| r.len())
                .max()
        };
        match (best(&self.allow), best(&self.disallow)) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(d)) => a >= d,
        }
    }
}

/// robots.txt path pattern: `*` matches any run, trailing `$` anchors the end.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };
    let parts: Vec<&str> = pattern.split('*').collect();

    let mut pos = 0usize;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            if !path.starts_with(part) {
                return false;
            }
            pos = part.len();
            continue;
        }
        match path[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }
    if anchored {
        let last = parts.last().copied().unwrap_or_default();
        return pos == path.len() || (parts.len() > 1 && path.ends_with(last));
    }
    true
}

/// Per-origin robots.txt cache shared by all runs.
#[derive(Default)]
pub struct RobotsCache {
    agent_token: String,
    rules: DashMap<String, Arc<RobotsRules>>,
}

impl RobotsCache {
    pub fn new(agent_token: impl Into<String>) -> Self {
        Self {
            agent_token: agent_token.into(),
            rules: DashMap::new(),
        }
    }

    /// Whether `url` may be fetched. Unreadable robots.txt allows everything.
    pub async fn is_allowed(&self, http: &dyn HttpFetch, url: &url::Url, timeout: Duration) -> bool {
        let origin = url.origin().ascii_serialization();
        let rules = match self.rules.get(&origin) {
            Some(cached) => cached.clone(),
            None => {
                let fetched = Arc::new(self.fetch_rules(http, &origin, timeout).await);
                self.rules.insert(origin.clone(), fetched.clone());
                fetched
            }
        };
        let mut path = url.path().to_string();
        if let Some(q) = url.query() {
            path.push('?');
            path.push_str(q);
        }
        rules.is_allowed(&path)
    }

    async fn fetch_rules(&self, http: &dyn HttpFetch, origin: &str, timeout: Duration) -> RobotsRules {
        let robots_url = format!("{}/robots.txt", origin);
        match http.get(&robots_url, timeout).await {
            Ok(resp) if (200..300).contains(&resp.status) => {
                debug!("🤖 [ROBOTS] Loaded {}", robots_url);
                RobotsRules::parse(&resp.body, &self.agent_token)
            }
            Ok(resp) => {
                debug!("🤖 [ROBOTS] {} returned {}, allowing all", robots_url, resp.status);
                RobotsRules::allow_all()
            }
            Err(e) => {
                warn!("🤖 [ROBOTS] Could not read {}: {}, allowing all", robots_url, e);
                RobotsRules::allow_all()
            }
        }
    }

    pub fn cached_origins(&self) -> usize {
        self.rules.len()
    }
}
