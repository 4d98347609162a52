use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::traits::SearchApi;
use super::types::SearchHit;
use crate::error::SearchError;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct SearxResponse {
    #[serde(default)]
    results: Vec<SearxResult>,
}

#[derive(Debug, Deserialize)]
struct SearxResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

/// Search over a SearXNG-compatible JSON endpoint (`?q=...&format=json`).
#[derive(Clone)]
pub struct HttpSearchClient {
    client: Client,
    endpoint: String,
}

impl HttpSearchClient {
    pub fn new(endpoint: impl Into<String>, user_agent: &str) -> Result<Self, SearchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(SEARCH_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SearchApi for HttpSearchClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
        debug!("🔎 [SEARCH] {} ({})", query, self.endpoint);
        let url = url::Url::parse_with_params(&self.endpoint, &[("q", query), ("format", "json")])
            .map_err(|e| SearchError::Network(format!("bad search endpoint: {}", e)))?;
        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        parse_results(&body, limit)
    }
}

fn parse_results(body: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError> {
    let parsed: SearxResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Parse(e.to_string()))?;
    Ok(parsed
        .results
        .into_iter()
        .filter(|r| r.url.starts_with("http://") || r.url.starts_with("https://"))
        .take(limit)
        .map(|r| SearchHit {
            url: r.url,
            title: r.title,
            snippet: r.content,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_searx_results() {
        let body = r#"{
            "query": "acme press release",
            "results": [
                {"url": "https://www.businesswire.com/news/acme", "title": "Acme Announces", "content": "Acme today announced"},
                {"url": "ftp://files.example/x", "title": "ftp"},
                {"url": "https://acme.example/press", "title": "Press"}
            ]
        }"#;
        let hits = parse_results(body, 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Acme Announces");
        assert_eq!(hits[0].snippet, "Acme today announced");
        assert_eq!(hits[1].snippet, "");
    }

    #[test]
    fn test_parse_respects_limit() {
        let body = r#"{"results": [
            {"url": "https://a.example/1"},
            {"url": "https://a.example/2"},
            {"url": "https://a.example/3"}
        ]}"#;
        assert_eq!(parse_results(body, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_results("<html>", 5), Err(SearchError::Parse(_))));
        assert!(parse_results("{}", 5).unwrap().is_empty());
    }
}
