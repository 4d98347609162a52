//! Turns an `AnalysisRequest` into an ordered list of candidate sources.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::fetch::jittered;
use super::scorer::domain_tier;
use super::traits::{HttpFetch, SearchApi};
use super::types::{AnalysisRequest, Candidate, RequestKind};
use crate::config::{CrawlerConfig, ScoringConfig, SearchConfig};
use crate::constants::crawler::PINNED_CANDIDATE_SCORE;
use crate::constants::search::TRACKING_PARAMS;
use crate::error::PipelineError;
use crate::events::Event;
use crate::pipeline::RunContext;

pub struct SourceResolver {
    search: Arc<dyn SearchApi>,
    http: Arc<dyn HttpFetch>,
    search_config: SearchConfig,
    max_candidates: usize,
    probe_timeout: Duration,
    trusted_domains: Vec<String>,
}

impl SourceResolver {
    pub fn new(
        search: Arc<dyn SearchApi>,
        http: Arc<dyn HttpFetch>,
        search_config: SearchConfig,
        crawler_config: &CrawlerConfig,
        scoring_config: &ScoringConfig,
    ) -> Self {
        Self {
            search,
            http,
            search_config,
            max_candidates: crawler_config.max_candidates,
            probe_timeout: crawler_config.fetch_timeout(),
            trusted_domains: scoring_config.trusted_domains.clone(),
        }
    }

    pub async fn resolve(
        &self,
        request: &AnalysisRequest,
        ctx: &RunContext,
    ) -> Result<Vec<Candidate>, PipelineError> {
        match request.kind {
            RequestKind::PressReleaseUrl => self.resolve_url(request, ctx).await,
            RequestKind::CompanyName => self.resolve_company(request, ctx).await,
        }
    }

    async fn resolve_url(
        &self,
        request: &AnalysisRequest,
        ctx: &RunContext,
    ) -> Result<Vec<Candidate>, PipelineError> {
        let raw = request.value.trim();
        let invalid = |reason: String| PipelineError::InvalidUrl {
            url: raw.to_string(),
            reason,
        };

        let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", parsed.scheme())));
        }
        if parsed.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }

        match self.http.head(raw, self.probe_timeout).await {
            Ok(status @ (404 | 410)) => {
                return Err(invalid(format!("not found (HTTP {})", status)));
            }
            Ok(status) if status >= 400 => {
                warn!("🔎 [RESOLVER] {} answered HTTP {} to probe, continuing", raw, status);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("🔎 [RESOLVER] Could not probe {}: {}, continuing", raw, e);
            }
        }

        let rank = domain_tier(raw, &request.terms(), &self.trusted_domains).rank();
        let candidate = Candidate {
            url: raw.to_string(),
            title: String::new(),
            snippet: String::new(),
            score: PINNED_CANDIDATE_SCORE,
            domain_rank: rank,
            pinned: true,
            excerpt: None,
        };

        ctx.emit(Event::Searching {
            run_id: ctx.run_id,
            queries_attempted: 0,
            candidates_found: 1,
        });
        info!("🔎 [RESOLVER] Using provided URL {}", raw);
        Ok(vec![candidate])
    }

    async fn resolve_company(
        &self,
        request: &AnalysisRequest,
        ctx: &RunContext,
    ) -> Result<Vec<Candidate>, PipelineError> {
        let mut company = request.normalized_company();
        if company.is_empty() {
            company = request.value.trim().to_string();
        }
        let terms = request.terms();
        let queries: Vec<String> = self
            .search_config
            .query_templates
            .iter()
            .take(self.search_config.max_queries)
            .map(|t| t.replace("{company}", &company))
            .collect();

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut attempted = 0usize;

        for query in &queries {
            if ctx.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            if attempted > 0 && self.search_config.query_delay_ms > 0 {
                let delay = jittered(Duration::from_millis(self.search_config.query_delay_ms));
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(PipelineError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            attempted += 1;
            match self
                .search
                .search(query, self.search_config.results_per_query)
                .await
            {
                Ok(hits) => {
                    let before = candidates.len();
                    for hit in hits {
                        let Some(key) = normalize_url(&hit.url) else {
                            continue;
                        };
                        if !seen.insert(key) {
                            continue;
                        }
                        let rank = domain_tier(&hit.url, &terms, &self.trusted_domains).rank();
                        candidates.push(Candidate::from_hit(hit, rank));
                    }
                    info!(
                        "🔎 [RESOLVER] \"{}\" added {} new candidates ({} total)",
                        query,
                        candidates.len() - before,
                        candidates.len()
                    );
                }
                Err(e) => {
                    warn!("🔎 [RESOLVER] Search \"{}\" failed: {}", query, e);
                }
            }

            ctx.emit(Event::Searching {
                run_id: ctx.run_id,
                queries_attempted: attempted,
                candidates_found: candidates.len(),
            });

            if candidates.len() >= self.max_candidates {
                break;
            }
        }

        if candidates.is_empty() {
            return Err(PipelineError::NoCandidatesFound {
                queries_attempted: attempted,
            });
        }

        // stable: ties keep search order
        candidates.sort_by_key(|c| c.domain_rank);
        candidates.truncate(self.max_candidates);
        Ok(candidates)
    }
}

/// Canonical form used for dedup. `None` for non-http(s) or unparsable URLs.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut parsed = url::Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed.set_fragment(None);
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = parsed.path().trim_end_matches('/').to_string();
    let query = parsed.query().map(|q| format!("?{}", q)).unwrap_or_default();
    Some(format!("{}{}{}", host, path, query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::crawler::types::{HttpResponse, SearchHit};
    use crate::error::{NetworkError, SearchError};
    use crate::pipeline::CancelToken;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct StubSearch {
        results: HashMap<String, Result<Vec<SearchHit>, SearchError>>,
        queries: Mutex<Vec<String>>,
    }

    impl StubSearch {
        fn new(results: Vec<(&str, Result<Vec<SearchHit>, SearchError>)>) -> Arc<Self> {
            Arc::new(Self {
                results: results
                    .into_iter()
                    .map(|(q, r)| (q.to_string(), r))
                    .collect(),
                queries: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SearchApi for StubSearch {
        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchHit>, SearchError> {
            self.queries.lock().unwrap().push(query.to_string());
            self.results.get(query).cloned().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    struct StubHttp {
        head_status: Result<u16, NetworkError>,
    }

    #[async_trait]
    impl HttpFetch for StubHttp {
        async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse, NetworkError> {
            Ok(HttpResponse::status(200))
        }

        async fn head(&self, _url: &str, _timeout: Duration) -> Result<u16, NetworkError> {
            self.head_status.clone()
        }
    }

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            title: "t".to_string(),
            snippet: "s".to_string(),
        }
    }

    fn resolver(search: Arc<StubSearch>, head: Result<u16, NetworkError>, max_candidates: usize) -> SourceResolver {
        let search_config = SearchConfig {
            max_queries: 3,
            query_delay_ms: 0,
            query_templates: vec![
                "{company} press release".to_string(),
                "{company} announces".to_string(),
                "{company} clinical trial".to_string(),
                "{company} never used".to_string(),
            ],
            ..SearchConfig::default()
        };
        let crawler_config = CrawlerConfig {
            max_candidates,
            ..CrawlerConfig::default()
        };
        SourceResolver::new(
            search,
            Arc::new(StubHttp { head_status: head }),
            search_config,
            &crawler_config,
            &ScoringConfig::default(),
        )
    }

    fn ctx() -> RunContext {
        RunContext::new(Uuid::new_v4(), EventBus::new(64), CancelToken::new())
    }

    #[tokio::test]
    async fn test_company_dedups_and_orders_by_domain() {
        let search = StubSearch::new(vec![
            (
                "Acme Biotech press release",
                Ok(vec![
                    hit("https://random-blog.example/post"),
                    hit("https://www.reuters.com/business/acme?utm_source=x"),
                ]),
            ),
            (
                "Acme Biotech announces",
                Ok(vec![
                    hit("https://reuters.com/business/acme/"),
                    hit("https://acmebiotech.com/investors/news/2025"),
                ]),
            ),
        ]);
        let resolver = resolver(search.clone(), Ok(200), 10);

        let candidates = resolver
            .resolve(&AnalysisRequest::company("Acme Biotech, Inc."), &ctx())
            .await
            .unwrap();

        let urls: Vec<&str> = candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.reuters.com/business/acme?utm_source=x",
                "https://acmebiotech.com/investors/news/2025",
                "https://random-blog.example/post",
            ]
        );
        assert!(candidates.iter().all(|c| !c.pinned));
        assert_eq!(search.queries.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_stops_querying_at_candidate_cap() {
        let search = StubSearch::new(vec![(
            "Acme press release",
            Ok(vec![hit("https://a.example/1"), hit("https://a.example/2")]),
        )]);
        let resolver = resolver(search.clone(), Ok(200), 2);

        let candidates = resolver
            .resolve(&AnalysisRequest::company("Acme"), &ctx())
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(search.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_results_reports_queries_attempted() {
        let search = StubSearch::new(vec![(
            "Acme announces",
            Err(SearchError::Http {
                status: 503,
                body: String::new(),
            }),
        )]);
        let resolver = resolver(search, Ok(200), 10);
        let ctx = ctx();
        let mut rx = ctx.bus.subscribe();

        let err = resolver
            .resolve(&AnalysisRequest::company("Acme"), &ctx)
            .await
            .unwrap_err();

        assert_eq!(err, PipelineError::NoCandidatesFound { queries_attempted: 3 });

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            if let Event::Searching { queries_attempted, .. } = event {
                last = Some(queries_attempted);
            }
        }
        assert_eq!(last, Some(3));
    }

    #[tokio::test]
    async fn test_url_request_yields_pinned_candidate() {
        let resolver = resolver(StubSearch::new(vec![]), Ok(200), 10);
        let url = "https://www.businesswire.com/news/home/2025/acme-announces";

        let candidates = resolver
            .resolve(&AnalysisRequest::press_release(url), &ctx())
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, url);
        assert_eq!(candidates[0].score, PINNED_CANDIDATE_SCORE);
        assert!(candidates[0].pinned);
        assert_eq!(candidates[0].domain_rank, 0);
    }

    #[tokio::test]
    async fn test_url_request_rejects_malformed_and_missing() {
        let resolver_ok = resolver(StubSearch::new(vec![]), Ok(200), 10);
        let err = resolver_ok
            .resolve(&AnalysisRequest::press_release("not a url"), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidUrl { .. }));

        let err = resolver_ok
            .resolve(&AnalysisRequest::press_release("ftp://files.example/x"), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidUrl { .. }));

        let resolver_gone = resolver(StubSearch::new(vec![]), Ok(404), 10);
        let err = resolver_gone
            .resolve(&AnalysisRequest::press_release("https://acme.example/pr"), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_probe_is_not_fatal() {
        let resolver = resolver(
            StubSearch::new(vec![]),
            Err(NetworkError::Connect("refused".to_string())),
            10,
        );
        let candidates = resolver
            .resolve(&AnalysisRequest::press_release("https://acme.example/pr"), &ctx())
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_search() {
        let resolver = resolver(StubSearch::new(vec![]), Ok(200), 10);
        let ctx = ctx();
        ctx.cancel.cancel();
        let err = resolver
            .resolve(&AnalysisRequest::company("Acme"), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err, PipelineError::Cancelled);
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("https://WWW.Example.com/News/?utm_source=x&id=7#top").as_deref(),
            Some("example.com/News?id=7")
        );
        assert_eq!(
            normalize_url("http://example.com/a/").as_deref(),
            normalize_url("https://example.com/a?fbclid=123").as_deref()
        );
        assert_eq!(normalize_url("mailto:a@b.c"), None);
        assert_eq!(normalize_url("nonsense"), None);
    }
}
