//! Tests for the crawler agent state machine with stubbed search, network and scoring.

#[cfg(test)]
mod agent_tests {
    use crate::bus::EventBus;
    use crate::config::{CrawlerConfig, ScoringConfig, SearchConfig};
    use crate::crawler::agent::{CrawlState, CrawlerAgent};
    use crate::crawler::fetch::FetchRetrier;
    use crate::crawler::resolver::SourceResolver;
    use crate::crawler::traits::{HttpFetch, RelevanceScorer, SearchApi};
    use crate::crawler::types::{AnalysisRequest, Candidate, HttpResponse, SearchHit};
    use crate::error::{NetworkError, PipelineError, SearchError};
    use crate::events::{CandidateOutcome, Event};
    use crate::pipeline::{CancelToken, RunContext};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use uuid::Uuid;

    const PAGE: &str = "<html><title>Acme news</title><p>Acme Biotech announces Phase 2 data.</p></html>";

    struct FixedSearch {
        hits: Vec<SearchHit>,
    }

    #[async_trait]
    impl SearchApi for FixedSearch {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, SearchError> {
            Ok(self.hits.clone())
        }
    }

    /// Per-URL scripted responses; unscripted URLs serve `PAGE`.
    #[derive(Default)]
    struct ScriptedWeb {
        scripts: Mutex<HashMap<String, VecDeque<Result<HttpResponse, NetworkError>>>>,
        gets: Mutex<Vec<String>>,
    }

    impl ScriptedWeb {
        fn script(&self, url: &str, responses: Vec<Result<HttpResponse, NetworkError>>) {
            self.scripts
                .lock()
                .unwrap()
                .insert(url.to_string(), responses.into());
        }

        fn gets_for(&self, url: &str) -> usize {
            self.gets.lock().unwrap().iter().filter(|u| *u == url).count()
        }

        fn total_gets(&self) -> usize {
            self.gets.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpFetch for ScriptedWeb {
        async fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, NetworkError> {
            self.gets.lock().unwrap().push(url.to_string());
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(url) {
                Some(queue) => queue
                    .pop_front()
                    .unwrap_or_else(|| Ok(HttpResponse::status(500))),
                None => Ok(HttpResponse::ok_html(PAGE)),
            }
        }

        async fn head(&self, _url: &str, _timeout: Duration) -> Result<u16, NetworkError> {
            Ok(200)
        }
    }

    /// Scores by URL; unknown URLs score 0.
    struct UrlScores(HashMap<String, f64>);

    impl RelevanceScorer for UrlScores {
        fn score(&self, candidate: &Candidate, _request: &AnalysisRequest) -> f64 {
            self.0.get(&candidate.url).copied().unwrap_or(0.0)
        }
    }

    fn scores(pairs: &[(&str, f64)]) -> Arc<UrlScores> {
        Arc::new(UrlScores(
            pairs.iter().map(|(u, s)| (u.to_string(), *s)).collect(),
        ))
    }

    fn hits(urls: &[&str]) -> Arc<FixedSearch> {
        Arc::new(FixedSearch {
            hits: urls
                .iter()
                .map(|u| SearchHit {
                    url: u.to_string(),
                    title: String::new(),
                    snippet: String::new(),
                })
                .collect(),
        })
    }

    fn config() -> CrawlerConfig {
        CrawlerConfig {
            max_retries: 3,
            backoff_base_ms: 1,
            backoff_cap_ms: 4,
            acceptance_threshold: 0.5,
            respect_robots: false,
            ..CrawlerConfig::default()
        }
    }

    fn build(
        search: Arc<FixedSearch>,
        web: Arc<ScriptedWeb>,
        scorer: Arc<UrlScores>,
        config: CrawlerConfig,
    ) -> CrawlerAgent {
        let search_config = SearchConfig {
            max_queries: 1,
            query_delay_ms: 0,
            ..SearchConfig::default()
        };
        let resolver = SourceResolver::new(
            search,
            web.clone(),
            search_config,
            &config,
            &ScoringConfig::default(),
        );
        let retrier = FetchRetrier::new(web, &config);
        CrawlerAgent::new(resolver, retrier, scorer, &config)
    }

    fn ctx() -> RunContext {
        RunContext::new(Uuid::new_v4(), EventBus::new(256), CancelToken::new())
    }

    const A: &str = "https://a.example/news/1";
    const B: &str = "https://b.example/news/2";
    const C: &str = "https://c.example/news/3";

    #[tokio::test]
    async fn test_highest_score_wins_regardless_of_search_order() {
        let web = Arc::new(ScriptedWeb::default());
        let agent = build(
            hits(&[A, B, C]),
            web.clone(),
            scores(&[(A, 0.3), (B, 0.7), (C, 0.9)]),
            config(),
        );

        let outcome = agent.crawl(&AnalysisRequest::company("Acme Biotech"), &ctx()).await;

        let source = outcome.result.unwrap();
        assert_eq!(source.url, C);
        assert_eq!(source.source_score, 0.9);
        assert_eq!(source.title, "Acme news");
        assert!(!source.fetched_text.is_empty());
        assert_eq!(outcome.tried_candidates, 1);
        assert_eq!(web.total_gets(), 1);
        assert_eq!(
            outcome.transitions,
            vec![
                CrawlState::Idle,
                CrawlState::Resolving,
                CrawlState::Fetching,
                CrawlState::Scoring,
                CrawlState::Accepted,
            ]
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_next_candidate_on_failure() {
        let web = Arc::new(ScriptedWeb::default());
        web.script(C, vec![Ok(HttpResponse::status(404))]);
        let agent = build(
            hits(&[A, B, C]),
            web.clone(),
            scores(&[(A, 0.3), (B, 0.7), (C, 0.9)]),
            config(),
        );

        let outcome = agent.crawl(&AnalysisRequest::company("Acme"), &ctx()).await;

        assert_eq!(outcome.result.unwrap().url, B);
        assert_eq!(outcome.tried_candidates, 2);
        assert_eq!(web.gets_for(A), 0);
    }

    #[tokio::test]
    async fn test_all_not_found_exhausts_without_retries() {
        let web = Arc::new(ScriptedWeb::default());
        for url in [A, B, C] {
            web.script(url, vec![Ok(HttpResponse::status(404))]);
        }
        let agent = build(
            hits(&[A, B, C]),
            web.clone(),
            scores(&[(A, 0.6), (B, 0.6), (C, 0.6)]),
            config(),
        );

        let outcome = agent.crawl(&AnalysisRequest::company("Acme"), &ctx()).await;

        assert_eq!(outcome.final_state(), CrawlState::Exhausted);
        match outcome.result {
            Err(PipelineError::CrawlFailed {
                tried_candidates,
                last_errors,
            }) => {
                assert_eq!(tried_candidates, 3);
                assert_eq!(last_errors.len(), 3);
            }
            other => panic!("expected CrawlFailed, got {:?}", other),
        }
        for url in [A, B, C] {
            assert_eq!(web.gets_for(url), 1);
        }
    }

    #[tokio::test]
    async fn test_below_threshold_everywhere_exhausts() {
        let web = Arc::new(ScriptedWeb::default());
        let agent = build(
            hits(&[A, B]),
            web.clone(),
            scores(&[(A, 0.1), (B, 0.2)]),
            config(),
        );

        let outcome = agent.crawl(&AnalysisRequest::company("Acme"), &ctx()).await;

        match outcome.result {
            Err(PipelineError::CrawlFailed {
                tried_candidates,
                last_errors,
            }) => {
                assert_eq!(tried_candidates, 2);
                assert!(last_errors.iter().all(|e| e.contains("below threshold")));
            }
            other => panic!("expected CrawlFailed, got {:?}", other),
        }
        assert_eq!(web.total_gets(), 2);
    }

    #[tokio::test]
    async fn test_timeouts_then_success_is_accepted() {
        let web = Arc::new(ScriptedWeb::default());
        web.script(
            A,
            vec![
                Err(NetworkError::Timeout),
                Err(NetworkError::Timeout),
                Ok(HttpResponse::ok_html(PAGE)),
            ],
        );
        let agent = build(hits(&[A]), web.clone(), scores(&[(A, 0.8)]), config());

        let outcome = agent.crawl(&AnalysisRequest::company("Acme"), &ctx()).await;

        let source = outcome.result.unwrap();
        assert_eq!(source.fetch_attempts, 3);
        assert_eq!(web.gets_for(A), 3);
    }

    #[tokio::test]
    async fn test_transient_failures_are_bounded() {
        let web = Arc::new(ScriptedWeb::default());
        for url in [A, B, C] {
            web.script(url, vec![]);
        }
        let cfg = config();
        let agent = build(
            hits(&[A, B, C]),
            web.clone(),
            scores(&[(A, 0.9), (B, 0.9), (C, 0.9)]),
            cfg.clone(),
        );

        let outcome = agent.crawl(&AnalysisRequest::company("Acme"), &ctx()).await;

        assert!(outcome.result.is_err());
        assert_eq!(web.total_gets(), 3 * cfg.max_retries as usize);
        assert!(outcome.transitions.len() <= 2 + 2 * 3 + 1);
    }

    #[tokio::test]
    async fn test_url_request_is_pinned() {
        let url = "https://example.com/press/1";
        let web = Arc::new(ScriptedWeb::default());
        let agent = build(hits(&[]), web.clone(), scores(&[(url, 0.9)]), config());

        let outcome = agent
            .crawl(&AnalysisRequest::press_release(url), &ctx())
            .await;

        let source = outcome.result.as_ref().unwrap();
        assert_eq!(source.url, url);
        assert_eq!(source.source_score, 0.9);
        assert_eq!(source.fetch_attempts, 1);
        assert_eq!(web.gets_for(url), 1);
        assert_eq!(outcome.final_state(), CrawlState::Accepted);
    }

    #[tokio::test]
    async fn test_url_request_below_threshold_is_rejected() {
        let url = "https://recipes.example/lasagna";
        let web = Arc::new(ScriptedWeb::default());
        web.script(
            url,
            vec![Ok(HttpResponse::ok_html(
                "<html><p>Layer the pasta, sauce and cheese, then bake.</p></html>",
            ))],
        );
        let agent = build(hits(&[]), web.clone(), scores(&[(url, 0.1)]), config());

        let outcome = agent
            .crawl(&AnalysisRequest::press_release(url), &ctx())
            .await;

        assert_eq!(outcome.final_state(), CrawlState::Exhausted);
        assert_eq!(outcome.tried_candidates, 1);
        match outcome.result {
            Err(PipelineError::CrawlFailed {
                tried_candidates,
                last_errors,
            }) => {
                assert_eq!(tried_candidates, 1);
                assert!(last_errors[0].contains("below threshold"));
            }
            other => panic!("expected CrawlFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let web = Arc::new(ScriptedWeb::default());
        let agent = build(hits(&[]), web, scores(&[]), config());

        let outcome = agent.crawl(&AnalysisRequest::company("Acme"), &ctx()).await;

        assert_eq!(
            outcome.result.unwrap_err(),
            PipelineError::NoCandidatesFound { queries_attempted: 1 }
        );
        assert_eq!(
            outcome.transitions,
            vec![CrawlState::Idle, CrawlState::Resolving, CrawlState::Exhausted]
        );
    }

    #[tokio::test]
    async fn test_concurrent_fetches_keep_score_priority() {
        let web = Arc::new(ScriptedWeb::default());
        web.script(C, vec![Ok(HttpResponse::status(410))]);
        let agent = build(
            hits(&[A, B, C]),
            web.clone(),
            scores(&[(A, 0.6), (B, 0.7), (C, 0.9)]),
            CrawlerConfig {
                fetch_concurrency: 3,
                ..config()
            },
        );

        let outcome = agent.crawl(&AnalysisRequest::company("Acme"), &ctx()).await;

        assert_eq!(outcome.result.unwrap().url, B);
    }

    #[tokio::test]
    async fn test_cancelled_run_stops() {
        let web = Arc::new(ScriptedWeb::default());
        let agent = build(hits(&[A]), web.clone(), scores(&[(A, 0.9)]), config());
        let ctx = ctx();
        ctx.cancel.cancel();

        let outcome = agent.crawl(&AnalysisRequest::company("Acme"), &ctx).await;

        assert_eq!(outcome.result.unwrap_err(), PipelineError::Cancelled);
        assert_eq!(web.total_gets(), 0);
    }

    #[tokio::test]
    async fn test_candidate_events_published() {
        let web = Arc::new(ScriptedWeb::default());
        web.script(C, vec![Ok(HttpResponse::status(404))]);
        let agent = build(
            hits(&[B, C]),
            web,
            scores(&[(B, 0.7), (C, 0.9)]),
            config(),
        );
        let ctx = ctx();
        let mut rx = ctx.bus.subscribe();

        agent
            .crawl(&AnalysisRequest::company("Acme"), &ctx)
            .await
            .result
            .unwrap();

        let mut outcomes = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Event::CandidateTried { url, outcome, .. } = event {
                outcomes.push((url, outcome));
            }
        }
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, C);
        assert!(matches!(outcomes[0].1, CandidateOutcome::FetchFailed { attempts: 1, .. }));
        assert_eq!(outcomes[1].0, B);
        assert!(matches!(outcomes[1].1, CandidateOutcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn test_deadline_ends_crawl() {
        struct SlowWeb;

        #[async_trait]
        impl HttpFetch for SlowWeb {
            async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse, NetworkError> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(HttpResponse::ok_html(PAGE))
            }
        }

        let cfg = CrawlerConfig {
            overall_crawl_timeout_ms: 50,
            ..config()
        };
        let web: Arc<dyn HttpFetch> = Arc::new(SlowWeb);
        let resolver = SourceResolver::new(
            hits(&[A]),
            web.clone(),
            SearchConfig {
                max_queries: 1,
                query_delay_ms: 0,
                ..SearchConfig::default()
            },
            &cfg,
            &ScoringConfig::default(),
        );
        let agent = CrawlerAgent::new(
            resolver,
            FetchRetrier::new(web, &cfg),
            scores(&[(A, 0.9)]),
            &cfg,
        );

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            agent.crawl(&AnalysisRequest::company("Acme"), &ctx()),
        )
        .await
        .unwrap();

        match outcome.result {
            Err(PipelineError::CrawlFailed { last_errors, .. }) => {
                assert!(last_errors.iter().any(|e| e.contains("deadline")));
            }
            other => panic!("expected CrawlFailed, got {:?}", other),
        }
    }
}
