//! Retrying document fetcher.
//!
//! One `FetchRetrier::fetch` call retries transient failures with capped
//! exponential backoff and gives up at once on permanent ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::normalize::{extract_main_text, extract_title, is_textual_content_type};
use super::robots::RobotsCache;
use super::traits::HttpFetch;
use super::types::HttpResponse;
use crate::config::CrawlerConfig;
use crate::constants::events;
use crate::error::{FailureKind, FetchError, NetworkError};
use crate::pipeline::CancelToken;

/// `HttpFetch` over a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, NetworkError> {
        let resp = self.client.get(url).timeout(timeout).send().await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = resp.text().await?;
        Ok(HttpResponse {
            status,
            body,
            content_type,
        })
    }

    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, NetworkError> {
        let resp = self.client.head(url).timeout(timeout).send().await?;
        Ok(resp.status().as_u16())
    }
}

/// Attempt budget and backoff curve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base: Duration::from_millis(config.backoff_base_ms),
            cap: Duration::from_millis(config.backoff_cap_ms),
        }
    }

    /// Delay before attempt `attempt + 1`: `base * 2^(attempt-1)`, capped.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Uniform jitter in `[delay / 2, delay]`.
pub fn jittered(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms < 2 {
        return delay;
    }
    Duration::from_millis(rand::thread_rng().gen_range(ms / 2..=ms))
}

/// Progress of one fetch through its retry budget.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<String>,
    pub next_delay: Option<Duration>,
}

impl RetryState {
    /// Record a failed attempt. Returns the delay to wait, or `None` when exhausted.
    pub fn record_failure(&mut self, policy: &RetryPolicy, reason: String) -> Option<Duration> {
        self.last_error = Some(reason);
        self.next_delay = if self.attempt < policy.max_attempts {
            Some(policy.backoff_delay(self.attempt))
        } else {
            None
        };
        self.next_delay
    }
}

/// A successfully fetched and normalized document.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchedDocument {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub attempts: u32,
    pub fetched_at: DateTime<Utc>,
}

struct AttemptFailure {
    kind: FailureKind,
    reason: String,
}

impl AttemptFailure {
    fn transient(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            reason: reason.into(),
        }
    }

    fn permanent(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            reason: reason.into(),
        }
    }
}

/// Transient: 408, 429, 5xx. Everything else outside 2xx is permanent.
pub fn classify_status(status: u16) -> Option<FailureKind> {
    match status {
        200..=299 => None,
        408 | 429 | 500..=599 => Some(FailureKind::Transient),
        _ => Some(FailureKind::Permanent),
    }
}

pub struct FetchRetrier {
    http: Arc<dyn HttpFetch>,
    policy: RetryPolicy,
    timeout: Duration,
    max_document_chars: usize,
    robots: Option<Arc<RobotsCache>>,
}

impl FetchRetrier {
    pub fn new(http: Arc<dyn HttpFetch>, config: &CrawlerConfig) -> Self {
        Self {
            http,
            policy: RetryPolicy::from_config(config),
            timeout: config.fetch_timeout(),
            max_document_chars: config.max_document_chars,
            robots: None,
        }
    }

    pub fn with_robots(mut self, robots: Arc<RobotsCache>) -> Self {
        self.robots = Some(robots);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch and normalize `url`, retrying transient failures.
    pub async fn fetch(&self, url: &str, cancel: &CancelToken) -> Result<FetchedDocument, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::Permanent {
            url: url.to_string(),
            reason: format!("invalid url: {}", e),
            attempts: 0,
        })?;

        if let Some(robots) = &self.robots {
            if !robots.is_allowed(self.http.as_ref(), &parsed, self.timeout).await {
                info!("🤖 [ROBOTS] {} disallowed, skipping", url);
                return Err(FetchError::Permanent {
                    url: url.to_string(),
                    reason: "disallowed by robots.txt".to_string(),
                    attempts: 0,
                });
            }
        }

        let mut state = RetryState::default();
        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
            state.attempt += 1;
            debug!("🌐 [FETCH] {} attempt {}/{}", url, state.attempt, self.policy.max_attempts);

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(FetchError::Cancelled { url: url.to_string() });
                }
                outcome = self.attempt(url) => outcome,
            };

            let failure = match outcome {
                Ok((title, text)) => {
                    return Ok(FetchedDocument {
                        url: url.to_string(),
                        title,
                        text,
                        attempts: state.attempt,
                        fetched_at: Utc::now(),
                    });
                }
                Err(failure) => failure,
            };

            if failure.kind == FailureKind::Permanent {
                warn!("🌐 [FETCH] {} failed permanently: {}", url, failure.reason);
                return Err(FetchError::Permanent {
                    url: url.to_string(),
                    reason: failure.reason,
                    attempts: state.attempt,
                });
            }

            let Some(delay) = state.record_failure(&self.policy, failure.reason) else {
                let reason = state.last_error.take().unwrap_or_default();
                warn!(
                    "🌐 [FETCH] {} giving up after {} attempts: {}",
                    url, state.attempt, reason
                );
                return Err(FetchError::Transient {
                    url: url.to_string(),
                    reason,
                    attempts: state.attempt,
                });
            };

            let delay = jittered(delay);
            warn!(
                event = events::FETCH_RETRY,
                attempt = state.attempt,
                "🌐 [FETCH] {} attempt {} failed ({}), retrying in {:?}",
                url,
                state.attempt,
                state.last_error.as_deref().unwrap_or_default(),
                delay
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(FetchError::Cancelled { url: url.to_string() });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<(Option<String>, String), AttemptFailure> {
        let resp = match self.http.get(url, self.timeout).await {
            Ok(resp) => resp,
            Err(e) => {
                return Err(AttemptFailure {
                    kind: e.kind(),
                    reason: e.to_string(),
                })
            }
        };

        match classify_status(resp.status) {
            None => {}
            Some(FailureKind::Transient) => {
                return Err(AttemptFailure::transient(format!("HTTP {}", resp.status)))
            }
            Some(FailureKind::Permanent) if (300..400).contains(&resp.status) => {
                return Err(AttemptFailure::permanent(format!(
                    "unresolved redirect (HTTP {})",
                    resp.status
                )))
            }
            Some(FailureKind::Permanent) => {
                return Err(AttemptFailure::permanent(format!("HTTP {}", resp.status)))
            }
        }

        if !is_textual_content_type(resp.content_type.as_deref()) {
            return Err(AttemptFailure::permanent(format!(
                "unsupported content type {}",
                resp.content_type.as_deref().unwrap_or_default()
            )));
        }

        let text = extract_main_text(&resp.body, self.max_document_chars);
        if text.trim().is_empty() {
            return Err(AttemptFailure::permanent("document has no readable text"));
        }
        Ok((extract_title(&resp.body), text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted responses and counts calls.
    struct ScriptedHttp {
        script: Mutex<VecDeque<Result<HttpResponse, NetworkError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedHttp {
        fn new(script: Vec<Result<HttpResponse, NetworkError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl HttpFetch for ScriptedHttp {
        async fn get(&self, _url: &str, _timeout: Duration) -> Result<HttpResponse, NetworkError> {
            *self.calls.lock().unwrap() += 1;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::status(500)))
        }
    }

    fn fast_config(max_retries: u32) -> CrawlerConfig {
        CrawlerConfig {
            max_retries,
            backoff_base_ms: 1,
            backoff_cap_ms: 4,
            respect_robots: false,
            ..CrawlerConfig::default()
        }
    }

    const PAGE: &str = "<html><title>Release</title><p>Acme announces Phase 3 results.</p></html>";

    #[tokio::test]
    async fn test_timeouts_then_success() {
        let http = ScriptedHttp::new(vec![
            Err(NetworkError::Timeout),
            Err(NetworkError::Timeout),
            Ok(HttpResponse::ok_html(PAGE)),
        ]);
        let retrier = FetchRetrier::new(http.clone(), &fast_config(3));

        let doc = retrier
            .fetch("https://acme.example/news/1", &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(doc.attempts, 3);
        assert_eq!(doc.title.as_deref(), Some("Release"));
        assert!(doc.text.contains("Phase 3 results"));
        assert_eq!(http.calls(), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let http = ScriptedHttp::new(vec![Ok(HttpResponse::status(404))]);
        let retrier = FetchRetrier::new(http.clone(), &fast_config(3));

        let err = retrier
            .fetch("https://acme.example/gone", &CancelToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Permanent);
        assert_eq!(err.attempts(), 1);
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_budget() {
        let http = ScriptedHttp::new(vec![
            Ok(HttpResponse::status(503)),
            Ok(HttpResponse::status(502)),
            Ok(HttpResponse::status(500)),
            Ok(HttpResponse::ok_html(PAGE)),
        ]);
        let retrier = FetchRetrier::new(http.clone(), &fast_config(3));

        let err = retrier
            .fetch("https://acme.example/flaky", &CancelToken::new())
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(err.attempts(), 3);
        assert_eq!(http.calls(), 3);
    }

    #[tokio::test]
    async fn test_non_text_and_empty_documents_are_permanent() {
        let pdf = HttpResponse {
            status: 200,
            body: "%PDF-1.7".to_string(),
            content_type: Some("application/pdf".to_string()),
        };
        let http = ScriptedHttp::new(vec![Ok(pdf)]);
        let retrier = FetchRetrier::new(http.clone(), &fast_config(3));
        let err = retrier
            .fetch("https://acme.example/deck.pdf", &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Permanent);
        assert_eq!(http.calls(), 1);

        let http = ScriptedHttp::new(vec![Ok(HttpResponse::ok_html("<nav>Menu</nav>"))]);
        let retrier = FetchRetrier::new(http.clone(), &fast_config(3));
        let err = retrier
            .fetch("https://acme.example/empty", &CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Permanent);
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn test_redirect_and_rate_limit_classification() {
        assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(429), Some(FailureKind::Transient));
        assert_eq!(classify_status(408), Some(FailureKind::Transient));
        assert_eq!(classify_status(503), Some(FailureKind::Transient));
        assert_eq!(classify_status(301), Some(FailureKind::Permanent));
        assert_eq!(classify_status(410), Some(FailureKind::Permanent));
        assert_eq!(classify_status(403), Some(FailureKind::Permanent));
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let http = ScriptedHttp::new(vec![Err(NetworkError::Timeout)]);
        let config = CrawlerConfig {
            max_retries: 5,
            backoff_base_ms: 10_000,
            backoff_cap_ms: 10_000,
            respect_robots: false,
            ..CrawlerConfig::default()
        };
        let retrier = FetchRetrier::new(http.clone(), &config);
        let cancel = CancelToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            retrier.fetch("https://acme.example/slow", &cancel),
        )
        .await
        .unwrap();

        assert!(matches!(result, Err(FetchError::Cancelled { .. })));
        assert_eq!(http.calls(), 1);
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base: Duration::from_millis(500),
            cap: Duration::from_millis(8_000),
        };
        let delays: Vec<u64> = (1..=7)
            .map(|n| policy.backoff_delay(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![500, 1_000, 2_000, 4_000, 8_000, 8_000, 8_000]);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        for _ in 0..100 {
            let d = jittered(Duration::from_millis(1_000)).as_millis();
            assert!((500..=1_000).contains(&d));
        }
        assert_eq!(jittered(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_retry_state_tracks_budget() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base: Duration::from_millis(100),
            cap: Duration::from_millis(1_000),
        };
        let mut state = RetryState::default();

        state.attempt = 1;
        assert_eq!(
            state.record_failure(&policy, "timeout".to_string()),
            Some(Duration::from_millis(100))
        );
        assert_eq!(state.last_error.as_deref(), Some("timeout"));

        state.attempt = 2;
        assert_eq!(state.record_failure(&policy, "reset".to_string()), None);
        assert_eq!(state.next_delay, None);
    }

    #[tokio::test]
    async fn test_robots_disallow_skips_fetch() {
        let http = ScriptedHttp::new(vec![Ok(HttpResponse {
            status: 200,
            body: "User-agent: *\nDisallow: /private\n".to_string(),
            content_type: Some("text/plain".to_string()),
        })]);
        let retrier = FetchRetrier::new(http.clone(), &fast_config(3))
            .with_robots(Arc::new(RobotsCache::new("marketpulse")));

        let err = retrier
            .fetch("https://acme.example/private/doc", &CancelToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Permanent);
        assert_eq!(err.attempts(), 0);
        // only the robots.txt request went out
        assert_eq!(http.calls(), 1);
    }
}
