//! Crawler agent: resolve → fetch → score → accept, with fallback across candidates.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use super::fetch::FetchRetrier;
use super::normalize::truncate_chars;
use super::resolver::SourceResolver;
use super::traits::RelevanceScorer;
use super::types::{AnalysisRequest, Candidate, CanonicalSource};
use crate::config::CrawlerConfig;
use crate::constants::crawler::SCORING_EXCERPT_CHARS;
use crate::constants::events;
use crate::error::{FetchError, PipelineError};
use crate::events::{CandidateOutcome, Event};
use crate::pipeline::{RunContext, SourceStage};

/// Failure reasons kept on `CrawlFailed`.
const MAX_REPORTED_ERRORS: usize = 5;
const DEADLINE_EXCEEDED: &str = "crawl deadline exceeded";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlState {
    Idle,
    Resolving,
    Fetching,
    Scoring,
    Accepted,
    Exhausted,
}

impl CrawlState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlState::Accepted | CrawlState::Exhausted)
    }
}

/// Result of one crawl plus the states it went through.
#[derive(Debug)]
pub struct CrawlOutcome {
    pub result: Result<CanonicalSource, PipelineError>,
    pub transitions: Vec<CrawlState>,
    pub tried_candidates: usize,
}

impl CrawlOutcome {
    pub fn final_state(&self) -> CrawlState {
        self.transitions.last().copied().unwrap_or(CrawlState::Idle)
    }
}

struct Trace {
    states: Vec<CrawlState>,
}

impl Trace {
    fn new() -> Self {
        Self {
            states: vec![CrawlState::Idle],
        }
    }

    fn enter(&mut self, state: CrawlState) {
        self.states.push(state);
    }
}

pub struct CrawlerAgent {
    resolver: SourceResolver,
    retrier: FetchRetrier,
    scorer: Arc<dyn RelevanceScorer>,
    threshold: f64,
    concurrency: usize,
    overall_timeout: Duration,
}

impl CrawlerAgent {
    pub fn new(
        resolver: SourceResolver,
        retrier: FetchRetrier,
        scorer: Arc<dyn RelevanceScorer>,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            resolver,
            retrier,
            scorer,
            threshold: config.acceptance_threshold,
            concurrency: config.fetch_concurrency.max(1),
            overall_timeout: config.overall_crawl_timeout(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub async fn crawl(&self, request: &AnalysisRequest, ctx: &RunContext) -> CrawlOutcome {
        let mut trace = Trace::new();
        let mut tried = 0usize;
        let result = self.run(request, ctx, &mut trace, &mut tried).await;
        if !trace.states.last().is_some_and(|s| s.is_terminal()) {
            trace.enter(CrawlState::Exhausted);
        }
        CrawlOutcome {
            result,
            transitions: trace.states,
            tried_candidates: tried,
        }
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        ctx: &RunContext,
        trace: &mut Trace,
        tried: &mut usize,
    ) -> Result<CanonicalSource, PipelineError> {
        let deadline = Instant::now() + self.overall_timeout;

        trace.enter(CrawlState::Resolving);
        info!(run_id = %ctx.run_id, "🕷️ [CRAWLER] Resolving {:?} \"{}\"", request.kind, request.value);
        let mut candidates = match timeout_at(deadline, self.resolver.resolve(request, ctx)).await {
            Ok(resolved) => resolved?,
            Err(_) => {
                return Err(PipelineError::CrawlFailed {
                    tried_candidates: 0,
                    last_errors: vec![DEADLINE_EXCEEDED.to_string()],
                })
            }
        };

        // pinned URLs keep their resolver score until fetched
        for candidate in candidates.iter_mut().filter(|c| !c.pinned) {
            candidate.score = self.scorer.score(candidate, request);
        }
        // stable: equal scores keep resolver order
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        info!(
            run_id = %ctx.run_id,
            "🕷️ [CRAWLER] {} candidates, fetching in score order (threshold {:.2})",
            candidates.len(),
            self.threshold
        );

        let retrier = &self.retrier;
        let cancel = &ctx.cancel;
        let mut remaining = candidates.len();
        let fetches = stream::iter(candidates.into_iter().map(|candidate| async move {
            let result = retrier.fetch(&candidate.url, cancel).await;
            (candidate, result)
        }))
        .buffered(self.concurrency);
        let mut fetches = std::pin::pin!(fetches);

        let mut errors: Vec<String> = Vec::new();
        while remaining > 0 {
            ctx.check_cancelled()?;
            trace.enter(CrawlState::Fetching);
            let (candidate, fetched) = match timeout_at(deadline, fetches.next()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => {
                    warn!(run_id = %ctx.run_id, "🕷️ [CRAWLER] Deadline reached after {} candidates", tried);
                    errors.push(DEADLINE_EXCEEDED.to_string());
                    break;
                }
            };
            remaining -= 1;
            *tried += 1;

            let doc = match fetched {
                Ok(doc) => doc,
                Err(FetchError::Cancelled { .. }) => return Err(PipelineError::Cancelled),
                Err(e) => {
                    warn!(
                        run_id = %ctx.run_id,
                        event = events::CANDIDATE_FETCH_FAILED,
                        "🕷️ [CRAWLER] {} failed: {}",
                        candidate.url,
                        e
                    );
                    ctx.emit(Event::CandidateTried {
                        run_id: ctx.run_id,
                        url: candidate.url.clone(),
                        outcome: CandidateOutcome::FetchFailed {
                            reason: e.to_string(),
                            attempts: e.attempts(),
                        },
                    });
                    errors.push(e.to_string());
                    continue;
                }
            };

            trace.enter(CrawlState::Scoring);
            let mut candidate = candidate;
            candidate.excerpt = Some(truncate_chars(&doc.text, SCORING_EXCERPT_CHARS));
            if candidate.title.is_empty() {
                candidate.title = doc.title.clone().unwrap_or_default();
            }
            candidate.score = self.scorer.score(&candidate, request);

            if candidate.score >= self.threshold {
                info!(
                    run_id = %ctx.run_id,
                    event = events::CANDIDATE_ACCEPTED,
                    "🕷️ [CRAWLER] Accepted {} (score {:.3}, {} attempts)",
                    candidate.url,
                    candidate.score,
                    doc.attempts
                );
                ctx.emit(Event::CandidateTried {
                    run_id: ctx.run_id,
                    url: candidate.url.clone(),
                    outcome: CandidateOutcome::Accepted {
                        score: candidate.score,
                        fetch_attempts: doc.attempts,
                    },
                });
                trace.enter(CrawlState::Accepted);
                return Ok(accept(candidate, doc.text, doc.fetched_at, doc.attempts));
            }

            info!(
                run_id = %ctx.run_id,
                event = events::CANDIDATE_BELOW_THRESHOLD,
                "🕷️ [CRAWLER] {} scored {:.3}, below {:.2}",
                candidate.url,
                candidate.score,
                self.threshold
            );
            ctx.emit(Event::CandidateTried {
                run_id: ctx.run_id,
                url: candidate.url.clone(),
                outcome: CandidateOutcome::BelowThreshold {
                    score: candidate.score,
                    fetch_attempts: doc.attempts,
                },
            });
            errors.push(format!(
                "{}: score {:.3} below threshold {:.2}",
                candidate.url, candidate.score, self.threshold
            ));
        }

        ctx.check_cancelled()?;
        trace.enter(CrawlState::Exhausted);
        warn!(run_id = %ctx.run_id, "🕷️ [CRAWLER] Exhausted after {} candidates", tried);
        let skip = errors.len().saturating_sub(MAX_REPORTED_ERRORS);
        Err(PipelineError::CrawlFailed {
            tried_candidates: *tried,
            last_errors: errors.into_iter().skip(skip).collect(),
        })
    }
}

fn accept(
    candidate: Candidate,
    text: String,
    fetched_at: chrono::DateTime<chrono::Utc>,
    attempts: u32,
) -> CanonicalSource {
    CanonicalSource {
        url: candidate.url,
        fetched_text: text,
        fetched_at,
        source_score: candidate.score,
        title: candidate.title,
        fetch_attempts: attempts,
    }
}

#[async_trait]
impl SourceStage for CrawlerAgent {
    async fn acquire(
        &self,
        request: &AnalysisRequest,
        ctx: &RunContext,
    ) -> Result<CanonicalSource, PipelineError> {
        self.crawl(request, ctx).await.result
    }
}
