use async_trait::async_trait;
use std::time::Duration;

use super::types::{AnalysisRequest, Candidate, HttpResponse, SearchHit};
use crate::error::{NetworkError, SearchError};

/// External web search.
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, SearchError>;
}

/// External HTTP access. Non-2xx statuses are returned as responses, not errors.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, NetworkError>;

    /// Reachability probe. Defaults to a GET with the body discarded.
    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, NetworkError> {
        self.get(url, timeout).await.map(|r| r.status)
    }
}

/// Relevance/trust score of a candidate for a request, in [0, 1].
///
/// Implementations must be pure: the same inputs always produce the same score.
pub trait RelevanceScorer: Send + Sync {
    fn score(&self, candidate: &Candidate, request: &AnalysisRequest) -> f64;
}
