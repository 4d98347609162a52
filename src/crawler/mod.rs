//! Discovery stage: resolve a request into one trustworthy source document.

pub mod agent;
pub mod fetch;
pub mod normalize;
pub mod resolver;
pub mod robots;
pub mod scorer;
pub mod search;
pub mod traits;
pub mod types;

pub use agent::{CrawlOutcome, CrawlState, CrawlerAgent};
pub use fetch::{FetchRetrier, FetchedDocument, ReqwestFetcher, RetryPolicy, RetryState};
pub use resolver::SourceResolver;
pub use robots::RobotsCache;
pub use scorer::CandidateScorer;
pub use search::HttpSearchClient;
pub use traits::{HttpFetch, RelevanceScorer, SearchApi};
pub use types::{AnalysisRequest, Candidate, CanonicalSource, HttpResponse, RequestKind, SearchHit};

#[cfg(test)]
mod agent_tests;
