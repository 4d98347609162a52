//! MarketPulse - life-sciences opportunity analysis pipeline
//!
//! Resolves a company name or press-release URL into a trustworthy source
//! document, then runs it through analysis and advisory agents, publishing
//! progress on an event bus.

pub mod agents;
pub mod api;
pub mod bus;
pub mod config;
pub mod constants;
pub mod crawler;
pub mod error;
pub mod events;
pub mod llm;
pub mod pipeline;
pub mod services;

// Re-export commonly used types
pub use bus::EventBus;
pub use config::AppConfig;
pub use crawler::types::{AnalysisRequest, CanonicalSource, RequestKind};
pub use error::PipelineError;
pub use events::{CandidateOutcome, Event, ProgressEvent};
pub use pipeline::{CancelToken, PipelineCoordinator, PipelineRun, RunState, Stage, StageState};

#[cfg(test)]
mod bus_tests;
#[cfg(test)]
mod events_tests;
