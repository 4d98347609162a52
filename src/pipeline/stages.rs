use async_trait::async_trait;
use uuid::Uuid;

use super::cancel::CancelToken;
use crate::agents::artifacts::{AnalysisReport, Recommendation};
use crate::bus::EventBus;
use crate::crawler::types::{AnalysisRequest, CanonicalSource};
use crate::error::PipelineError;
use crate::events::Event;

/// Per-run handles passed to every stage.
#[derive(Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub bus: EventBus,
    pub cancel: CancelToken,
}

impl RunContext {
    pub fn new(run_id: Uuid, bus: EventBus, cancel: CancelToken) -> Self {
        Self { run_id, bus, cancel }
    }

    pub fn emit(&self, event: Event) {
        self.bus.emit(event);
    }

    pub fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Stage 1: request → accepted source document.
#[async_trait]
pub trait SourceStage: Send + Sync {
    async fn acquire(
        &self,
        request: &AnalysisRequest,
        ctx: &RunContext,
    ) -> Result<CanonicalSource, PipelineError>;
}

/// Stage 2: source document → structured analysis.
#[async_trait]
pub trait AnalysisStage: Send + Sync {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
        source: &CanonicalSource,
        ctx: &RunContext,
    ) -> Result<AnalysisReport, PipelineError>;
}

/// Stage 3: analysis → recommendation.
#[async_trait]
pub trait AdvisoryStage: Send + Sync {
    async fn advise(
        &self,
        analysis: &AnalysisReport,
        source: &CanonicalSource,
        ctx: &RunContext,
    ) -> Result<Recommendation, PipelineError>;
}
