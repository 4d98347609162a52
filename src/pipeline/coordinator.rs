use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::cancel::CancelToken;
use super::run::{PipelineRun, RunState, Stage, StageState};
use super::stages::{AdvisoryStage, AnalysisStage, RunContext, SourceStage};
use crate::bus::EventBus;
use crate::constants::events;
use crate::crawler::types::AnalysisRequest;
use crate::error::PipelineError;
use crate::events::{Event, ProgressEvent};

/// Where a run stopped early.
enum Halt {
    /// The stage never started (cancelled or precondition not met).
    Before(Stage, PipelineError),
    /// The stage ran and failed.
    During(Stage, PipelineError),
}

/// Runs crawl → analyze → advise strictly in order.
pub struct PipelineCoordinator {
    source: Arc<dyn SourceStage>,
    analyst: Arc<dyn AnalysisStage>,
    advisor: Arc<dyn AdvisoryStage>,
    bus: EventBus,
}

impl PipelineCoordinator {
    pub fn new(
        source: Arc<dyn SourceStage>,
        analyst: Arc<dyn AnalysisStage>,
        advisor: Arc<dyn AdvisoryStage>,
        bus: EventBus,
    ) -> Self {
        Self {
            source,
            analyst,
            advisor,
            bus,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Run a fresh pipeline for `request` to completion.
    pub async fn run(&self, request: AnalysisRequest, cancel: CancelToken) -> PipelineRun {
        self.execute(PipelineRun::new(request), cancel, None).await
    }

    /// Drive `run` to a terminal state. When `snapshot` is given, every transition
    /// is mirrored into it for readers that poll the run.
    pub async fn execute(
        &self,
        mut run: PipelineRun,
        cancel: CancelToken,
        snapshot: Option<&watch::Sender<PipelineRun>>,
    ) -> PipelineRun {
        let ctx = RunContext::new(run.id, self.bus.clone(), cancel);
        info!(
            run_id = %run.id,
            "🧭 [PIPELINE] Starting run for {:?} '{}'",
            run.request.kind,
            run.request.value
        );

        match self.drive(&mut run, &ctx, snapshot).await {
            Ok(()) => {
                run.mark_succeeded_run();
                info!(run_id = %run.id, "🧭 [PIPELINE] Run succeeded");
            }
            Err(Halt::Before(stage, err)) => {
                warn!(run_id = %run.id, stage = %stage, "🧭 [PIPELINE] Run stopped before {}: {}", stage, err);
                run.mark_aborted(stage, err);
            }
            Err(Halt::During(stage, err)) => {
                error!(run_id = %run.id, stage = %stage, "🧭 [PIPELINE] Stage {} failed: {}", stage, err);
                run.mark_failed(stage, err);
                self.transition(&run, stage, &ctx, snapshot);
            }
        }

        ctx.emit(Event::RunFinished {
            run_id: run.id,
            state: run.state,
            error: run.error.as_ref().map(|e| e.message.clone()),
        });
        if let Some(tx) = snapshot {
            tx.send_replace(run.clone());
        }
        run
    }

    async fn drive(
        &self,
        run: &mut PipelineRun,
        ctx: &RunContext,
        snapshot: Option<&watch::Sender<PipelineRun>>,
    ) -> Result<(), Halt> {
        self.enter(run, Stage::Crawl, ctx, snapshot)?;
        let source = self
            .source
            .acquire(&run.request, ctx)
            .await
            .map_err(|e| Halt::During(Stage::Crawl, e))?;
        run.artifacts.source = Some(source);
        self.complete(run, Stage::Crawl, ctx, snapshot);

        self.enter(run, Stage::Analyze, ctx, snapshot)?;
        let analysis = match run.artifacts.source.as_ref() {
            Some(source) => self.analyst.analyze(&run.request, source, ctx).await,
            None => Err(missing_artifact(Stage::Analyze)),
        }
        .map_err(|e| Halt::During(Stage::Analyze, e))?;
        run.artifacts.analysis = Some(analysis);
        self.complete(run, Stage::Analyze, ctx, snapshot);

        self.enter(run, Stage::Advise, ctx, snapshot)?;
        let recommendation = match (run.artifacts.analysis.as_ref(), run.artifacts.source.as_ref()) {
            (Some(analysis), Some(source)) => self.advisor.advise(analysis, source, ctx).await,
            _ => Err(missing_artifact(Stage::Advise)),
        }
        .map_err(|e| Halt::During(Stage::Advise, e))?;
        run.artifacts.recommendation = Some(recommendation);
        self.complete(run, Stage::Advise, ctx, snapshot);

        Ok(())
    }

    fn enter(
        &self,
        run: &mut PipelineRun,
        stage: Stage,
        ctx: &RunContext,
        snapshot: Option<&watch::Sender<PipelineRun>>,
    ) -> Result<(), Halt> {
        ctx.check_cancelled().map_err(|e| Halt::Before(stage, e))?;
        if !run.precondition_met(stage) {
            return Err(Halt::Before(stage, missing_artifact(stage)));
        }
        run.mark_running(stage);
        self.transition(run, stage, ctx, snapshot);
        Ok(())
    }

    fn complete(
        &self,
        run: &mut PipelineRun,
        stage: Stage,
        ctx: &RunContext,
        snapshot: Option<&watch::Sender<PipelineRun>>,
    ) {
        run.mark_succeeded(stage);
        self.transition(run, stage, ctx, snapshot);
    }

    fn transition(
        &self,
        run: &PipelineRun,
        stage: Stage,
        ctx: &RunContext,
        snapshot: Option<&watch::Sender<PipelineRun>>,
    ) {
        let state = run.stage_state(stage);
        info!(
            run_id = %run.id,
            event = events::STAGE_TRANSITION,
            stage = %stage,
            "🧭 [PIPELINE] {} → {:?}",
            stage,
            state
        );
        ctx.emit(Event::Stage(ProgressEvent::now(run.id, stage, state)));
        if let Some(tx) = snapshot {
            tx.send_replace(run.clone());
        }
    }
}

fn missing_artifact(stage: Stage) -> PipelineError {
    PipelineError::InvalidInput {
        reason: format!("{} requires the previous stage's artifact", stage),
    }
}

/// Whether `run` ended with every stage succeeded.
pub fn is_complete(run: &PipelineRun) -> bool {
    run.state == RunState::Succeeded
        && run
            .stage_statuses
            .iter()
            .all(|s| s.state == StageState::Succeeded)
}
