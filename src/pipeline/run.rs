use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::agents::artifacts::{AnalysisReport, Recommendation};
use crate::crawler::types::{AnalysisRequest, CanonicalSource};
use crate::error::PipelineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Crawl,
    Analyze,
    Advise,
}

impl Stage {
    /// Execution order of a run.
    pub const ORDER: [Stage; 3] = [Stage::Crawl, Stage::Analyze, Stage::Advise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Crawl => "crawl",
            Stage::Analyze => "analyze",
            Stage::Advise => "advise",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Pending → Running → Succeeded | Failed`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageState::Succeeded | StageState::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Clone, Debug, Serialize)]
pub struct StageStatus {
    pub stage: Stage,
    pub state: StageState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl StageStatus {
    fn pending(stage: Stage) -> Self {
        Self {
            stage,
            state: StageState::Pending,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Artifacts {
    pub source: Option<CanonicalSource>,
    pub analysis: Option<AnalysisReport>,
    pub recommendation: Option<Recommendation>,
}

/// The single mutable object of a pipeline run, owned by the coordinator.
#[derive(Clone, Debug, Serialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub request: AnalysisRequest,
    pub stage_statuses: Vec<StageStatus>,
    pub artifacts: Artifacts,
    pub state: RunState,
    pub error: Option<PipelineErrorView>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Serializable view of the error that ended a run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineErrorView {
    pub stage: Stage,
    pub message: String,
    #[serde(skip)]
    pub error: Option<PipelineError>,
}

impl PipelineRun {
    pub fn new(request: AnalysisRequest) -> Self {
        Self::with_id(Uuid::new_v4(), request)
    }

    pub fn with_id(id: Uuid, request: AnalysisRequest) -> Self {
        Self {
            id,
            request,
            stage_statuses: Stage::ORDER.iter().map(|s| StageStatus::pending(*s)).collect(),
            artifacts: Artifacts::default(),
            state: RunState::Running,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn status(&self, stage: Stage) -> &StageStatus {
        // stage_statuses always holds one entry per Stage::ORDER element
        let idx = Stage::ORDER.iter().position(|s| *s == stage).unwrap_or(0);
        &self.stage_statuses[idx]
    }

    pub fn stage_state(&self, stage: Stage) -> StageState {
        self.status(stage).state
    }

    fn status_mut(&mut self, stage: Stage) -> &mut StageStatus {
        let idx = Stage::ORDER.iter().position(|s| *s == stage).unwrap_or(0);
        &mut self.stage_statuses[idx]
    }

    pub(crate) fn mark_running(&mut self, stage: Stage) {
        let status = self.status_mut(stage);
        status.state = StageState::Running;
        status.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_succeeded(&mut self, stage: Stage) {
        let status = self.status_mut(stage);
        status.state = StageState::Succeeded;
        status.finished_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, stage: Stage, error: PipelineError) {
        let message = error.to_string();
        {
            let status = self.status_mut(stage);
            status.state = StageState::Failed;
            status.finished_at = Some(Utc::now());
            status.error = Some(message.clone());
        }
        self.state = if error == PipelineError::Cancelled {
            RunState::Cancelled
        } else {
            RunState::Failed
        };
        self.error = Some(PipelineErrorView {
            stage,
            message,
            error: Some(error),
        });
        self.finished_at = Some(Utc::now());
    }

    /// End the run before `stage` started. The stage stays `Pending`.
    pub(crate) fn mark_aborted(&mut self, stage: Stage, error: PipelineError) {
        self.state = if error == PipelineError::Cancelled {
            RunState::Cancelled
        } else {
            RunState::Failed
        };
        self.error = Some(PipelineErrorView {
            stage,
            message: error.to_string(),
            error: Some(error),
        });
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn mark_succeeded_run(&mut self) {
        self.state = RunState::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    /// Whether `stage` may start: every earlier stage succeeded with its artifact present.
    pub fn precondition_met(&self, stage: Stage) -> bool {
        match stage {
            Stage::Crawl => true,
            Stage::Analyze => {
                self.stage_state(Stage::Crawl) == StageState::Succeeded
                    && self.artifacts.source.is_some()
            }
            Stage::Advise => {
                self.precondition_met(Stage::Analyze)
                    && self.stage_state(Stage::Analyze) == StageState::Succeeded
                    && self.artifacts.analysis.is_some()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state != RunState::Running
    }

    pub fn failure(&self) -> Option<&PipelineError> {
        self.error.as_ref().and_then(|e| e.error.as_ref())
    }
}
