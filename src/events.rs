use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::{RunState, Stage, StageState};

/// Emitted on every stage state transition of a run.
#[derive(Clone, Debug, Serialize)]
pub struct ProgressEvent {
    pub run_id: Uuid,
    pub stage: Stage,
    pub state: StageState,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn now(run_id: Uuid, stage: Stage, state: StageState) -> Self {
        Self {
            run_id,
            stage,
            state,
            timestamp: Utc::now(),
        }
    }
}

/// What happened to one candidate during a crawl.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Accepted { score: f64, fetch_attempts: u32 },
    BelowThreshold { score: f64, fetch_attempts: u32 },
    FetchFailed { reason: String, attempts: u32 },
}

// Global Event Enum
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Stage(ProgressEvent),
    Searching {
        run_id: Uuid,
        queries_attempted: usize,
        candidates_found: usize,
    },
    CandidateTried {
        run_id: Uuid,
        url: String,
        outcome: CandidateOutcome,
    },
    RunFinished {
        run_id: Uuid,
        state: RunState,
        error: Option<String>,
    },
}

impl Event {
    pub fn run_id(&self) -> Uuid {
        match self {
            Event::Stage(p) => p.run_id,
            Event::Searching { run_id, .. }
            | Event::CandidateTried { run_id, .. }
            | Event::RunFinished { run_id, .. } => *run_id,
        }
    }
}
