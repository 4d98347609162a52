use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::constants::api::{
    DEFAULT_FINISHED_RUN_TTL_SECS, DEFAULT_MAX_FINISHED_RUNS, RETENTION_CEILING_DAYS,
};
use crate::crawler::types::AnalysisRequest;
use crate::pipeline::{
    Artifacts, CancelToken, PipelineCoordinator, PipelineErrorView, PipelineRun, RunState,
    StageStatus,
};

/// A submitted run: its latest snapshot and the token that cancels it.
pub struct RunHandle {
    pub snapshot: watch::Receiver<PipelineRun>,
    pub cancel: CancelToken,
}

pub struct AppState {
    pub coordinator: Arc<PipelineCoordinator>,
    pub runs: DashMap<Uuid, RunHandle>,
    finished_ttl: Duration,
    max_finished: usize,
}

impl AppState {
    pub fn new(coordinator: Arc<PipelineCoordinator>) -> Self {
        Self {
            coordinator,
            runs: DashMap::new(),
            finished_ttl: Duration::from_secs(DEFAULT_FINISHED_RUN_TTL_SECS),
            max_finished: DEFAULT_MAX_FINISHED_RUNS,
        }
    }

    /// How long finished runs stay inspectable, and how many are kept at most.
    pub fn with_retention(mut self, finished_ttl: Duration, max_finished: usize) -> Self {
        self.finished_ttl = finished_ttl;
        self.max_finished = max_finished;
        self
    }

    /// Drop finished runs past their TTL, then the oldest ones over the cap.
    /// Running runs are never dropped.
    pub fn prune_finished(&self) -> usize {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.finished_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(RETENTION_CEILING_DAYS));

        let mut finished: Vec<(Uuid, DateTime<Utc>)> = self
            .runs
            .iter()
            .filter_map(|entry| {
                let run = entry.value().snapshot.borrow();
                match (run.is_finished(), run.finished_at) {
                    (true, Some(at)) => Some((*entry.key(), at)),
                    _ => None,
                }
            })
            .collect();
        // oldest first
        finished.sort_by_key(|(_, at)| *at);

        let expired = finished.iter().take_while(|(_, at)| now - *at >= ttl).count();
        let over_cap = finished.len().saturating_sub(self.max_finished);
        let evict = expired.max(over_cap);
        for (id, _) in &finished[..evict] {
            self.runs.remove(id);
        }
        if evict > 0 {
            debug!("Evicted {} finished runs ({} tracked)", evict, self.runs.len());
        }
        evict
    }

    /// Register a run and start it in the background.
    pub fn submit(self: &Arc<Self>, request: AnalysisRequest) -> Uuid {
        self.prune_finished();
        let run = PipelineRun::new(request);
        let run_id = run.id;
        let cancel = CancelToken::new();
        let (tx, rx) = watch::channel(run.clone());
        self.runs.insert(
            run_id,
            RunHandle {
                snapshot: rx,
                cancel: cancel.clone(),
            },
        );

        let coordinator = self.coordinator.clone();
        tokio::spawn(async move {
            coordinator.execute(run, cancel, Some(&tx)).await;
        });
        run_id
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/runs", post(submit_run))
        .route("/runs/{id}", get(get_run))
        .route("/runs/{id}/cancel", post(cancel_run))
        .with_state(state)
}

pub async fn run_server(state: Arc<AppState>, bind_addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("API Server listening on {}", bind_addr);
    axum::serve(listener, router(state)).await
}

#[derive(Deserialize)]
struct SubmitRun {
    input: String,
}

/// What `GET /runs/{id}` returns. Artifacts are only shown once the run is over.
#[derive(Serialize)]
struct RunView {
    id: Uuid,
    request: AnalysisRequest,
    state: RunState,
    stage_statuses: Vec<StageStatus>,
    error: Option<PipelineErrorView>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifacts: Option<Artifacts>,
}

impl From<PipelineRun> for RunView {
    fn from(run: PipelineRun) -> Self {
        let finished = run.is_finished();
        Self {
            id: run.id,
            request: run.request,
            state: run.state,
            stage_statuses: run.stage_statuses,
            error: run.error,
            created_at: run.created_at,
            finished_at: run.finished_at,
            artifacts: finished.then_some(run.artifacts),
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({"status": "ok", "runs": state.runs.len()}))
}

async fn submit_run(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitRun>,
) -> impl IntoResponse {
    match AnalysisRequest::parse(&body.input) {
        Ok(request) => {
            let run_id = state.submit(request);
            info!(run_id = %run_id, "Run submitted for '{}'", body.input.trim());
            (StatusCode::ACCEPTED, Json(json!({"run_id": run_id}))).into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))).into_response(),
    }
}

async fn get_run(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let Some(handle) = state.runs.get(&id) else {
        return not_found(id);
    };
    let run = handle.snapshot.borrow().clone();
    Json(RunView::from(run)).into_response()
}

async fn cancel_run(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let Some(handle) = state.runs.get(&id) else {
        return not_found(id);
    };
    let state_now = handle.snapshot.borrow().state;
    if state_now != RunState::Running {
        return (
            StatusCode::CONFLICT,
            Json(json!({"run_id": id, "state": state_now, "error": "run already finished"})),
        )
            .into_response();
    }
    handle.cancel.cancel();
    info!(run_id = %id, "Cancellation requested");
    (
        StatusCode::ACCEPTED,
        Json(json!({"run_id": id, "state": "cancelling"})),
    )
        .into_response()
}

fn not_found(id: Uuid) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("run {} not found", id)})),
    )
        .into_response()
}
