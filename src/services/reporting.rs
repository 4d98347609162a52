use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    bus::EventBus,
    error::ReportError,
    events::{CandidateOutcome, Event},
    pipeline::{PipelineRun, RunState, StageState},
};

/// One line of the progress log.
#[derive(Clone, Debug, Serialize)]
pub struct ProgressLogEntry<'a> {
    pub ts: String,
    pub event: &'a Event,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTally {
    pub finished: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,

    pub candidates_tried: u64,
    pub candidates_accepted: u64,
    pub candidates_below_threshold: u64,
    pub candidates_failed: u64,

    /// Failed stage transitions per stage name
    pub stage_failures: HashMap<String, u64>,
}

#[derive(Clone)]
pub struct RunReporter {
    tally: Arc<Mutex<RunTally>>,
    log_path: PathBuf,
    /// Finished runs whose tally has been flushed
    flushed: Arc<watch::Sender<u64>>,
}

impl RunReporter {
    pub fn new(log_path: PathBuf) -> Self {
        Self {
            tally: Arc::new(Mutex::new(RunTally::default())),
            log_path,
            flushed: Arc::new(watch::channel(0).0),
        }
    }

    /// Wait until `runs` finished runs have been logged and flushed.
    /// Returns false if that does not happen within `timeout`.
    pub async fn wait_flushed(&self, runs: u64, timeout: Duration) -> bool {
        let mut rx = self.flushed.subscribe();
        let flushed = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|n| *n >= runs)).await,
            Ok(Ok(_))
        );
        flushed
    }

    pub fn tally(&self) -> RunTally {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunTally> {
        // a poisoned tally is still a valid tally
        self.tally.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Log every bus event until the bus closes.
    pub fn start(&self, event_bus: &EventBus) -> JoinHandle<()> {
        let mut rx = event_bus.subscribe();
        let reporter = self.clone();

        tokio::spawn(async move {
            info!("📈 RunReporter started (log: {})", reporter.log_path.display());
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        reporter.on_event(&event);
                        if matches!(event, Event::RunFinished { .. }) {
                            if let Err(e) = reporter.flush_tally() {
                                error!("RunReporter failed to flush tally: {}", e);
                            }
                            reporter.flushed.send_modify(|n| *n += 1);
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("RunReporter lagged, {} events not logged", skipped);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn on_event(&self, event: &Event) {
        {
            let mut t = self.lock();
            match event {
                Event::CandidateTried { outcome, .. } => {
                    t.candidates_tried += 1;
                    match outcome {
                        CandidateOutcome::Accepted { .. } => t.candidates_accepted += 1,
                        CandidateOutcome::BelowThreshold { .. } => t.candidates_below_threshold += 1,
                        CandidateOutcome::FetchFailed { .. } => t.candidates_failed += 1,
                    }
                }
                Event::Stage(p) if p.state == StageState::Failed => {
                    *t.stage_failures.entry(p.stage.as_str().to_string()).or_insert(0) += 1;
                }
                Event::RunFinished { state, .. } => {
                    t.finished += 1;
                    match state {
                        RunState::Succeeded => t.succeeded += 1,
                        RunState::Failed => t.failed += 1,
                        RunState::Cancelled => t.cancelled += 1,
                        RunState::Running => {}
                    }
                }
                _ => {}
            }
        }

        if let Err(e) = self.append_jsonl(event) {
            error!("RunReporter failed to append progress log: {}", e);
        }
    }

    fn append_jsonl(&self, event: &Event) -> Result<(), ReportError> {
        use std::io::Write;

        let io_err = |source: std::io::Error| ReportError::Io {
            path: self.log_path.display().to_string(),
            source,
        };
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(io_err)?;

        let line = serde_json::to_string(&ProgressLogEntry {
            ts: Utc::now().to_rfc3339(),
            event,
        })?;
        writeln!(f, "{}", line).map_err(io_err)?;
        Ok(())
    }

    pub fn summary_path(&self) -> PathBuf {
        self.log_path.with_file_name("run_summary.json")
    }

    fn flush_tally(&self) -> Result<(), ReportError> {
        let path = self.summary_path();
        let body = serde_json::to_vec_pretty(&self.tally())?;
        write_file(&path, &body)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub format: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReportDocument<'a> {
    pub report: &'a PipelineRun,
    pub metadata: ReportMetadata,
}

/// Executive one-pager drawn from a finished run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportSummary {
    pub company: String,
    pub source_url: String,
    pub executive_summary: String,
    pub therapeutic_areas: Vec<String>,
    pub mechanisms_of_action: Vec<String>,
    pub opportunity: String,
    pub key_risks: Vec<String>,
    pub next_steps: Vec<String>,
}

/// `None` unless the run produced every artifact.
pub fn summarize(run: &PipelineRun) -> Option<ReportSummary> {
    let source = run.artifacts.source.as_ref()?;
    let analysis = run.artifacts.analysis.as_ref()?;
    let rec = run.artifacts.recommendation.as_ref()?;
    Some(ReportSummary {
        company: analysis.company.clone(),
        source_url: source.url.clone(),
        executive_summary: rec.executive_summary.clone(),
        therapeutic_areas: analysis.therapeutic_areas.clone(),
        mechanisms_of_action: analysis.mechanisms_of_action.clone(),
        opportunity: format!(
            "{} (score {})",
            rec.assessment.category.label(),
            rec.assessment.score
        ),
        key_risks: analysis.risk_factors.clone(),
        next_steps: rec.immediate_actions.clone(),
    })
}

/// Write `{report, metadata}` JSON for `run` to `path`, creating parent directories.
pub fn save_report(run: &PipelineRun, path: &Path) -> Result<(), ReportError> {
    let doc = ReportDocument {
        report: run,
        metadata: ReportMetadata {
            generated_at: Utc::now(),
            format: "json".to_string(),
        },
    };
    let body = serde_json::to_vec_pretty(&doc)?;
    write_file(path, &body)?;
    info!(run_id = %run.id, "📄 Report saved to {}", path.display());
    Ok(())
}

/// `<dir>/<subject>_analysis_<YYYYmmdd_HHMMSS>.json`
pub fn default_report_path(dir: &Path, run: &PipelineRun) -> PathBuf {
    let subject = run
        .artifacts
        .analysis
        .as_ref()
        .map(|a| a.company.clone())
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| run.request.value.clone());
    let slug: String = subject
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .take(6)
        .collect::<Vec<_>>()
        .join("_");
    let slug = if slug.is_empty() { "report".to_string() } else { slug };
    dir.join(format!(
        "{}_analysis_{}.json",
        slug,
        run.created_at.format("%Y%m%d_%H%M%S")
    ))
}

fn write_file(path: &Path, body: &[u8]) -> Result<(), ReportError> {
    let io_err = |source: std::io::Error| ReportError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, body).map_err(io_err)
}
