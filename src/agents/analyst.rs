use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::artifacts::{AnalysisReport, Deal, PipelineAsset};
use super::extract::{extract_deals, extract_pipeline, identify_risks, identify_trends};
use super::parse::parse_model_json;
use super::Agent;
use crate::config::LlmConfig;
use crate::constants::llm::MAX_PROMPT_SOURCE_CHARS;
use crate::constants::signals::{DEAL_TYPES, MECHANISMS, THERAPEUTIC_AREAS};
use crate::crawler::normalize::truncate_chars;
use crate::crawler::types::{AnalysisRequest, CanonicalSource, RequestKind};
use crate::error::PipelineError;
use crate::llm::{GenerationOptions, Priority, TextGenerator};
use crate::pipeline::{AnalysisStage, RunContext};

/// Keyword signals found in a source document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectedSignals {
    pub therapeutic_areas: Vec<String>,
    pub mechanisms: Vec<String>,
    pub deal_types: Vec<String>,
}

pub fn detect_signals(text: &str) -> DetectedSignals {
    let lower = text.to_lowercase();
    let matching = |table: &[(&str, &[&str])]| -> Vec<String> {
        table
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(label, _)| label.to_string())
            .collect()
    };
    DetectedSignals {
        therapeutic_areas: matching(THERAPEUTIC_AREAS),
        mechanisms: matching(MECHANISMS),
        deal_types: matching(DEAL_TYPES),
    }
}

/// Shape the model is asked to return.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnalystOutput {
    company: String,
    summary: String,
    therapeutic_areas: Vec<String>,
    mechanisms_of_action: Vec<String>,
    pipeline: Vec<PipelineAsset>,
    deals: Vec<Deal>,
    competitors: Vec<String>,
    key_trends: Vec<String>,
    risk_factors: Vec<String>,
}

pub struct AnalystAgent {
    llm: Arc<dyn TextGenerator>,
    options: GenerationOptions,
}

impl AnalystAgent {
    pub fn new(llm: Arc<dyn TextGenerator>, config: &LlmConfig) -> Self {
        Self {
            llm,
            options: GenerationOptions::from_config(config, Priority::Normal),
        }
    }

    fn build_query(&self, request: &AnalysisRequest, source: &CanonicalSource) -> String {
        let signals = detect_signals(&source.fetched_text);
        let subject = match request.kind {
            RequestKind::CompanyName => format!("Company: {}", request.value.trim()),
            RequestKind::PressReleaseUrl => "Company: identify from the source".to_string(),
        };
        let list = |items: &[String]| {
            if items.is_empty() {
                "none detected".to_string()
            } else {
                items.join(", ")
            }
        };

        format!(
            "{subject}\nSource: {url}\nTitle: {title}\n\n\
             Keyword signals:\n- Therapeutic areas: {areas}\n- Mechanisms: {moas}\n- Deal types: {deals}\n\n\
             Source text:\n{text}",
            subject = subject,
            url = source.url,
            title = source.title,
            areas = list(&signals.therapeutic_areas),
            moas = list(&signals.mechanisms),
            deals = list(&signals.deal_types),
            text = truncate_chars(&source.fetched_text, MAX_PROMPT_SOURCE_CHARS),
        )
    }

    fn build_report(
        &self,
        output: AnalystOutput,
        request: &AnalysisRequest,
        source: &CanonicalSource,
    ) -> Result<AnalysisReport, PipelineError> {
        if output.summary.trim().is_empty() {
            return Err(PipelineError::generation(self.name(), "analysis has no summary"));
        }

        let company = if !output.company.trim().is_empty() {
            output.company.trim().to_string()
        } else if request.kind == RequestKind::CompanyName {
            request.value.trim().to_string()
        } else {
            String::new()
        };

        let text = &source.fetched_text;
        let signals = detect_signals(text);
        fn or_detected<T>(from_model: Vec<T>, detect: impl FnOnce() -> Vec<T>) -> Vec<T> {
            if from_model.is_empty() {
                detect()
            } else {
                from_model
            }
        }

        Ok(AnalysisReport {
            source_url: source.url.clone(),
            summary: output.summary.trim().to_string(),
            therapeutic_areas: or_detected(output.therapeutic_areas, || signals.therapeutic_areas),
            mechanisms_of_action: or_detected(output.mechanisms_of_action, || signals.mechanisms),
            pipeline: or_detected(output.pipeline, || extract_pipeline(text)),
            deals: or_detected(output.deals, || extract_deals(text, &company)),
            competitors: output.competitors,
            key_trends: or_detected(output.key_trends, || identify_trends(text)),
            risk_factors: or_detected(output.risk_factors, || identify_risks(text)),
            company,
        })
    }
}

impl Agent for AnalystAgent {
    fn name(&self) -> &str {
        "Analyst-Agent"
    }

    fn system_prompt(&self) -> &str {
        r#"You are a life-sciences business development analyst. You read one press release or news article about a biotech or pharma company and extract a structured analysis.

Use only facts stated in the source text. Keyword signals are hints, not facts. If something is not mentioned, leave the list empty.

Output MUST be a valid JSON object with the following structure:
{
    "company": "Company name",
    "summary": "Two to four sentences on what was announced and why it matters",
    "therapeutic_areas": ["Oncology", ...],
    "mechanisms_of_action": ["Monoclonal Antibody", ...],
    "pipeline": [{"asset": "AC-101", "indication": "NSCLC", "phase": "Phase 2"}],
    "deals": [{"partner": "Partner name", "deal_type": "Licensing", "summary": "Terms in one sentence"}],
    "competitors": ["Company name", ...],
    "key_trends": ["Trend", ...],
    "risk_factors": ["Risk", ...]
}
"#
    }
}

#[async_trait]
impl AnalysisStage for AnalystAgent {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
        source: &CanonicalSource,
        ctx: &RunContext,
    ) -> Result<AnalysisReport, PipelineError> {
        ctx.check_cancelled()?;
        let query = self.build_query(request, source);

        let response = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(PipelineError::Cancelled),
            r = self.run(&query, self.llm.as_ref(), &self.options) => r,
        };
        let response = response.map_err(|e| PipelineError::generation(self.name(), e.to_string()))?;

        let output: AnalystOutput = parse_model_json(&response).map_err(|reason| {
            warn!(run_id = %ctx.run_id, "🤖 [AGENT] {} returned unusable output: {}", self.name(), reason);
            PipelineError::generation(self.name(), reason)
        })?;

        let report = self.build_report(output, request, source)?;
        info!(
            run_id = %ctx.run_id,
            "🤖 [AGENT] {} produced analysis: {} areas, {} pipeline assets, {} deals",
            self.name(),
            report.therapeutic_areas.len(),
            report.pipeline.len(),
            report.deals.len()
        );
        Ok(report)
    }
}
