use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::artifacts::{AnalysisReport, OpportunityAssessment, OpportunityCategory, Recommendation};
use super::parse::parse_model_json;
use super::Agent;
use crate::config::LlmConfig;
use crate::constants::advisor::*;
use crate::constants::market::AREA_PROFILES;
use crate::crawler::types::CanonicalSource;
use crate::error::PipelineError;
use crate::llm::{GenerationOptions, Priority, TextGenerator};
use crate::pipeline::{AdvisoryStage, RunContext};

/// Rate an analysis on market size, growth, pipeline depth and competition.
pub fn assess_opportunity(analysis: &AnalysisReport) -> OpportunityAssessment {
    let profiles: Vec<(f64, f64)> = analysis
        .therapeutic_areas
        .iter()
        .filter_map(|area| {
            AREA_PROFILES
                .iter()
                .find(|(name, _, _)| name.eq_ignore_ascii_case(area.trim()))
                .map(|(_, size, growth)| (*size, *growth))
        })
        .collect();
    let market_size_bn: f64 = profiles.iter().map(|(size, _)| size).sum();
    let growth_rate_pct = if profiles.is_empty() {
        0.0
    } else {
        profiles.iter().map(|(_, g)| g).sum::<f64>() / profiles.len() as f64
    };

    let mut score = 0;
    let mut factors = Vec::new();
    let mut band = |points: u32, factor: &str| {
        score += points;
        factors.push(factor.to_string());
    };

    if market_size_bn > LARGE_MARKET_BN {
        band(3, "Large market opportunity");
    } else if market_size_bn > MODERATE_MARKET_BN {
        band(2, "Moderate market opportunity");
    } else {
        band(1, "Niche market opportunity");
    }

    if growth_rate_pct > HIGH_GROWTH_PCT {
        band(3, "High growth potential");
    } else if growth_rate_pct > MODERATE_GROWTH_PCT {
        band(2, "Moderate growth potential");
    } else {
        band(1, "Stable market");
    }

    let assets = analysis.pipeline.len();
    if assets > STRONG_PIPELINE {
        band(3, "Strong pipeline");
    } else if assets > MODERATE_PIPELINE {
        band(2, "Moderate pipeline");
    } else {
        band(1, "Limited pipeline");
    }

    let competitors = analysis.competitors.len();
    if competitors < LIMITED_COMPETITION {
        band(3, "Limited competition");
    } else if competitors < MODERATE_COMPETITION {
        band(2, "Moderate competition");
    } else {
        band(1, "High competition");
    }

    let category = if score >= HIGH_POTENTIAL_SCORE {
        OpportunityCategory::HighPotential
    } else if score >= MODERATE_POTENTIAL_SCORE {
        OpportunityCategory::ModeratePotential
    } else {
        OpportunityCategory::HighRisk
    };

    OpportunityAssessment {
        score,
        category,
        factors,
        market_size_bn,
        growth_rate_pct,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AdvisorOutput {
    executive_summary: String,
    immediate_actions: Vec<String>,
    market_entry: Vec<String>,
    risk_mitigation: Vec<String>,
    value_creation: Vec<String>,
}

fn or_playbook(items: Vec<String>, playbook: &[&str]) -> Vec<String> {
    let items: Vec<String> = items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        playbook.iter().take(1).map(|s| s.to_string()).collect()
    } else {
        items
    }
}

pub struct AdvisorAgent {
    llm: Arc<dyn TextGenerator>,
    options: GenerationOptions,
}

impl AdvisorAgent {
    pub fn new(llm: Arc<dyn TextGenerator>, config: &LlmConfig) -> Self {
        Self {
            llm,
            options: GenerationOptions::from_config(config, Priority::High),
        }
    }

    fn build_query(
        &self,
        analysis: &AnalysisReport,
        assessment: &OpportunityAssessment,
        source: &CanonicalSource,
    ) -> Result<String, PipelineError> {
        let analysis_json = serde_json::to_string_pretty(analysis)
            .map_err(|e| PipelineError::generation(self.name(), e.to_string()))?;
        Ok(format!(
            "Company: {company}\nSource: {url}\n\n\
             Opportunity assessment: {category} (score {score}/12)\nFactors: {factors}\n\n\
             Analysis:\n{analysis}",
            company = analysis.company,
            url = source.url,
            category = assessment.category.label(),
            score = assessment.score,
            factors = assessment.factors.join("; "),
            analysis = analysis_json,
        ))
    }
}

impl Agent for AdvisorAgent {
    fn name(&self) -> &str {
        "Advisor-Agent"
    }

    fn system_prompt(&self) -> &str {
        r#"You are a strategic advisor to a pharma business development team. You receive a structured analysis of a life-sciences company and a pre-computed opportunity assessment.

Write concise, actionable recommendations consistent with the assessment category. Do not invent facts beyond the analysis.

Output MUST be a valid JSON object with the following structure:
{
    "executive_summary": "Three to five sentences for a BD executive",
    "immediate_actions": ["Action", ...],
    "market_entry": ["Strategy", ...],
    "risk_mitigation": ["Step", ...],
    "value_creation": ["Lever", ...]
}
"#
    }
}

#[async_trait]
impl AdvisoryStage for AdvisorAgent {
    async fn advise(
        &self,
        analysis: &AnalysisReport,
        source: &CanonicalSource,
        ctx: &RunContext,
    ) -> Result<Recommendation, PipelineError> {
        ctx.check_cancelled()?;
        let assessment = assess_opportunity(analysis);
        info!(
            run_id = %ctx.run_id,
            "🤖 [AGENT] {} assessed {} as {} (score {})",
            self.name(),
            analysis.company,
            assessment.category.label(),
            assessment.score
        );
        let query = self.build_query(analysis, &assessment, source)?;

        let response = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(PipelineError::Cancelled),
            r = self.run(&query, self.llm.as_ref(), &self.options) => r,
        };
        let response = response.map_err(|e| PipelineError::generation(self.name(), e.to_string()))?;

        let output: AdvisorOutput = parse_model_json(&response).map_err(|reason| {
            warn!(run_id = %ctx.run_id, "🤖 [AGENT] {} returned unusable output: {}", self.name(), reason);
            PipelineError::generation(self.name(), reason)
        })?;
        if output.executive_summary.trim().is_empty() {
            return Err(PipelineError::generation(
                self.name(),
                "recommendation has no executive summary",
            ));
        }

        Ok(Recommendation {
            assessment,
            executive_summary: output.executive_summary.trim().to_string(),
            immediate_actions: or_playbook(output.immediate_actions, IMMEDIATE_ACTIONS),
            market_entry: or_playbook(output.market_entry, MARKET_ENTRY),
            risk_mitigation: or_playbook(output.risk_mitigation, RISK_MITIGATION),
            value_creation: or_playbook(output.value_creation, VALUE_CREATION),
            generated_at: Utc::now(),
        })
    }
}
