use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineAsset {
    pub asset: String,
    pub indication: String,
    pub phase: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deal {
    pub partner: String,
    pub deal_type: String,
    pub summary: String,
}

/// Output of the analysis stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisReport {
    pub company: String,
    pub source_url: String,
    pub summary: String,
    pub therapeutic_areas: Vec<String>,
    pub mechanisms_of_action: Vec<String>,
    pub pipeline: Vec<PipelineAsset>,
    pub deals: Vec<Deal>,
    pub competitors: Vec<String>,
    pub key_trends: Vec<String>,
    pub risk_factors: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityCategory {
    HighPotential,
    ModeratePotential,
    HighRisk,
}

impl OpportunityCategory {
    pub fn label(&self) -> &'static str {
        match self {
            OpportunityCategory::HighPotential => "high potential",
            OpportunityCategory::ModeratePotential => "moderate potential",
            OpportunityCategory::HighRisk => "high risk",
        }
    }
}

/// Deterministic rating of the opportunity behind an analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpportunityAssessment {
    pub score: u32,
    pub category: OpportunityCategory,
    pub factors: Vec<String>,
    pub market_size_bn: f64,
    pub growth_rate_pct: f64,
}

/// Output of the advisory stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub assessment: OpportunityAssessment,
    pub executive_summary: String,
    pub immediate_actions: Vec<String>,
    pub market_entry: Vec<String>,
    pub risk_mitigation: Vec<String>,
    pub value_creation: Vec<String>,
    pub generated_at: DateTime<Utc>,
}
