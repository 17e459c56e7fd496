//! Data model — assessments, interventions, outcomes, stories, forecasts.
//!
//! Free-form payloads are schemas: a small fixed set of recognized keys plus
//! an explicit `extra` bag, so structural validation can reject malformed
//! input without freezing the forward-compatible fields.

use crate::error::{EngineError, EngineResult};
use crate::types::{RecordId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Enum tokens ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionType {
    EarlyWarning,
    Coaching,
    Referral,
    MonitoringOnly,
}

impl InterventionType {
    pub fn as_str(self) -> &'static str {
        match self {
            InterventionType::EarlyWarning => "early_warning",
            InterventionType::Coaching => "coaching",
            InterventionType::Referral => "referral",
            InterventionType::MonitoringOnly => "monitoring_only",
        }
    }

    pub fn parse(token: &str) -> EngineResult<Self> {
        match token {
            "early_warning" => Ok(InterventionType::EarlyWarning),
            "coaching" => Ok(InterventionType::Coaching),
            "referral" => Ok(InterventionType::Referral),
            "monitoring_only" => Ok(InterventionType::MonitoringOnly),
            other => Err(EngineError::validation(format!(
                "unknown intervention type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeType {
    SuccessfulTransition,
    Unemployment,
    NoActionNeeded,
    Unresolved,
}

impl OutcomeType {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeType::SuccessfulTransition => "successful_transition",
            OutcomeType::Unemployment => "unemployment",
            OutcomeType::NoActionNeeded => "no_action_needed",
            OutcomeType::Unresolved => "unresolved",
        }
    }

    pub fn parse(token: &str) -> EngineResult<Self> {
        match token {
            "successful_transition" => Ok(OutcomeType::SuccessfulTransition),
            "unemployment" => Ok(OutcomeType::Unemployment),
            "no_action_needed" => Ok(OutcomeType::NoActionNeeded),
            "unresolved" => Ok(OutcomeType::Unresolved),
            other => Err(EngineError::validation(format!(
                "unknown outcome type '{other}'"
            ))),
        }
    }

    /// Unresolved outcomes don't count toward success-rate denominators.
    pub fn is_resolved(self) -> bool {
        !matches!(self, OutcomeType::Unresolved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastType {
    IndustryRisk,
    CompanyRisk,
    UserRisk,
}

impl ForecastType {
    pub fn as_str(self) -> &'static str {
        match self {
            ForecastType::IndustryRisk => "industry_risk",
            ForecastType::CompanyRisk => "company_risk",
            ForecastType::UserRisk => "user_risk",
        }
    }

    pub fn parse(token: &str) -> EngineResult<Self> {
        match token {
            "industry_risk" => Ok(ForecastType::IndustryRisk),
            "company_risk" => Ok(ForecastType::CompanyRisk),
            "user_risk" => Ok(ForecastType::UserRisk),
            other => Err(EngineError::validation(format!(
                "unknown forecast type '{other}'"
            ))),
        }
    }
}

/// Windows accepted at every metrics boundary. Unknown tokens fail fast —
/// never a silent default window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePeriod {
    Last7Days,
    Last30Days,
    Last90Days,
    AllTime,
}

impl TimePeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            TimePeriod::Last7Days => "last_7_days",
            TimePeriod::Last30Days => "last_30_days",
            TimePeriod::Last90Days => "last_90_days",
            TimePeriod::AllTime => "all_time",
        }
    }

    pub fn parse(token: &str) -> EngineResult<Self> {
        match token {
            "last_7_days" => Ok(TimePeriod::Last7Days),
            "last_30_days" => Ok(TimePeriod::Last30Days),
            "last_90_days" => Ok(TimePeriod::Last90Days),
            "all_time" => Ok(TimePeriod::AllTime),
            other => Err(EngineError::validation(format!(
                "unknown time period token '{other}'"
            ))),
        }
    }

    /// Start of the `[window_start, now)` interval. `None` means unbounded.
    pub fn window_start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = match self {
            TimePeriod::Last7Days => 7,
            TimePeriod::Last30Days => 30,
            TimePeriod::Last90Days => 90,
            TimePeriod::AllTime => return None,
        };
        Some(now - chrono::Duration::days(days))
    }
}

// ── Structured payloads ──────────────────────────────────────────────────────

/// Named risk indicators for one assessment. Fixed flags are the signals the
/// scoring and pattern detection understand; `extra` carries anything a
/// caller attaches beyond them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    #[serde(default)]
    pub industry_volatility: bool,
    #[serde(default)]
    pub company_layoffs: bool,
    #[serde(default)]
    pub role_automation: bool,
    #[serde(default)]
    pub skills_gap: bool,

    /// Grouping metadata for heat maps and entity forecasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RiskFactors {
    /// Active indicator names, sorted. Extra keys count when their value is
    /// boolean `true`, so caller-defined flags participate in pattern
    /// detection.
    pub fn active_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.industry_volatility {
            flags.push("industry_volatility".to_string());
        }
        if self.company_layoffs {
            flags.push("company_layoffs".to_string());
        }
        if self.role_automation {
            flags.push("role_automation".to_string());
        }
        if self.skills_gap {
            flags.push("skills_gap".to_string());
        }
        for (key, value) in &self.extra {
            if value == &serde_json::Value::Bool(true) {
                flags.push(key.clone());
            }
        }
        flags.sort();
        flags
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterventionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

// ── Records ──────────────────────────────────────────────────────────────────

/// One evaluation of a user's employment risk. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: RecordId,
    pub user_id: UserId,
    pub risk_factors: RiskFactors,
    pub industry_risk_score: f64,
    pub company_risk_score: f64,
    /// Derived — always recomputed from the two component scores, never
    /// accepted from a caller.
    pub composite_risk_score: f64,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// Confidence-scaled score for ranking. The stored composite and
    /// confidence stay verbatim; scaling happens only here.
    pub fn ranking_score(&self) -> f64 {
        self.composite_risk_score * self.confidence
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intervention {
    pub id: RecordId,
    pub user_id: UserId,
    pub risk_assessment_id: RecordId,
    pub intervention_type: InterventionType,
    pub payload: InterventionPayload,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub id: RecordId,
    pub user_id: UserId,
    pub risk_assessment_id: RecordId,
    pub intervention_id: Option<RecordId>,
    pub outcome_type: OutcomeType,
    pub details: OutcomeDetails,
    pub salary_change: Option<f64>,
    pub time_to_new_role_days: Option<i64>,
    pub satisfaction_score: Option<i64>,
    pub would_recommend: Option<bool>,
    pub recorded_at: DateTime<Utc>,
}

/// Narrative record of a favorable outcome. Snapshots its inputs by value:
/// later changes to the source assessment never alter a published story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessStory {
    pub id: RecordId,
    pub user_id: UserId,
    pub story_type: String,
    pub title: String,
    pub description: String,
    pub original_risk_factors: RiskFactors,
    pub intervention_timeline: BTreeMap<String, DateTime<Utc>>,
    pub outcome_details: OutcomeDetails,
    pub user_satisfaction: i64,
    pub would_recommend: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub id: RecordId,
    pub forecast_type: ForecastType,
    pub target_entity: String,
    pub horizon_days: i64,
    pub predicted_score: f64,
    pub confidence_low: f64,
    pub confidence_high: f64,
    pub generated_at: DateTime<Utc>,
    /// Filled in later for accuracy back-testing.
    pub realized_outcome: Option<f64>,
}
