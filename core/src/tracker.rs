//! Risk analytics tracker — system of record and windowed metrics.
//!
//! The tracker:
//!   1. Records assessments, interventions, outcomes and success stories
//!   2. Computes windowed descriptive metrics directly from the store
//!   3. Surfaces triggered interventions to the optional notifier
//!
//! Writes propagate every store failure — a write that silently appears to
//! succeed is a correctness violation. Read aggregates degrade instead:
//! zeroed counts with the failure recorded in `store_error`.

use crate::{
    clock::Clock,
    config::EngineConfig,
    error::{EngineError, EngineResult},
    model::{
        Intervention, InterventionPayload, InterventionType, Outcome, OutcomeDetails, OutcomeType,
        RiskAssessment, RiskFactors, SuccessStory, TimePeriod,
    },
    notifier::InterventionNotifier,
    store::RiskStore,
    types::RecordId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ── Report types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionMetrics {
    pub time_period: TimePeriod,
    pub users_at_high_risk: i64,
    pub total_assessments: i64,
    pub interventions_triggered: i64,
    pub successful_transitions: i64,
    pub total_resolved_outcomes: i64,
    pub overall_success_rate: f64,
    /// Set when the underlying store failed and the counts are zeroed.
    pub store_error: Option<String>,
}

impl ProtectionMetrics {
    fn zeroed(time_period: TimePeriod, store_error: Option<String>) -> Self {
        Self {
            time_period,
            users_at_high_risk: 0,
            total_assessments: 0,
            interventions_triggered: 0,
            successful_transitions: 0,
            total_resolved_outcomes: 0,
            overall_success_rate: 0.0,
            store_error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionEffectiveness {
    /// Interventions triggered in the window; for the `no_intervention`
    /// bucket, outcomes recorded with no linked intervention.
    pub count: i64,
    pub success_rate: f64,
    pub avg_time_to_role_days: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionEffectivenessReport {
    pub time_period: TimePeriod,
    pub by_type: BTreeMap<String, InterventionEffectiveness>,
    pub store_error: Option<String>,
}

// ── Tracker ──────────────────────────────────────────────────────────────────

pub struct RiskAnalyticsTracker {
    store: RiskStore,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    notifier: Option<Arc<dyn InterventionNotifier>>,
}

impl RiskAnalyticsTracker {
    pub fn new(
        store: RiskStore,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        notifier: Option<Arc<dyn InterventionNotifier>>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            notifier,
        }
    }

    pub(crate) fn store(&self) -> &RiskStore {
        &self.store
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn window_bounds(&self, period: TimePeriod) -> (Option<i64>, i64) {
        let now = self.clock.now();
        let start = period.window_start(now).map(|t| t.timestamp());
        (start, now.timestamp())
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Record a risk assessment. The composite score is always derived here
    /// from the two component scores; confidence is retained verbatim and
    /// only scales the score for ranking (`RiskAssessment::ranking_score`).
    pub fn assess_user_risk(
        &self,
        user_id: &str,
        risk_factors: &RiskFactors,
        industry_risk_score: f64,
        company_risk_score: f64,
        assessment_confidence: f64,
    ) -> EngineResult<RecordId> {
        for (label, score) in [
            ("industry_risk_score", industry_risk_score),
            ("company_risk_score", company_risk_score),
        ] {
            if !(0.0..=100.0).contains(&score) || !score.is_finite() {
                return Err(EngineError::validation(format!(
                    "{label} {score} outside [0, 100]"
                )));
            }
        }
        if !(0.0..=1.0).contains(&assessment_confidence) || !assessment_confidence.is_finite() {
            return Err(EngineError::validation(format!(
                "confidence {assessment_confidence} outside [0, 1]"
            )));
        }

        let composite = 0.5 * industry_risk_score + 0.5 * company_risk_score;
        let id = self.store.insert_assessment(
            user_id,
            risk_factors,
            industry_risk_score,
            company_risk_score,
            composite,
            assessment_confidence,
            self.clock.now(),
        )?;
        log::info!(
            "assessment {id} recorded for user {user_id} (composite={composite:.1})"
        );
        Ok(id)
    }

    /// Record a protective intervention against an existing assessment.
    /// Persists the row, then surfaces it to the notifier — delivery itself
    /// belongs to the embedding process.
    pub fn trigger_intervention(
        &self,
        user_id: &str,
        risk_assessment_id: RecordId,
        intervention_type: InterventionType,
        intervention_data: InterventionPayload,
    ) -> EngineResult<RecordId> {
        let assessment = self
            .store
            .get_assessment(risk_assessment_id)?
            .ok_or_else(|| EngineError::not_found("risk assessment", risk_assessment_id))?;
        if assessment.user_id != user_id {
            // Belongs to another user — indistinguishable from missing.
            return Err(EngineError::not_found("risk assessment", risk_assessment_id));
        }

        let triggered_at = self.clock.now();
        let id = self.store.insert_intervention(
            user_id,
            risk_assessment_id,
            intervention_type,
            &intervention_data,
            triggered_at,
        )?;
        log::info!(
            "intervention {id} ({}) triggered for user {user_id}",
            intervention_type.as_str()
        );

        if let Some(notifier) = &self.notifier {
            notifier.intervention_triggered(&Intervention {
                id,
                user_id: user_id.to_string(),
                risk_assessment_id,
                intervention_type,
                payload: intervention_data,
                triggered_at,
            });
        }
        Ok(id)
    }

    /// Record the real-world resolution of an assessment. Corrections are
    /// new rows, never updates.
    #[allow(clippy::too_many_arguments)]
    pub fn track_career_protection_outcome(
        &self,
        user_id: &str,
        risk_assessment_id: RecordId,
        outcome_type: OutcomeType,
        outcome_details: &OutcomeDetails,
        intervention_id: Option<RecordId>,
        salary_change: Option<f64>,
        time_to_new_role: Option<i64>,
        satisfaction_score: Option<i64>,
        would_recommend: Option<bool>,
    ) -> EngineResult<RecordId> {
        let assessment = self
            .store
            .get_assessment(risk_assessment_id)?
            .ok_or_else(|| EngineError::not_found("risk assessment", risk_assessment_id))?;
        if assessment.user_id != user_id {
            return Err(EngineError::not_found("risk assessment", risk_assessment_id));
        }

        if let Some(iid) = intervention_id {
            let intervention = self
                .store
                .get_intervention(iid)?
                .ok_or_else(|| EngineError::not_found("intervention", iid))?;
            if intervention.risk_assessment_id != risk_assessment_id {
                return Err(EngineError::validation(format!(
                    "intervention {iid} belongs to assessment {}, not {risk_assessment_id}",
                    intervention.risk_assessment_id
                )));
            }
        }

        if let Some(score) = satisfaction_score {
            if !(1..=5).contains(&score) {
                return Err(EngineError::validation(format!(
                    "satisfaction_score {score} outside [1, 5]"
                )));
            }
        }

        let id = self.store.insert_outcome(
            user_id,
            risk_assessment_id,
            intervention_id,
            outcome_type,
            outcome_details,
            salary_change,
            time_to_new_role,
            satisfaction_score,
            would_recommend,
            self.clock.now(),
        )?;
        log::info!(
            "outcome {id} ({}) recorded for user {user_id}",
            outcome_type.as_str()
        );
        Ok(id)
    }

    /// Log a narrative success story. Inputs are snapshotted by value, so
    /// nothing here can be retroactively altered through the source rows.
    #[allow(clippy::too_many_arguments)]
    pub fn log_success_story(
        &self,
        user_id: &str,
        story_type: &str,
        story_title: &str,
        story_description: &str,
        original_risk_factors: &RiskFactors,
        intervention_timeline: &BTreeMap<String, DateTime<Utc>>,
        outcome_details: &OutcomeDetails,
        user_satisfaction: i64,
        would_recommend: bool,
    ) -> EngineResult<RecordId> {
        if story_title.trim().is_empty() {
            return Err(EngineError::validation("story title must not be empty"));
        }
        if !(1..=5).contains(&user_satisfaction) {
            return Err(EngineError::validation(format!(
                "user_satisfaction {user_satisfaction} outside [1, 5]"
            )));
        }

        let id = self.store.insert_story(
            user_id,
            story_type,
            story_title,
            story_description,
            original_risk_factors,
            intervention_timeline,
            outcome_details,
            user_satisfaction,
            would_recommend,
            self.clock.now(),
        )?;
        log::info!("success story {id} logged for user {user_id}");
        Ok(id)
    }

    // ── Point reads ──────────────────────────────────────────────

    pub fn get_assessment(&self, id: RecordId) -> EngineResult<RiskAssessment> {
        self.store
            .get_assessment(id)?
            .ok_or_else(|| EngineError::not_found("risk assessment", id))
    }

    pub fn get_intervention(&self, id: RecordId) -> EngineResult<Intervention> {
        self.store
            .get_intervention(id)?
            .ok_or_else(|| EngineError::not_found("intervention", id))
    }

    pub fn get_outcome(&self, id: RecordId) -> EngineResult<Outcome> {
        self.store
            .get_outcome(id)?
            .ok_or_else(|| EngineError::not_found("outcome", id))
    }

    // ── Windowed metrics ─────────────────────────────────────────

    /// Descriptive protection metrics for one window. All keys are always
    /// present; the success rate uses a `max(1, resolved)` denominator so
    /// an empty store yields 0, never NaN.
    pub fn get_career_protection_metrics(
        &self,
        time_period: &str,
    ) -> EngineResult<ProtectionMetrics> {
        let period = TimePeriod::parse(time_period)?;
        let (start, end) = self.window_bounds(period);

        let computed = (|| -> EngineResult<ProtectionMetrics> {
            let users_at_high_risk =
                self.store
                    .count_high_risk_users(start, end, self.config.high_risk_threshold)?;
            let total_assessments = self.store.count_assessments(start, end)?;
            let interventions_triggered = self.store.count_interventions(start, end)?;

            let mut successful_transitions = 0;
            let mut total_resolved_outcomes = 0;
            for (token, count) in self.store.outcome_counts_by_type(start, end)? {
                let outcome_type = OutcomeType::parse(&token)?;
                if outcome_type == OutcomeType::SuccessfulTransition {
                    successful_transitions = count;
                }
                if outcome_type.is_resolved() {
                    total_resolved_outcomes += count;
                }
            }
            let overall_success_rate =
                successful_transitions as f64 / total_resolved_outcomes.max(1) as f64;

            Ok(ProtectionMetrics {
                time_period: period,
                users_at_high_risk,
                total_assessments,
                interventions_triggered,
                successful_transitions,
                total_resolved_outcomes,
                overall_success_rate,
                store_error: None,
            })
        })();

        match computed {
            Ok(metrics) => Ok(metrics),
            Err(e) if e.is_store_error() => {
                log::warn!("protection metrics degraded ({period:?}): {e}");
                Ok(ProtectionMetrics::zeroed(period, Some(e.to_string())))
            }
            Err(e) => Err(e),
        }
    }

    /// Per-intervention-type effectiveness. Outcomes recorded with no
    /// intervention land in a synthetic `no_intervention` bucket for
    /// comparison.
    pub fn get_intervention_effectiveness(
        &self,
        time_period: &str,
    ) -> EngineResult<InterventionEffectivenessReport> {
        let period = TimePeriod::parse(time_period)?;
        let (start, end) = self.window_bounds(period);

        let computed = (|| -> EngineResult<BTreeMap<String, InterventionEffectiveness>> {
            let mut by_type = BTreeMap::new();

            let stats = self.store.outcome_stats_by_intervention_bucket(start, end)?;
            for bucket in &stats {
                // Only the synthetic bucket counts outcomes; real types are
                // counted by their in-window triggers below.
                let count = if bucket.bucket == "no_intervention" {
                    bucket.total
                } else {
                    0
                };
                by_type.insert(
                    bucket.bucket.clone(),
                    InterventionEffectiveness {
                        count,
                        success_rate: bucket.successes as f64 / bucket.resolved.max(1) as f64,
                        avg_time_to_role_days: bucket.avg_time_to_role_days,
                    },
                );
            }

            // Triggered interventions define the count for real types, even
            // before any outcome lands.
            for (token, count) in self.store.intervention_counts_by_type(start, end)? {
                by_type
                    .entry(token)
                    .and_modify(|e| e.count = count)
                    .or_insert(InterventionEffectiveness {
                        count,
                        success_rate: 0.0,
                        avg_time_to_role_days: None,
                    });
            }

            Ok(by_type)
        })();

        match computed {
            Ok(by_type) => Ok(InterventionEffectivenessReport {
                time_period: period,
                by_type,
                store_error: None,
            }),
            Err(e) if e.is_store_error() => {
                log::warn!("intervention effectiveness degraded ({period:?}): {e}");
                Ok(InterventionEffectivenessReport {
                    time_period: period,
                    by_type: BTreeMap::new(),
                    store_error: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Most recent stories first, capped at `limit`.
    pub fn get_risk_success_stories(&self, limit: i64) -> EngineResult<Vec<SuccessStory>> {
        if limit <= 0 {
            return Err(EngineError::validation(format!(
                "story limit {limit} must be positive"
            )));
        }
        self.store.recent_stories(limit)
    }
}
