//! Named success rates — a pure-formula layer over tracker data.
//!
//! Stores nothing of its own: every rate is recomputed from the tracker's
//! store on each call, so two calls with no intervening writes return
//! identical results. Denominators are always guarded with `max(1, _)`.

use crate::{
    error::EngineResult,
    model::TimePeriod,
    tracker::RiskAnalyticsTracker,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CareerProtectionRates {
    pub success_rate: f64,
    pub early_warning_accuracy: f64,
    pub intervention_effectiveness: f64,
    pub income_protection_rate: f64,
    pub unemployment_prevention_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserJourneyAnalytics {
    pub total_assessments: i64,
    pub assessed_users: i64,
    pub high_risk_users: i64,
    pub interventions_triggered: i64,
    pub avg_time_to_new_role_days: Option<f64>,
    pub avg_satisfaction: Option<f64>,
}

/// The single aggregate the dashboard consumes. Every key is present even
/// when all underlying counts are zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessMetricsReport {
    pub time_period: TimePeriod,
    pub career_protection_metrics: CareerProtectionRates,
    pub user_journey_analytics: UserJourneyAnalytics,
    pub store_error: Option<String>,
}

pub struct SuccessMetrics {
    tracker: RiskAnalyticsTracker,
}

impl SuccessMetrics {
    pub fn new(tracker: RiskAnalyticsTracker) -> Self {
        Self { tracker }
    }

    pub fn tracker(&self) -> &RiskAnalyticsTracker {
        &self.tracker
    }

    fn window_bounds(&self, period: TimePeriod) -> (Option<i64>, i64) {
        let now = self.tracker.clock().now();
        (
            period.window_start(now).map(|t| t.timestamp()),
            now.timestamp(),
        )
    }

    /// Successful transitions over resolved outcomes in the window.
    pub fn career_protection_success_rate(&self, time_period: &str) -> EngineResult<f64> {
        Ok(self
            .tracker
            .get_career_protection_metrics(time_period)?
            .overall_success_rate)
    }

    /// Fraction of early-warning interventions whose linked outcome is a
    /// successful transition.
    pub fn early_warning_accuracy(&self, time_period: &str) -> EngineResult<f64> {
        let period = TimePeriod::parse(time_period)?;
        let (start, end) = self.window_bounds(period);
        let (total, successes) = self.tracker.store().early_warning_counts(start, end)?;
        Ok(successes as f64 / total.max(1) as f64)
    }

    /// Tracker's per-type effectiveness collapsed to one scalar: the
    /// count-weighted mean success rate across real intervention types.
    pub fn risk_intervention_effectiveness(&self, time_period: &str) -> EngineResult<f64> {
        let report = self.tracker.get_intervention_effectiveness(time_period)?;
        let mut weighted = 0.0;
        let mut total = 0i64;
        for (bucket, stats) in &report.by_type {
            if bucket == "no_intervention" {
                continue;
            }
            weighted += stats.success_rate * stats.count as f64;
            total += stats.count;
        }
        Ok(weighted / total.max(1) as f64)
    }

    /// Fraction of successful transitions with a non-negative salary change.
    pub fn income_protection_rate(&self, time_period: &str) -> EngineResult<f64> {
        let period = TimePeriod::parse(time_period)?;
        let (start, end) = self.window_bounds(period);
        let (successes, protected) = self
            .tracker
            .store()
            .income_protection_counts(start, end)?;
        Ok(protected as f64 / successes.max(1) as f64)
    }

    /// Fraction of high-risk assessments that did not resolve to
    /// unemployment.
    pub fn unemployment_prevention_rate(&self, time_period: &str) -> EngineResult<f64> {
        let period = TimePeriod::parse(time_period)?;
        let (start, end) = self.window_bounds(period);
        let threshold = self.tracker.config().high_risk_threshold;
        let store = self.tracker.store();

        let high_risk = store.count_high_risk_assessments(start, end, threshold)?;
        let unemployed = store.count_high_risk_unemployed(start, end, threshold)?;
        Ok((high_risk - unemployed) as f64 / high_risk.max(1) as f64)
    }

    /// The aggregate: all named rates plus journey analytics in one shape.
    pub fn get_risk_based_success_metrics(
        &self,
        time_period: &str,
    ) -> EngineResult<SuccessMetricsReport> {
        let period = TimePeriod::parse(time_period)?;
        let token = period.as_str();

        let computed = (|| -> EngineResult<SuccessMetricsReport> {
            let rates = CareerProtectionRates {
                success_rate: self.career_protection_success_rate(token)?,
                early_warning_accuracy: self.early_warning_accuracy(token)?,
                intervention_effectiveness: self.risk_intervention_effectiveness(token)?,
                income_protection_rate: self.income_protection_rate(token)?,
                unemployment_prevention_rate: self.unemployment_prevention_rate(token)?,
            };

            let (start, end) = self.window_bounds(period);
            let store = self.tracker.store();
            let journey = UserJourneyAnalytics {
                total_assessments: store.count_assessments(start, end)?,
                assessed_users: store.count_assessed_users(start, end)?,
                high_risk_users: store.count_high_risk_users(
                    start,
                    end,
                    self.tracker.config().high_risk_threshold,
                )?,
                interventions_triggered: store.count_interventions(start, end)?,
                avg_time_to_new_role_days: store.avg_time_to_new_role(start, end)?,
                avg_satisfaction: store.avg_satisfaction(start, end)?,
            };

            Ok(SuccessMetricsReport {
                time_period: period,
                career_protection_metrics: rates,
                user_journey_analytics: journey,
                store_error: None,
            })
        })();

        match computed {
            Ok(report) => Ok(report),
            Err(e) if e.is_store_error() => {
                log::warn!("success metrics degraded ({period:?}): {e}");
                Ok(SuccessMetricsReport {
                    time_period: period,
                    career_protection_metrics: CareerProtectionRates {
                        success_rate: 0.0,
                        early_warning_accuracy: 0.0,
                        intervention_effectiveness: 0.0,
                        income_protection_rate: 0.0,
                        unemployment_prevention_rate: 0.0,
                    },
                    user_journey_analytics: UserJourneyAnalytics {
                        total_assessments: 0,
                        assessed_users: 0,
                        high_risk_users: 0,
                        interventions_triggered: 0,
                        avg_time_to_new_role_days: None,
                        avg_satisfaction: None,
                    },
                    store_error: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }
}
