//! Success dashboard — concurrent orchestration and presentation shaping.
//!
//! The only component that runs operations in parallel. Each fan-out branch
//! gets its own store connection (`RiskStore::reopen`) and runs on the
//! blocking pool under its own timeout; a branch's failure or timeout lands
//! in that branch's section and never aborts the others.
//!
//! Plain `:memory:` stores reopen as isolated databases — callers wanting a
//! shared in-memory dashboard must open a `file:...?mode=memory&cache=shared`
//! URI.

use crate::{
    clock::Clock,
    config::EngineConfig,
    error::{EngineError, EngineResult},
    model::TimePeriod,
    predictive::{ForecastAccuracy, RiskPredictiveAnalytics},
    store::RiskStore,
    success_metrics::{SuccessMetrics, SuccessMetricsReport},
    tracker::{ProtectionMetrics, RiskAnalyticsTracker},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const SECS_PER_DAY: i64 = 86_400;

// ── Section results ──────────────────────────────────────────────────────────

/// Outcome of one fan-out branch. Errors are captured per branch, never
/// rethrown across the join.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Section<T> {
    Ok { data: T },
    Failed { error: String },
    TimedOut,
}

impl<T> Section<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Section::Ok { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Section::Ok { data } => Some(data),
            _ => None,
        }
    }

    fn failure(&self) -> Option<String> {
        match self {
            Section::Ok { .. } => None,
            Section::Failed { error } => Some(error.clone()),
            Section::TimedOut => Some("timed_out".to_string()),
        }
    }
}

/// Run one branch on the blocking pool under its own timeout.
async fn run_section<T, F>(timeout: Duration, task: F) -> Section<T>
where
    T: Send + 'static,
    F: FnOnce() -> EngineResult<T> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(task)).await {
        Err(_) => Section::TimedOut,
        Ok(Err(join_err)) => Section::Failed {
            error: join_err.to_string(),
        },
        Ok(Ok(Err(e))) => Section::Failed {
            error: e.to_string(),
        },
        Ok(Ok(Ok(data))) => Section::Ok { data },
    }
}

// ── Report shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CareerProtectionReport {
    pub report_generated_at: DateTime<Utc>,
    pub time_period: TimePeriod,
    pub protection_effectiveness: Section<ProtectionMetrics>,
    pub forecast_accuracy: Section<ForecastAccuracy>,
    pub success_metrics: Section<SuccessMetricsReport>,
    /// True when at least one section failed or timed out.
    pub partial: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoiAnalysis {
    pub generated_at: DateTime<Utc>,
    pub interventions_delivered: i64,
    pub intervention_cost_baseline: f64,
    pub estimated_savings: f64,
    pub roi_ratio: f64,
    pub income_protection_rate: f64,
    pub unemployment_prevention_rate: f64,
    pub partial: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndustryHeatCell {
    pub industry: String,
    pub risk_score: f64,
    pub sample_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskHeatMapView {
    pub lookback_days: i64,
    pub industries: Vec<IndustryHeatCell>,
    pub store_error: Option<String>,
}

// ── Dashboard ────────────────────────────────────────────────────────────────

pub struct RiskSuccessDashboard {
    store: RiskStore,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl RiskSuccessDashboard {
    pub fn new(store: RiskStore, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    fn branch_timeout(&self) -> Duration {
        Duration::from_millis(self.config.dashboard_timeout_ms)
    }

    fn tracker_branch(&self) -> EngineResult<RiskAnalyticsTracker> {
        Ok(RiskAnalyticsTracker::new(
            self.store.reopen()?,
            Arc::clone(&self.clock),
            self.config.clone(),
            None,
        ))
    }

    fn predictive_branch(&self) -> EngineResult<RiskPredictiveAnalytics> {
        Ok(RiskPredictiveAnalytics::new(
            self.store.reopen()?,
            Arc::clone(&self.clock),
            self.config.clone(),
        ))
    }

    /// The lookback fed to forecast back-testing when a report window is
    /// unbounded.
    fn accuracy_lookback(period: TimePeriod) -> i64 {
        match period {
            TimePeriod::Last7Days => 7,
            TimePeriod::Last30Days => 30,
            TimePeriod::Last90Days => 90,
            TimePeriod::AllTime => 3_650,
        }
    }

    /// Assemble the full report: tracker metrics, forecast accuracy and the
    /// success aggregate, fanned out concurrently. A failing branch is
    /// reported in its own section and flips `partial`.
    pub async fn generate_career_protection_report(
        &self,
        time_period: &str,
    ) -> EngineResult<CareerProtectionReport> {
        let period = TimePeriod::parse(time_period)?;
        let token = period.as_str();
        let timeout = self.branch_timeout();

        let tracker = self.tracker_branch()?;
        let predictive = self.predictive_branch()?;
        let metrics = SuccessMetrics::new(self.tracker_branch()?);

        let (protection, accuracy, success) = tokio::join!(
            run_section(timeout, move || tracker
                .get_career_protection_metrics(token)),
            run_section(timeout, move || predictive
                .get_forecast_accuracy_metrics(Self::accuracy_lookback(period))),
            run_section(timeout, move || metrics
                .get_risk_based_success_metrics(token)),
        );

        let partial = !(protection.is_ok() && accuracy.is_ok() && success.is_ok());
        if partial {
            log::warn!("career protection report for {token} is partial");
        }

        Ok(CareerProtectionReport {
            report_generated_at: self.clock.now(),
            time_period: period,
            protection_effectiveness: protection,
            forecast_accuracy: accuracy,
            success_metrics: success,
            partial,
        })
    }

    /// Estimate the dollar-value return of running interventions. Failed
    /// branches contribute zeroed inputs and are listed in `errors`.
    pub async fn generate_roi_analysis(&self) -> EngineResult<RoiAnalysis> {
        let timeout = self.branch_timeout();
        let now = self.clock.now();
        let threshold = self.config.high_risk_threshold;

        let metrics = SuccessMetrics::new(self.tracker_branch()?);
        let intervention_store = self.store.reopen()?;
        let assessment_store = self.store.reopen()?;
        let now_ts = now.timestamp();

        let (success, interventions, high_risk) = tokio::join!(
            run_section(timeout, move || metrics
                .get_risk_based_success_metrics("all_time")),
            run_section(timeout, move || intervention_store
                .count_interventions(None, now_ts)),
            run_section(timeout, move || assessment_store
                .count_high_risk_assessments(None, now_ts, threshold)),
        );

        let errors: Vec<String> = [
            success.failure(),
            interventions.failure(),
            high_risk.failure(),
        ]
        .into_iter()
        .flatten()
        .collect();
        let partial = !errors.is_empty();

        let (income_rate, prevention_rate) = success
            .data()
            .map(|r| {
                (
                    r.career_protection_metrics.income_protection_rate,
                    r.career_protection_metrics.unemployment_prevention_rate,
                )
            })
            .unwrap_or((0.0, 0.0));
        let interventions_delivered = interventions.data().copied().unwrap_or(0);
        let high_risk_count = high_risk.data().copied().unwrap_or(0);

        let intervention_cost_baseline =
            interventions_delivered as f64 * self.config.cost_per_intervention;
        let prevented = (high_risk_count as f64 * prevention_rate).round();
        let estimated_savings = prevented * self.config.avg_unemployment_loss;
        let roi_ratio = estimated_savings / intervention_cost_baseline.max(1.0);

        Ok(RoiAnalysis {
            generated_at: now,
            interventions_delivered,
            intervention_cost_baseline,
            estimated_savings,
            roi_ratio,
            income_protection_rate: income_rate,
            unemployment_prevention_rate: prevention_rate,
            partial,
            errors,
        })
    }

    /// Reshape the predictive heat map for UI consumption: a flat industry
    /// list, riskiest first.
    pub fn get_risk_heat_map(&self, lookback_days: i64) -> EngineResult<RiskHeatMapView> {
        let heat_map = self
            .predictive_branch()?
            .generate_market_risk_heat_map(lookback_days)?;

        let mut industries: Vec<IndustryHeatCell> = heat_map
            .industries
            .into_iter()
            .map(|(industry, cell)| IndustryHeatCell {
                industry,
                risk_score: cell.avg_composite_score,
                sample_count: cell.sample_count,
            })
            .collect();
        industries.sort_by(|a, b| {
            b.risk_score
                .total_cmp(&a.risk_score)
                .then_with(|| a.industry.cmp(&b.industry))
        });

        Ok(RiskHeatMapView {
            lookback_days,
            industries,
            store_error: heat_map.store_error,
        })
    }

    /// Rolling success rate per day over the lookback. Days with no resolved
    /// outcomes inside their rolling window report 0.
    pub fn get_protection_success_trends(
        &self,
        lookback_days: i64,
    ) -> EngineResult<BTreeMap<NaiveDate, f64>> {
        if lookback_days <= 0 {
            return Err(EngineError::validation(format!(
                "lookback {lookback_days} must be positive"
            )));
        }

        let now = self.clock.now().timestamp();
        let start = now - lookback_days * SECS_PER_DAY;
        let window = self.config.trend_window_days.max(1);

        // Pull the rolling window's lead-in too, so early days in the
        // lookback see outcomes just before it.
        let buckets = self
            .store
            .daily_outcome_buckets(Some(start - window * SECS_PER_DAY), now)?;
        let by_day: BTreeMap<i64, (i64, i64)> = buckets
            .into_iter()
            .map(|(day, resolved, successes)| (day, (resolved, successes)))
            .collect();

        let first_day = start / SECS_PER_DAY;
        let last_day = now / SECS_PER_DAY;
        let mut trends = BTreeMap::new();
        for day in first_day..=last_day {
            let mut resolved = 0;
            let mut successes = 0;
            for d in (day - window + 1)..=day {
                if let Some((r, s)) = by_day.get(&d) {
                    resolved += r;
                    successes += s;
                }
            }
            let date = DateTime::from_timestamp(day * SECS_PER_DAY, 0)
                .unwrap_or(DateTime::UNIX_EPOCH)
                .date_naive();
            trends.insert(date, successes as f64 / resolved.max(1) as f64);
        }
        Ok(trends)
    }
}
