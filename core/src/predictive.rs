//! Predictive analytics — forward projection and pattern discovery.
//!
//! This component:
//!   1. Generates entity risk forecasts by linear trend extrapolation
//!   2. Flags rising co-occurring risk-factor combinations as emerging
//!   3. Projects per-user risk trajectories
//!   4. Builds the industry heat map
//!   5. Back-tests matured forecasts against realized outcomes
//!
//! Read-only with respect to assessments and outcomes; owns forecast rows.
//! Trend method is least-squares linear extrapolation over the most recent
//! sample — the simplest compliant choice; no trained model is involved.

use crate::{
    clock::Clock,
    config::EngineConfig,
    error::{EngineError, EngineResult},
    model::{Forecast, ForecastType},
    store::RiskStore,
    types::RecordId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Midpoint of the [0, 100] score scale. Sparse trajectories sit here, and
/// directional accuracy is judged against it.
pub const NEUTRAL_SCORE: f64 = 50.0;

const SECS_PER_DAY: i64 = 86_400;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergingPattern {
    /// Sorted active flags joined with `+`, e.g. `company_layoffs+skills_gap`.
    pub factor_combination: String,
    pub frequency: i64,
    /// Second-half frequency over first-half frequency; > 1 means rising.
    pub trend: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRiskTrajectory {
    pub user_id: String,
    pub current_score: f64,
    /// Day offset (1-based) → projected composite score.
    pub projected_scores_by_day: BTreeMap<i64, f64>,
    pub trend_direction: TrendDirection,
    /// Set when history is too thin to trend; the trajectory is then flat.
    pub insufficient_history: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustryRiskSummary {
    pub avg_composite_score: f64,
    pub sample_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRiskHeatMap {
    pub lookback_days: i64,
    pub industries: BTreeMap<String, IndustryRiskSummary>,
    pub store_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastAccuracy {
    pub mean_absolute_error: f64,
    /// Fraction of matured forecasts where prediction and realization fell
    /// on the same side of the neutral midpoint.
    pub directional_accuracy: f64,
    pub sample_size: i64,
    pub store_error: Option<String>,
}

impl ForecastAccuracy {
    fn zeroed(store_error: Option<String>) -> Self {
        Self {
            mean_absolute_error: 0.0,
            directional_accuracy: 0.0,
            sample_size: 0,
            store_error,
        }
    }
}

// ── Trend math ───────────────────────────────────────────────────────────────

/// Least-squares fit over (unix-seconds, score) points. Returns
/// (slope per day, intercept at the first point's time, residual stddev).
fn linear_trend(points: &[(i64, f64)]) -> (f64, f64, f64) {
    let n = points.len() as f64;
    let t0 = points[0].0;
    let xs: Vec<f64> = points
        .iter()
        .map(|(t, _)| (t - t0) as f64 / SECS_PER_DAY as f64)
        .collect();
    let ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();

    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    let sxy: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();

    // All points at the same instant: no usable slope.
    let slope = if sxx > f64::EPSILON { sxy / sxx } else { 0.0 };
    let intercept = mean_y - slope * mean_x;

    let sse: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (y - (intercept + slope * x)).powi(2))
        .sum();
    let stddev = if points.len() > 2 {
        (sse / (n - 2.0)).sqrt()
    } else {
        (sse / n).sqrt()
    };

    (slope, intercept, stddev)
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

// ── Component ────────────────────────────────────────────────────────────────

pub struct RiskPredictiveAnalytics {
    store: RiskStore,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl RiskPredictiveAnalytics {
    pub fn new(store: RiskStore, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Configured sample floor, never below 1: the trend math needs at
    /// least one point.
    fn min_forecast_samples(&self) -> usize {
        self.config.min_forecast_samples.max(1)
    }

    /// Generate and persist one forecast per target entity. Sparse history
    /// never fails — it yields the maximal (least confident) interval.
    pub fn generate_risk_forecasts(
        &self,
        forecast_type: ForecastType,
        target_entities: &[String],
        forecast_horizon_days: i64,
    ) -> EngineResult<Vec<Forecast>> {
        if forecast_horizon_days <= 0 {
            return Err(EngineError::validation(format!(
                "forecast horizon {forecast_horizon_days} must be positive"
            )));
        }

        let now = self.clock.now();
        let mut forecasts = Vec::with_capacity(target_entities.len());

        for entity in target_entities {
            let history = match forecast_type {
                ForecastType::UserRisk => self
                    .store
                    .user_score_history(entity, self.config.trend_sample_size)?,
                ForecastType::IndustryRisk => self
                    .store
                    .industry_score_history(entity, self.config.trend_sample_size)?,
                ForecastType::CompanyRisk => self
                    .store
                    .company_score_history(entity, self.config.trend_sample_size)?,
            };

            let (predicted, low, high) =
                self.extrapolate(&history, now.timestamp(), forecast_horizon_days);

            let id = self.store.insert_forecast(
                forecast_type,
                entity,
                forecast_horizon_days,
                predicted,
                low,
                high,
                now,
            )?;
            log::debug!(
                "forecast {id} for {} '{entity}': {predicted:.1} [{low:.1}, {high:.1}] \
                 over {forecast_horizon_days}d ({} samples)",
                forecast_type.as_str(),
                history.len(),
            );

            forecasts.push(Forecast {
                id,
                forecast_type,
                target_entity: entity.clone(),
                horizon_days: forecast_horizon_days,
                predicted_score: predicted,
                confidence_low: low,
                confidence_high: high,
                generated_at: now,
                realized_outcome: None,
            });
        }

        Ok(forecasts)
    }

    /// (predicted, low, high) for one entity's history. The interval width
    /// grows with historical variance and shrinks with sample size.
    fn extrapolate(&self, history: &[(i64, f64)], now: i64, horizon_days: i64) -> (f64, f64, f64) {
        if history.len() < self.min_forecast_samples() {
            let predicted = history.last().map_or(NEUTRAL_SCORE, |(_, s)| *s);
            return (clamp_score(predicted), 0.0, 100.0);
        }

        let (slope, intercept, stddev) = linear_trend(history);
        let t0 = history[0].0;
        let target_x = (now + horizon_days * SECS_PER_DAY - t0) as f64 / SECS_PER_DAY as f64;
        let predicted = clamp_score(intercept + slope * target_x);

        let half_width = (2.0 * stddev / (history.len() as f64).sqrt()).max(1.0);
        let low = clamp_score(predicted - half_width);
        let high = clamp_score(predicted + half_width);
        (predicted, low, high)
    }

    /// Fill in the realized outcome of a past forecast for back-testing.
    pub fn record_realized_outcome(
        &self,
        forecast_id: RecordId,
        realized_score: f64,
    ) -> EngineResult<()> {
        if !(0.0..=100.0).contains(&realized_score) || !realized_score.is_finite() {
            return Err(EngineError::validation(format!(
                "realized score {realized_score} outside [0, 100]"
            )));
        }
        if !self.store.set_realized_outcome(forecast_id, realized_score)? {
            return Err(EngineError::not_found("forecast", forecast_id));
        }
        Ok(())
    }

    /// Co-occurring risk-factor combinations that are both frequent and
    /// rising across the lookback window.
    pub fn identify_emerging_risk_factors(
        &self,
        lookback_days: i64,
    ) -> EngineResult<Vec<EmergingPattern>> {
        if lookback_days <= 0 {
            return Err(EngineError::validation(format!(
                "lookback {lookback_days} must be positive"
            )));
        }

        let now = self.clock.now().timestamp();
        let start = now - lookback_days * SECS_PER_DAY;
        let midpoint = start + (now - start) / 2;

        // combination → (total, first-half count, second-half count)
        let mut counts: BTreeMap<String, (i64, i64, i64)> = BTreeMap::new();
        for (created_at, factors) in self.store.risk_factors_in_window(Some(start), now)? {
            let flags = factors.active_flags();
            if flags.is_empty() {
                continue;
            }
            let combo = flags.join("+");
            let entry = counts.entry(combo).or_insert((0, 0, 0));
            entry.0 += 1;
            if created_at < midpoint {
                entry.1 += 1;
            } else {
                entry.2 += 1;
            }
        }

        let mut patterns: Vec<EmergingPattern> = counts
            .into_iter()
            .filter(|(_, (total, first, second))| {
                *total >= self.config.emerging_factor_min_frequency && second > first
            })
            .map(|(combo, (total, first, second))| EmergingPattern {
                factor_combination: combo,
                frequency: total,
                trend: second as f64 / first.max(1) as f64,
            })
            .collect();

        patterns.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then_with(|| a.factor_combination.cmp(&b.factor_combination))
        });

        for p in &patterns {
            log::info!(
                "emerging risk pattern: {} (frequency={}, trend={:.2})",
                p.factor_combination,
                p.frequency,
                p.trend,
            );
        }
        Ok(patterns)
    }

    /// Project one user's composite risk forward. No history never fails —
    /// the trajectory sits flat at the neutral midpoint and says so.
    pub fn predict_user_risk_trajectory(
        &self,
        user_id: &str,
        horizon_days: i64,
    ) -> EngineResult<UserRiskTrajectory> {
        if horizon_days <= 0 {
            return Err(EngineError::validation(format!(
                "horizon {horizon_days} must be positive"
            )));
        }

        let history = self
            .store
            .user_score_history(user_id, self.config.trend_sample_size)?;

        let insufficient = history.len() < self.min_forecast_samples();
        let current_score = history.last().map_or(NEUTRAL_SCORE, |(_, s)| *s);
        let slope = if insufficient {
            0.0
        } else {
            linear_trend(&history).0
        };

        let projected_scores_by_day: BTreeMap<i64, f64> = (1..=horizon_days)
            .map(|day| (day, clamp_score(current_score + slope * day as f64)))
            .collect();

        let trend_direction = if slope > 0.1 {
            TrendDirection::Rising
        } else if slope < -0.1 {
            TrendDirection::Falling
        } else {
            TrendDirection::Stable
        };

        Ok(UserRiskTrajectory {
            user_id: user_id.to_string(),
            current_score,
            projected_scores_by_day,
            trend_direction,
            insufficient_history: insufficient,
        })
    }

    /// Aggregate risk per industry over the lookback. Degrades to an empty
    /// map on store failure — the dashboard must keep rendering.
    pub fn generate_market_risk_heat_map(
        &self,
        lookback_days: i64,
    ) -> EngineResult<MarketRiskHeatMap> {
        if lookback_days <= 0 {
            return Err(EngineError::validation(format!(
                "lookback {lookback_days} must be positive"
            )));
        }

        let now = self.clock.now().timestamp();
        let start = now - lookback_days * SECS_PER_DAY;

        match self.store.heat_map_rows(Some(start), now) {
            Ok(rows) => {
                let industries = rows
                    .into_iter()
                    .map(|(industry, avg, samples)| {
                        (
                            industry,
                            IndustryRiskSummary {
                                avg_composite_score: avg,
                                sample_count: samples,
                            },
                        )
                    })
                    .collect();
                Ok(MarketRiskHeatMap {
                    lookback_days,
                    industries,
                    store_error: None,
                })
            }
            Err(e) if e.is_store_error() => {
                log::warn!("heat map degraded: {e}");
                Ok(MarketRiskHeatMap {
                    lookback_days,
                    industries: BTreeMap::new(),
                    store_error: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Back-test matured forecasts against their realized outcomes.
    pub fn get_forecast_accuracy_metrics(
        &self,
        lookback_days: i64,
    ) -> EngineResult<ForecastAccuracy> {
        if lookback_days <= 0 {
            return Err(EngineError::validation(format!(
                "lookback {lookback_days} must be positive"
            )));
        }

        let now = self.clock.now().timestamp();
        let start = now - lookback_days * SECS_PER_DAY;

        let pairs = match self.store.matured_forecast_pairs(start, now) {
            Ok(pairs) => pairs,
            Err(e) if e.is_store_error() => {
                log::warn!("forecast accuracy degraded: {e}");
                return Ok(ForecastAccuracy::zeroed(Some(e.to_string())));
            }
            Err(e) => return Err(e),
        };

        if pairs.is_empty() {
            return Ok(ForecastAccuracy::zeroed(None));
        }

        let n = pairs.len() as f64;
        let mean_absolute_error = pairs.iter().map(|(p, r)| (p - r).abs()).sum::<f64>() / n;
        let directional_hits = pairs
            .iter()
            .filter(|(p, r)| (*p >= NEUTRAL_SCORE) == (*r >= NEUTRAL_SCORE))
            .count();

        Ok(ForecastAccuracy {
            mean_absolute_error,
            directional_accuracy: directional_hits as f64 / n,
            sample_size: pairs.len() as i64,
            store_error: None,
        })
    }
}
