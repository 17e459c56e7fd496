//! Engine configuration — thresholds, cost baselines and timeouts.
//!
//! Loaded from a JSON file when one is supplied; every field has a default
//! so a missing file or a partial file still yields a usable config.

use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Composite score at or above which an assessment counts as high risk.
    #[serde(default = "default_high_risk_threshold")]
    pub high_risk_threshold: f64,

    /// Most recent history points fed into trend extrapolation.
    #[serde(default = "default_trend_sample_size")]
    pub trend_sample_size: usize,

    /// Below this sample count a forecast gets the maximal interval.
    #[serde(default = "default_min_forecast_samples")]
    pub min_forecast_samples: usize,

    /// A factor combination must occur this often in the lookback window
    /// before it can be flagged as emerging.
    #[serde(default = "default_emerging_factor_min_frequency")]
    pub emerging_factor_min_frequency: i64,

    /// Cost baseline per delivered intervention, in dollars.
    #[serde(default = "default_cost_per_intervention")]
    pub cost_per_intervention: f64,

    /// Assumed dollar loss of one unprevented unemployment spell.
    #[serde(default = "default_avg_unemployment_loss")]
    pub avg_unemployment_loss: f64,

    /// Per-branch timeout for dashboard fan-out.
    #[serde(default = "default_dashboard_timeout_ms")]
    pub dashboard_timeout_ms: u64,

    /// Rolling window for the daily success-rate trend.
    #[serde(default = "default_trend_window_days")]
    pub trend_window_days: i64,
}

fn default_high_risk_threshold() -> f64 {
    70.0
}
fn default_trend_sample_size() -> usize {
    10
}
fn default_min_forecast_samples() -> usize {
    2
}
fn default_emerging_factor_min_frequency() -> i64 {
    3
}
fn default_cost_per_intervention() -> f64 {
    150.0
}
fn default_avg_unemployment_loss() -> f64 {
    25_000.0
}
fn default_dashboard_timeout_ms() -> u64 {
    5_000
}
fn default_trend_window_days() -> i64 {
    7
}

impl Default for EngineConfig {
    fn default() -> Self {
        // serde defaults are the single source of truth.
        serde_json::from_str("{}").expect("empty config object must deserialize")
    }
}

impl EngineConfig {
    /// Load config from a JSON file. A missing file yields the defaults;
    /// a malformed file is an error.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        Ok(serde_json::from_str(&raw)?)
    }
}
