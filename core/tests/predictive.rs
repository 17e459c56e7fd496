//! Predictive analytics integration tests: forecasting, emerging patterns,
//! trajectories, the heat map and accuracy back-testing.

use careerguard_core::{
    clock::{Clock, FixedClock},
    config::EngineConfig,
    error::EngineError,
    model::{ForecastType, RiskFactors},
    predictive::{RiskPredictiveAnalytics, TrendDirection, NEUTRAL_SCORE},
    store::RiskStore,
    tracker::RiskAnalyticsTracker,
};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Shared-memory database so the tracker (writer) and the predictive
/// component (reader) see the same rows. Names are per-test: shared-cache
/// memory databases are process-wide.
fn shared_store(name: &str) -> RiskStore {
    RiskStore::open(&format!("file:{name}?mode=memory&cache=shared")).unwrap()
}

fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ))
}

struct Rig {
    // Keeps the shared-memory database alive for the test's duration.
    store: RiskStore,
    tracker: RiskAnalyticsTracker,
    predictive: RiskPredictiveAnalytics,
    clock: Arc<FixedClock>,
}

fn make_rig(name: &str) -> Rig {
    let store = shared_store(name);
    store.migrate().unwrap();
    let clock = fixed_clock();
    let tracker = RiskAnalyticsTracker::new(
        store.reopen().unwrap(),
        clock.clone(),
        EngineConfig::default(),
        None,
    );
    let predictive = RiskPredictiveAnalytics::new(
        store.reopen().unwrap(),
        clock.clone(),
        EngineConfig::default(),
    );
    Rig {
        store,
        tracker,
        predictive,
        clock,
    }
}

fn assess(rig: &Rig, user: &str, factors: &RiskFactors, score: f64) {
    rig.tracker
        .assess_user_risk(user, factors, score, score, 0.9)
        .unwrap();
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// An entity with no history still gets a forecast: neutral score with the
/// maximal [0, 100] interval. Never an error, and the row is persisted.
#[test]
fn sparse_history_yields_maximal_interval() {
    let rig = make_rig("predictive_sparse");

    let forecasts = rig
        .predictive
        .generate_risk_forecasts(ForecastType::UserRisk, &["nobody".to_string()], 30)
        .unwrap();

    assert_eq!(forecasts.len(), 1);
    let f = &forecasts[0];
    assert_eq!(f.predicted_score, NEUTRAL_SCORE);
    assert_eq!(f.confidence_low, 0.0);
    assert_eq!(f.confidence_high, 100.0);
    assert_eq!(f.horizon_days, 30);
    assert!(f.realized_outcome.is_none());

    assert_eq!(rig.store.count_forecasts().unwrap(), 1);
    let stored = rig.store.get_forecast(f.id).unwrap().unwrap();
    assert_eq!(stored.target_entity, "nobody");
    assert_eq!(stored.predicted_score, NEUTRAL_SCORE);
}

/// With a clean rising history the forecast extrapolates past the last
/// observation and the interval tightens well below the maximal one.
#[test]
fn forecast_extrapolates_rising_history() {
    let rig = make_rig("predictive_rising");

    for score in [50.0, 52.0, 54.0] {
        assess(&rig, "climber", &RiskFactors::default(), score);
        rig.clock.advance(Duration::days(1));
    }

    let forecasts = rig
        .predictive
        .generate_risk_forecasts(ForecastType::UserRisk, &["climber".to_string()], 7)
        .unwrap();
    let f = &forecasts[0];

    assert!(
        f.predicted_score > 54.0,
        "rising trend must project above the last score, got {}",
        f.predicted_score
    );
    assert!(f.confidence_low <= f.predicted_score);
    assert!(f.confidence_high >= f.predicted_score);
    assert!(
        f.confidence_high - f.confidence_low < 50.0,
        "interval [{}, {}] should be far tighter than maximal",
        f.confidence_low,
        f.confidence_high
    );
}

/// Industry forecasts group by the industry tag in the risk factors;
/// untagged assessments stay out of the trend.
#[test]
fn industry_forecast_uses_tagged_assessments_only() {
    let rig = make_rig("predictive_industry");

    let software = RiskFactors {
        industry: Some("software".to_string()),
        ..RiskFactors::default()
    };
    for score in [80.0, 82.0, 84.0] {
        assess(&rig, "sw-user", &software, score);
        rig.clock.advance(Duration::days(1));
    }
    // Low-score untagged noise that must not drag the trend down.
    assess(&rig, "untagged", &RiskFactors::default(), 5.0);

    let forecasts = rig
        .predictive
        .generate_risk_forecasts(ForecastType::IndustryRisk, &["software".to_string()], 7)
        .unwrap();
    assert!(
        forecasts[0].predicted_score > 80.0,
        "got {}",
        forecasts[0].predicted_score
    );
}

/// A non-positive horizon is rejected before any store work.
#[test]
fn forecast_horizon_validation() {
    let rig = make_rig("predictive_horizon");

    let err = rig
        .predictive
        .generate_risk_forecasts(ForecastType::UserRisk, &["u".to_string()], 0)
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err}");
    assert_eq!(rig.store.count_forecasts().unwrap(), 0);
}

/// An unknown user trajectory is flat at the neutral score and flagged as
/// having insufficient history.
#[test]
fn trajectory_without_history_is_flat_neutral() {
    let rig = make_rig("predictive_flat");

    let trajectory = rig
        .predictive
        .predict_user_risk_trajectory("ghost", 5)
        .unwrap();

    assert_eq!(trajectory.current_score, NEUTRAL_SCORE);
    assert!(trajectory.insufficient_history);
    assert_eq!(trajectory.trend_direction, TrendDirection::Stable);
    assert_eq!(trajectory.projected_scores_by_day.len(), 5);
    assert!(trajectory
        .projected_scores_by_day
        .values()
        .all(|s| *s == NEUTRAL_SCORE));
}

/// A steadily climbing user projects upward day by day, clamped to 100.
#[test]
fn trajectory_follows_user_trend() {
    let rig = make_rig("predictive_trajectory");

    for score in [50.0, 54.0, 58.0] {
        assess(&rig, "climber", &RiskFactors::default(), score);
        rig.clock.advance(Duration::days(1));
    }

    let trajectory = rig
        .predictive
        .predict_user_risk_trajectory("climber", 30)
        .unwrap();

    assert!(!trajectory.insufficient_history);
    assert_eq!(trajectory.current_score, 58.0);
    assert_eq!(trajectory.trend_direction, TrendDirection::Rising);
    assert_eq!(trajectory.projected_scores_by_day.len(), 30);

    let day1 = trajectory.projected_scores_by_day[&1];
    assert!(
        (day1 - 62.0).abs() < 0.01,
        "4/day slope from 58 should give ~62, got {day1}"
    );
    assert_eq!(
        trajectory.projected_scores_by_day[&30], 100.0,
        "projection must clamp at 100"
    );
}

/// A combination that is frequent and concentrated in the recent half of
/// the window is flagged as emerging; rare combinations are not.
#[test]
fn emerging_patterns_require_frequency_and_rise() {
    let rig = make_rig("predictive_emerging");

    let layoffs = RiskFactors {
        industry_volatility: true,
        company_layoffs: true,
        ..RiskFactors::default()
    };
    let automation = RiskFactors {
        role_automation: true,
        ..RiskFactors::default()
    };

    let now = rig.clock.now();

    // Two occurrences in the first half of a 10-day window...
    rig.clock.set(now - Duration::days(8));
    assess(&rig, "u1", &layoffs, 60.0);
    assess(&rig, "u2", &layoffs, 65.0);
    // ...four in the second half.
    rig.clock.set(now - Duration::days(2));
    for user in ["u3", "u4", "u5", "u6"] {
        assess(&rig, user, &layoffs, 70.0);
    }
    // Below the frequency threshold, even though rising.
    assess(&rig, "u7", &automation, 55.0);
    rig.clock.set(now);

    let patterns = rig.predictive.identify_emerging_risk_factors(10).unwrap();

    assert_eq!(patterns.len(), 1, "got {patterns:?}");
    let p = &patterns[0];
    assert_eq!(p.factor_combination, "company_layoffs+industry_volatility");
    assert_eq!(p.frequency, 6);
    assert!((p.trend - 2.0).abs() < f64::EPSILON, "4/2 rise, got {}", p.trend);
}

/// A combination whose occurrences are all in the older half is not
/// emerging, regardless of frequency.
#[test]
fn fading_patterns_are_not_emerging() {
    let rig = make_rig("predictive_fading");

    let gap = RiskFactors {
        skills_gap: true,
        ..RiskFactors::default()
    };
    let now = rig.clock.now();
    rig.clock.set(now - Duration::days(9));
    for user in ["u1", "u2", "u3", "u4"] {
        assess(&rig, user, &gap, 50.0);
    }
    rig.clock.set(now);

    let patterns = rig.predictive.identify_emerging_risk_factors(10).unwrap();
    assert!(patterns.is_empty(), "got {patterns:?}");
}

/// The heat map averages composite scores per industry tag; untagged
/// assessments group under `unknown`.
#[test]
fn heat_map_groups_by_industry() {
    let rig = make_rig("predictive_heatmap");

    let software = RiskFactors {
        industry: Some("software".to_string()),
        ..RiskFactors::default()
    };
    let retail = RiskFactors {
        industry: Some("retail".to_string()),
        ..RiskFactors::default()
    };
    assess(&rig, "u1", &software, 80.0);
    assess(&rig, "u2", &software, 90.0);
    assess(&rig, "u3", &retail, 40.0);
    assess(&rig, "u4", &RiskFactors::default(), 10.0);
    rig.clock.advance(Duration::minutes(1));

    let heat_map = rig.predictive.generate_market_risk_heat_map(30).unwrap();
    assert!(heat_map.store_error.is_none());
    assert_eq!(heat_map.industries.len(), 3, "got {:?}", heat_map.industries);

    let sw = &heat_map.industries["software"];
    assert_eq!(sw.avg_composite_score, 85.0);
    assert_eq!(sw.sample_count, 2);
    assert_eq!(heat_map.industries["retail"].avg_composite_score, 40.0);
    assert_eq!(heat_map.industries["unknown"].sample_count, 1);
}

/// Back-testing only sees forecasts whose horizon has elapsed and whose
/// realized outcome was recorded; MAE and directional accuracy follow.
#[test]
fn accuracy_back_testing_over_matured_forecasts() {
    let rig = make_rig("predictive_accuracy");

    // Two 1-day forecasts from an empty store: both predict 50.
    let forecasts = rig
        .predictive
        .generate_risk_forecasts(
            ForecastType::UserRisk,
            &["a".to_string(), "b".to_string()],
            1,
        )
        .unwrap();

    // One realizes high-risk (directional hit at the 50 midpoint), the
    // other low-risk (miss).
    rig.predictive
        .record_realized_outcome(forecasts[0].id, 60.0)
        .unwrap();
    rig.predictive
        .record_realized_outcome(forecasts[1].id, 40.0)
        .unwrap();

    // Not matured yet: horizon has not elapsed.
    let early = rig.predictive.get_forecast_accuracy_metrics(30).unwrap();
    assert_eq!(early.sample_size, 0);
    assert_eq!(early.mean_absolute_error, 0.0);

    rig.clock.advance(Duration::days(2));
    let accuracy = rig.predictive.get_forecast_accuracy_metrics(30).unwrap();
    assert_eq!(accuracy.sample_size, 2);
    assert_eq!(accuracy.mean_absolute_error, 10.0);
    assert_eq!(accuracy.directional_accuracy, 0.5);
    assert!(accuracy.store_error.is_none());
}

/// Realized outcomes are validated and must target an existing forecast.
#[test]
fn realized_outcome_validation() {
    let rig = make_rig("predictive_realized");

    let err = rig
        .predictive
        .record_realized_outcome(777, 50.0)
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { .. }), "got {err}");

    let forecasts = rig
        .predictive
        .generate_risk_forecasts(ForecastType::UserRisk, &["a".to_string()], 1)
        .unwrap();
    let err = rig
        .predictive
        .record_realized_outcome(forecasts[0].id, 150.0)
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err}");

    let stored = rig.store.get_forecast(forecasts[0].id).unwrap().unwrap();
    assert!(stored.realized_outcome.is_none(), "failed write must not land");
}

/// Heat map and accuracy degrade over a broken store (no tables): empty
/// results with the failure in `store_error`, never an error.
#[test]
fn heat_map_and_accuracy_degrade_on_broken_store() {
    // No migrate(): every query hits a missing table.
    let store = RiskStore::in_memory().unwrap();
    let predictive =
        RiskPredictiveAnalytics::new(store, fixed_clock(), EngineConfig::default());

    let heat_map = predictive.generate_market_risk_heat_map(30).unwrap();
    assert!(heat_map.store_error.is_some(), "failure must be surfaced");
    assert!(heat_map.industries.is_empty());

    let accuracy = predictive.get_forecast_accuracy_metrics(30).unwrap();
    assert!(accuracy.store_error.is_some());
    assert_eq!(accuracy.sample_size, 0);
    assert_eq!(accuracy.mean_absolute_error, 0.0);
}

/// A config floor of zero samples must not break empty-history handling:
/// the forecast and trajectory still take the sparse path instead of
/// trending over nothing.
#[test]
fn zero_sample_floor_config_still_handles_empty_history() {
    let store = shared_store("predictive_zero_floor");
    store.migrate().unwrap();
    let config = EngineConfig {
        min_forecast_samples: 0,
        ..EngineConfig::default()
    };
    let predictive =
        RiskPredictiveAnalytics::new(store.reopen().unwrap(), fixed_clock(), config);

    let forecasts = predictive
        .generate_risk_forecasts(ForecastType::UserRisk, &["nobody".to_string()], 7)
        .unwrap();
    assert_eq!(forecasts[0].predicted_score, NEUTRAL_SCORE);
    assert_eq!(forecasts[0].confidence_low, 0.0);
    assert_eq!(forecasts[0].confidence_high, 100.0);

    let trajectory = predictive
        .predict_user_risk_trajectory("nobody", 3)
        .unwrap();
    assert!(trajectory.insufficient_history);
    assert_eq!(trajectory.current_score, NEUTRAL_SCORE);
}
