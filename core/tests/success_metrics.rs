//! Success metrics integration tests: the named rates and the dashboard
//! aggregate, including the full assess → intervene → outcome flow.

use careerguard_core::{
    clock::FixedClock,
    config::EngineConfig,
    error::EngineError,
    model::{InterventionPayload, InterventionType, OutcomeDetails, OutcomeType, RiskFactors},
    store::RiskStore,
    success_metrics::SuccessMetrics,
    tracker::RiskAnalyticsTracker,
};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn make_metrics() -> (SuccessMetrics, Arc<FixedClock>) {
    let store = RiskStore::in_memory().unwrap();
    store.migrate().unwrap();
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let tracker =
        RiskAnalyticsTracker::new(store, clock.clone(), EngineConfig::default(), None);
    (SuccessMetrics::new(tracker), clock)
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// The full protection flow: a high-risk assessment (85/90 → composite
/// 87.5), an early warning, and a successful transition with protected
/// income. Every named rate reflects the single resolved case.
#[test]
fn full_protection_flow_drives_all_rates() {
    let (metrics, clock) = make_metrics();
    let tracker = metrics.tracker();

    let assessment_id = tracker
        .assess_user_risk("u-1", &RiskFactors::default(), 85.0, 90.0, 0.9)
        .unwrap();
    assert_eq!(
        tracker.get_assessment(assessment_id).unwrap().composite_risk_score,
        87.5
    );

    let intervention_id = tracker
        .trigger_intervention(
            "u-1",
            assessment_id,
            InterventionType::EarlyWarning,
            InterventionPayload::default(),
        )
        .unwrap();
    clock.advance(Duration::days(3));
    tracker
        .track_career_protection_outcome(
            "u-1",
            assessment_id,
            OutcomeType::SuccessfulTransition,
            &OutcomeDetails::default(),
            Some(intervention_id),
            Some(25_000.0),
            Some(42),
            Some(5),
            Some(true),
        )
        .unwrap();
    clock.advance(Duration::minutes(1));

    assert_eq!(
        metrics.career_protection_success_rate("last_30_days").unwrap(),
        1.0
    );
    assert_eq!(metrics.early_warning_accuracy("last_30_days").unwrap(), 1.0);
    assert_eq!(
        metrics.risk_intervention_effectiveness("last_30_days").unwrap(),
        1.0
    );
    assert_eq!(metrics.income_protection_rate("last_30_days").unwrap(), 1.0);
    assert_eq!(
        metrics.unemployment_prevention_rate("last_30_days").unwrap(),
        1.0
    );

    let report = metrics.get_risk_based_success_metrics("last_30_days").unwrap();
    assert!(report.store_error.is_none());
    assert_eq!(report.user_journey_analytics.total_assessments, 1);
    assert_eq!(report.user_journey_analytics.high_risk_users, 1);
    assert_eq!(report.user_journey_analytics.interventions_triggered, 1);
    assert_eq!(
        report.user_journey_analytics.avg_time_to_new_role_days,
        Some(42.0)
    );
    assert_eq!(report.user_journey_analytics.avg_satisfaction, Some(5.0));
}

/// On an empty store every rate is 0 and every journey count is zero —
/// the aggregate still has all its keys and no error marker.
#[test]
fn empty_store_aggregate_is_zeroed() {
    let (metrics, _) = make_metrics();

    for token in ["last_7_days", "last_30_days", "last_90_days", "all_time"] {
        let report = metrics.get_risk_based_success_metrics(token).unwrap();
        let rates = &report.career_protection_metrics;
        assert_eq!(rates.success_rate, 0.0, "{token}");
        assert_eq!(rates.early_warning_accuracy, 0.0, "{token}");
        assert_eq!(rates.intervention_effectiveness, 0.0, "{token}");
        assert_eq!(rates.income_protection_rate, 0.0, "{token}");
        assert_eq!(rates.unemployment_prevention_rate, 0.0, "{token}");

        let journey = &report.user_journey_analytics;
        assert_eq!(journey.total_assessments, 0, "{token}");
        assert_eq!(journey.assessed_users, 0, "{token}");
        assert_eq!(journey.high_risk_users, 0, "{token}");
        assert_eq!(journey.interventions_triggered, 0, "{token}");
        assert_eq!(journey.avg_time_to_new_role_days, None, "{token}");
        assert_eq!(journey.avg_satisfaction, None, "{token}");
        assert!(report.store_error.is_none(), "{token}");
    }
}

/// Two calls with no writes in between return the same aggregate.
#[test]
fn aggregate_is_idempotent() {
    let (metrics, clock) = make_metrics();
    let tracker = metrics.tracker();

    let id = tracker
        .assess_user_risk("u-1", &RiskFactors::default(), 80.0, 80.0, 0.9)
        .unwrap();
    tracker
        .track_career_protection_outcome(
            "u-1",
            id,
            OutcomeType::SuccessfulTransition,
            &OutcomeDetails::default(),
            None,
            Some(1_000.0),
            Some(20),
            Some(4),
            Some(true),
        )
        .unwrap();
    clock.advance(Duration::minutes(1));

    let first = metrics.get_risk_based_success_metrics("last_30_days").unwrap();
    let second = metrics.get_risk_based_success_metrics("last_30_days").unwrap();
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}

/// A realized unemployment among high-risk users lowers the prevention
/// rate; a salary cut breaks income protection.
#[test]
fn adverse_outcomes_lower_the_protective_rates() {
    let (metrics, clock) = make_metrics();
    let tracker = metrics.tracker();

    let a1 = tracker
        .assess_user_risk("u-1", &RiskFactors::default(), 85.0, 90.0, 0.9)
        .unwrap();
    let a2 = tracker
        .assess_user_risk("u-2", &RiskFactors::default(), 75.0, 75.0, 0.9)
        .unwrap();

    tracker
        .track_career_protection_outcome(
            "u-1",
            a1,
            OutcomeType::SuccessfulTransition,
            &OutcomeDetails::default(),
            None,
            Some(-5_000.0),
            Some(60),
            Some(2),
            Some(false),
        )
        .unwrap();
    tracker
        .track_career_protection_outcome(
            "u-2",
            a2,
            OutcomeType::Unemployment,
            &OutcomeDetails::default(),
            None,
            None,
            None,
            None,
            None,
        )
        .unwrap();
    clock.advance(Duration::minutes(1));

    assert_eq!(
        metrics.unemployment_prevention_rate("last_30_days").unwrap(),
        0.5,
        "one of two high-risk users went unemployed"
    );
    assert_eq!(
        metrics.income_protection_rate("last_30_days").unwrap(),
        0.0,
        "the only transition took a pay cut"
    );
    assert_eq!(
        metrics.career_protection_success_rate("last_30_days").unwrap(),
        0.5
    );
}

/// The scalar effectiveness is the count-weighted mean over real
/// intervention types; unlinked outcomes don't participate.
#[test]
fn effectiveness_is_count_weighted_over_real_types() {
    let (metrics, clock) = make_metrics();
    let tracker = metrics.tracker();

    let a1 = tracker
        .assess_user_risk("u-1", &RiskFactors::default(), 80.0, 80.0, 0.9)
        .unwrap();
    let i1 = tracker
        .trigger_intervention("u-1", a1, InterventionType::Coaching, InterventionPayload::default())
        .unwrap();
    tracker
        .track_career_protection_outcome(
            "u-1",
            a1,
            OutcomeType::SuccessfulTransition,
            &OutcomeDetails::default(),
            Some(i1),
            Some(2_000.0),
            Some(30),
            Some(5),
            Some(true),
        )
        .unwrap();

    let a2 = tracker
        .assess_user_risk("u-2", &RiskFactors::default(), 80.0, 80.0, 0.9)
        .unwrap();
    let i2 = tracker
        .trigger_intervention(
            "u-2",
            a2,
            InterventionType::MonitoringOnly,
            InterventionPayload::default(),
        )
        .unwrap();
    tracker
        .track_career_protection_outcome(
            "u-2",
            a2,
            OutcomeType::Unemployment,
            &OutcomeDetails::default(),
            Some(i2),
            None,
            None,
            None,
            None,
        )
        .unwrap();

    // An unlinked outcome that must stay out of the scalar.
    let a3 = tracker
        .assess_user_risk("u-3", &RiskFactors::default(), 40.0, 40.0, 0.9)
        .unwrap();
    tracker
        .track_career_protection_outcome(
            "u-3",
            a3,
            OutcomeType::SuccessfulTransition,
            &OutcomeDetails::default(),
            None,
            Some(500.0),
            Some(10),
            Some(4),
            Some(true),
        )
        .unwrap();
    clock.advance(Duration::minutes(1));

    let effectiveness = metrics
        .risk_intervention_effectiveness("last_30_days")
        .unwrap();
    assert_eq!(
        effectiveness, 0.5,
        "coaching succeeded, monitoring_only did not"
    );
}

/// The aggregate over a broken store (no tables) degrades to the zeroed
/// shape with the failure recorded, instead of raising.
#[test]
fn aggregate_degrades_on_broken_store() {
    // No migrate(): every query hits a missing table.
    let store = RiskStore::in_memory().unwrap();
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let tracker = RiskAnalyticsTracker::new(store, clock, EngineConfig::default(), None);
    let metrics = SuccessMetrics::new(tracker);

    let report = metrics.get_risk_based_success_metrics("all_time").unwrap();
    assert!(report.store_error.is_some(), "failure must be surfaced");
    assert_eq!(report.career_protection_metrics.success_rate, 0.0);
    assert_eq!(report.career_protection_metrics.early_warning_accuracy, 0.0);
    assert_eq!(report.user_journey_analytics.total_assessments, 0);
    assert_eq!(report.user_journey_analytics.avg_satisfaction, None);
}

/// Unknown window tokens are rejected by the aggregate and by each rate.
#[test]
fn bogus_window_token_rejected_everywhere() {
    let (metrics, _) = make_metrics();

    let err = metrics
        .get_risk_based_success_metrics("bogus_window")
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err}");

    assert!(metrics.career_protection_success_rate("bogus_window").is_err());
    assert!(metrics.early_warning_accuracy("bogus_window").is_err());
    assert!(metrics.risk_intervention_effectiveness("bogus_window").is_err());
    assert!(metrics.income_protection_rate("bogus_window").is_err());
    assert!(metrics.unemployment_prevention_rate("bogus_window").is_err());
}
