//! guard-runner: headless report runner for the career protection engine.
//!
//! Usage:
//!   guard-runner --db protection.db --period last_30_days
//!   guard-runner --seed-demo --period last_30_days --lookback 30

use anyhow::Result;
use careerguard_core::{
    clock::{Clock, FixedClock, SystemClock},
    config::EngineConfig,
    dashboard::RiskSuccessDashboard,
    model::{InterventionPayload, InterventionType, OutcomeDetails, OutcomeType, RiskFactors},
    predictive::RiskPredictiveAnalytics,
    store::RiskStore,
    tracker::RiskAnalyticsTracker,
};
use chrono::{Duration, Utc};
use std::env;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let period = arg_value(&args, "--period").unwrap_or("last_30_days");
    let lookback: i64 = arg_value(&args, "--lookback")
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);
    let seed_demo = args.iter().any(|a| a == "--seed-demo");
    let db = arg_value(&args, "--db").unwrap_or(":memory:");
    let config_path = arg_value(&args, "--config");

    println!("careerguard — guard-runner");
    println!("  db:       {db}");
    println!("  period:   {period}");
    println!("  lookback: {lookback}");
    println!();

    // For :memory: use a SQLite shared-memory URI so every component
    // connection (tracker, predictive, dashboard branches) sees the same
    // in-memory database.
    let db_effective: String = if db == ":memory:" {
        format!("file:guardrun_{}?mode=memory&cache=shared", unix_now())
    } else {
        db.to_string()
    };
    let store = RiskStore::open(&db_effective)?;
    store.migrate()?;

    let config = match config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    if seed_demo {
        seed_demo_data(&store, &config)?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dashboard = RiskSuccessDashboard::new(store.reopen()?, Arc::clone(&clock), config.clone());

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(dashboard.generate_career_protection_report(period))?;
    let roi = runtime.block_on(dashboard.generate_roi_analysis())?;
    let heat_map = dashboard.get_risk_heat_map(lookback)?;
    let trends = dashboard.get_protection_success_trends(lookback)?;

    println!("=== CAREER PROTECTION REPORT ({period}) ===");
    println!("{}", serde_json::to_string_pretty(&report)?);

    println!();
    println!("=== ROI ANALYSIS ===");
    println!("  interventions:  {}", roi.interventions_delivered);
    println!("  cost baseline:  ${:.0}", roi.intervention_cost_baseline);
    println!("  est. savings:   ${:.0}", roi.estimated_savings);
    println!("  roi ratio:      {:.2}", roi.roi_ratio);

    println!();
    println!("=== INDUSTRY HEAT MAP (last {lookback} days) ===");
    if heat_map.industries.is_empty() {
        println!("  (no assessments in window)");
    }
    for cell in &heat_map.industries {
        println!(
            "  {:<24} risk {:>5.1}  (n={})",
            cell.industry, cell.risk_score, cell.sample_count
        );
    }

    let nonzero_trend_days = trends.values().filter(|rate| **rate > 0.0).count();
    println!();
    println!("=== SUCCESS TREND ===");
    println!(
        "  {} of {} days with a non-zero rolling success rate",
        nonzero_trend_days,
        trends.len()
    );

    Ok(())
}

/// Write a small deterministic scenario through the tracker: a handful of
/// users assessed over the past month, interventions on the high-risk ones,
/// and a mix of outcomes. Past timestamps come from a FixedClock walked
/// forward day by day.
fn seed_demo_data(store: &RiskStore, config: &EngineConfig) -> Result<()> {
    let clock = Arc::new(FixedClock::new(Utc::now() - Duration::days(28)));
    let tracker = RiskAnalyticsTracker::new(
        store.reopen()?,
        clock.clone(),
        config.clone(),
        None,
    );
    let predictive =
        RiskPredictiveAnalytics::new(store.reopen()?, clock.clone(), config.clone());

    let industries = ["software", "retail", "logistics", "media"];
    let mut assessment_ids = Vec::new();

    for (i, industry) in industries.iter().enumerate() {
        for user_n in 0..3 {
            let user_id = format!("demo-user-{i}{user_n}");
            let factors = RiskFactors {
                industry_volatility: i % 2 == 0,
                company_layoffs: user_n == 0,
                industry: Some(industry.to_string()),
                ..RiskFactors::default()
            };
            let industry_score = 40.0 + 10.0 * i as f64 + 5.0 * user_n as f64;
            let company_score = 35.0 + 12.0 * i as f64;
            let id = tracker.assess_user_risk(
                &user_id,
                &factors,
                industry_score.min(100.0),
                company_score.min(100.0),
                0.85,
            )?;
            assessment_ids.push((user_id, id, industry_score));
            clock.advance(Duration::days(1));
        }
    }

    for (user_id, assessment_id, score) in &assessment_ids {
        if *score < 60.0 {
            continue;
        }
        let intervention_id = tracker.trigger_intervention(
            user_id,
            *assessment_id,
            InterventionType::EarlyWarning,
            InterventionPayload {
                priority: Some("high".to_string()),
                message: Some("elevated industry risk detected".to_string()),
                ..InterventionPayload::default()
            },
        )?;
        clock.advance(Duration::days(2));

        tracker.track_career_protection_outcome(
            user_id,
            *assessment_id,
            OutcomeType::SuccessfulTransition,
            &OutcomeDetails {
                summary: Some("moved to a lower-risk role".to_string()),
                ..OutcomeDetails::default()
            },
            Some(intervention_id),
            Some(5_000.0),
            Some(35),
            Some(4),
            Some(true),
        )?;
    }

    predictive.generate_risk_forecasts(
        careerguard_core::model::ForecastType::IndustryRisk,
        &industries.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        30,
    )?;

    log::info!("demo data seeded: {} assessments", assessment_ids.len());
    Ok(())
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
