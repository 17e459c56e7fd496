//! careerguard-core — risk-based career protection analytics engine.
//!
//! Components, leaf-first:
//!   - `store`:            SQLite persistence. Only store/ talks SQL.
//!   - `tracker`:          system of record + windowed descriptive metrics.
//!   - `predictive`:       forecasts, emerging patterns, trajectories,
//!                         forecast-accuracy back-testing.
//!   - `success_metrics`:  pure-formula named rates over tracker data.
//!   - `dashboard`:        the only concurrent component — async fan-out
//!                         with per-branch error capture.
//!
//! RULES:
//!   - Components call store methods — they never execute SQL directly.
//!   - Assessments, outcomes and stories are insert-only; corrections are
//!     new rows, never updates.
//!   - All wall-clock reads flow through the injected `Clock`.

pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod model;
pub mod notifier;
pub mod predictive;
pub mod store;
pub mod success_metrics;
pub mod tracker;
pub mod types;
