//! Windowed aggregate queries.
//!
//! Every query takes a `[start, end)` interval as unix seconds; a `None`
//! start means unbounded (the `all_time` window). Aggregates never divide —
//! rate math stays in the components so denominators are guarded in one
//! place.

use super::RiskStore;
use crate::error::EngineResult;
use rusqlite::params;

/// Per-bucket outcome statistics, keyed by the linked intervention's type
/// (or `no_intervention` for outcomes with no linked intervention).
#[derive(Debug, Clone)]
pub struct OutcomeBucketStats {
    pub bucket: String,
    pub total: i64,
    pub resolved: i64,
    pub successes: i64,
    pub avg_time_to_role_days: Option<f64>,
}

impl RiskStore {
    pub fn count_assessments(&self, start: Option<i64>, end: i64) -> EngineResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM risk_assessments
             WHERE (?1 IS NULL OR created_at >= ?1) AND created_at < ?2",
            params![start, end],
            |r| r.get(0),
        )?)
    }

    pub fn count_assessed_users(&self, start: Option<i64>, end: i64) -> EngineResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(DISTINCT user_id) FROM risk_assessments
             WHERE (?1 IS NULL OR created_at >= ?1) AND created_at < ?2",
            params![start, end],
            |r| r.get(0),
        )?)
    }

    /// Distinct users with at least one high-risk assessment in the window.
    pub fn count_high_risk_users(
        &self,
        start: Option<i64>,
        end: i64,
        threshold: f64,
    ) -> EngineResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(DISTINCT user_id) FROM risk_assessments
             WHERE (?1 IS NULL OR created_at >= ?1) AND created_at < ?2
               AND composite_risk_score >= ?3",
            params![start, end, threshold],
            |r| r.get(0),
        )?)
    }

    pub fn count_high_risk_assessments(
        &self,
        start: Option<i64>,
        end: i64,
        threshold: f64,
    ) -> EngineResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM risk_assessments
             WHERE (?1 IS NULL OR created_at >= ?1) AND created_at < ?2
               AND composite_risk_score >= ?3",
            params![start, end, threshold],
            |r| r.get(0),
        )?)
    }

    /// High-risk assessments in the window that resolved to unemployment.
    /// The complement over all high-risk assessments is the prevented set.
    pub fn count_high_risk_unemployed(
        &self,
        start: Option<i64>,
        end: i64,
        threshold: f64,
    ) -> EngineResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM risk_assessments a
             WHERE (?1 IS NULL OR a.created_at >= ?1) AND a.created_at < ?2
               AND a.composite_risk_score >= ?3
               AND EXISTS (SELECT 1 FROM outcomes o
                           WHERE o.risk_assessment_id = a.id
                             AND o.outcome_type = 'unemployment')",
            params![start, end, threshold],
            |r| r.get(0),
        )?)
    }

    pub fn count_interventions(&self, start: Option<i64>, end: i64) -> EngineResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM interventions
             WHERE (?1 IS NULL OR triggered_at >= ?1) AND triggered_at < ?2",
            params![start, end],
            |r| r.get(0),
        )?)
    }

    pub fn intervention_counts_by_type(
        &self,
        start: Option<i64>,
        end: i64,
    ) -> EngineResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT type, COUNT(*) FROM interventions
             WHERE (?1 IS NULL OR triggered_at >= ?1) AND triggered_at < ?2
             GROUP BY type ORDER BY type",
        )?;
        let rows = stmt
            .query_map(params![start, end], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn outcome_counts_by_type(
        &self,
        start: Option<i64>,
        end: i64,
    ) -> EngineResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT outcome_type, COUNT(*) FROM outcomes
             WHERE (?1 IS NULL OR recorded_at >= ?1) AND recorded_at < ?2
             GROUP BY outcome_type ORDER BY outcome_type",
        )?;
        let rows = stmt
            .query_map(params![start, end], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Resolved/success/time-to-role stats for outcomes in the window,
    /// grouped by the linked intervention's type.
    pub fn outcome_stats_by_intervention_bucket(
        &self,
        start: Option<i64>,
        end: i64,
    ) -> EngineResult<Vec<OutcomeBucketStats>> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(i.type, 'no_intervention') AS bucket,
                    COUNT(*),
                    SUM(CASE WHEN o.outcome_type != 'unresolved' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN o.outcome_type = 'successful_transition' THEN 1 ELSE 0 END),
                    AVG(CASE WHEN o.outcome_type = 'successful_transition'
                             THEN o.time_to_new_role_days END)
             FROM outcomes o
             LEFT JOIN interventions i ON o.intervention_id = i.id
             WHERE (?1 IS NULL OR o.recorded_at >= ?1) AND o.recorded_at < ?2
             GROUP BY bucket ORDER BY bucket",
        )?;
        let rows = stmt
            .query_map(params![start, end], |r| {
                Ok(OutcomeBucketStats {
                    bucket: r.get(0)?,
                    total: r.get(1)?,
                    resolved: r.get(2)?,
                    successes: r.get(3)?,
                    avg_time_to_role_days: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Early-warning interventions in the window, and how many of them have
    /// a linked successful-transition outcome.
    pub fn early_warning_counts(
        &self,
        start: Option<i64>,
        end: i64,
    ) -> EngineResult<(i64, i64)> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*),
                    SUM(CASE WHEN EXISTS
                          (SELECT 1 FROM outcomes o
                           WHERE o.intervention_id = i.id
                             AND o.outcome_type = 'successful_transition')
                        THEN 1 ELSE 0 END)
             FROM interventions i
             WHERE i.type = 'early_warning'
               AND (?1 IS NULL OR i.triggered_at >= ?1) AND i.triggered_at < ?2",
            params![start, end],
            |r| Ok((r.get(0)?, r.get::<_, Option<i64>>(1)?.unwrap_or(0))),
        )?)
    }

    /// Successful transitions in the window, and how many of them carry a
    /// non-negative salary change. Unknown salaries count in the denominator
    /// only.
    pub fn income_protection_counts(
        &self,
        start: Option<i64>,
        end: i64,
    ) -> EngineResult<(i64, i64)> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*),
                    SUM(CASE WHEN salary_change IS NOT NULL AND salary_change >= 0
                        THEN 1 ELSE 0 END)
             FROM outcomes
             WHERE outcome_type = 'successful_transition'
               AND (?1 IS NULL OR recorded_at >= ?1) AND recorded_at < ?2",
            params![start, end],
            |r| Ok((r.get(0)?, r.get::<_, Option<i64>>(1)?.unwrap_or(0))),
        )?)
    }

    pub fn avg_time_to_new_role(
        &self,
        start: Option<i64>,
        end: i64,
    ) -> EngineResult<Option<f64>> {
        Ok(self.conn.query_row(
            "SELECT AVG(time_to_new_role_days) FROM outcomes
             WHERE outcome_type = 'successful_transition'
               AND (?1 IS NULL OR recorded_at >= ?1) AND recorded_at < ?2",
            params![start, end],
            |r| r.get(0),
        )?)
    }

    pub fn avg_satisfaction(&self, start: Option<i64>, end: i64) -> EngineResult<Option<f64>> {
        Ok(self.conn.query_row(
            "SELECT AVG(satisfaction_score) FROM outcomes
             WHERE satisfaction_score IS NOT NULL
               AND (?1 IS NULL OR recorded_at >= ?1) AND recorded_at < ?2",
            params![start, end],
            |r| r.get(0),
        )?)
    }

    /// Resolved and successful outcome counts per day (unix day index).
    /// Feeds the rolling success-rate trend.
    pub fn daily_outcome_buckets(
        &self,
        start: Option<i64>,
        end: i64,
    ) -> EngineResult<Vec<(i64, i64, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT recorded_at / 86400 AS day,
                    SUM(CASE WHEN outcome_type != 'unresolved' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN outcome_type = 'successful_transition' THEN 1 ELSE 0 END)
             FROM outcomes
             WHERE (?1 IS NULL OR recorded_at >= ?1) AND recorded_at < ?2
             GROUP BY day ORDER BY day",
        )?;
        let rows = stmt
            .query_map(params![start, end], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Average composite score and sample count per industry. Assessments
    /// without an industry tag land in the `unknown` row.
    pub fn heat_map_rows(
        &self,
        start: Option<i64>,
        end: i64,
    ) -> EngineResult<Vec<(String, f64, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(json_extract(risk_factors_json, '$.industry'), 'unknown'),
                    AVG(composite_risk_score),
                    COUNT(*)
             FROM risk_assessments
             WHERE (?1 IS NULL OR created_at >= ?1) AND created_at < ?2
             GROUP BY 1 ORDER BY 2 DESC",
        )?;
        let rows = stmt
            .query_map(params![start, end], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
