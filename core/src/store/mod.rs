//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! Tracker, predictive and dashboard call store methods — they never
//! execute SQL directly.
//!
//! Timestamps are unix seconds. Structured payloads live in JSON text
//! columns; they are decoded back into their schema types here, at the
//! store boundary, so callers never see raw JSON.

mod forecast;
mod metrics;

pub use metrics::OutcomeBucketStats;

use crate::error::EngineResult;
use crate::model::{
    Intervention, InterventionPayload, InterventionType, Outcome, OutcomeDetails, OutcomeType,
    RiskAssessment, RiskFactors, SuccessStory,
};
use crate::types::RecordId;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;

pub struct RiskStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for files and URIs
}

pub(crate) fn ts_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

impl RiskStore {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in single-connection tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Open a new connection to the same database. The dashboard gives each
    /// fan-out branch its own connection through this. For plain `:memory:`
    /// stores the new connection is isolated — concurrent callers should use
    /// a `file:name?mode=memory&cache=shared` URI instead.
    pub fn reopen(&self) -> EngineResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_career_protection.sql"))?;
        Ok(())
    }

    // ── Assessments ────────────────────────────────────────────

    pub fn insert_assessment(
        &self,
        user_id: &str,
        risk_factors: &RiskFactors,
        industry_risk_score: f64,
        company_risk_score: f64,
        composite_risk_score: f64,
        confidence: f64,
        created_at: DateTime<Utc>,
    ) -> EngineResult<RecordId> {
        let factors_json = serde_json::to_string(risk_factors)?;
        self.conn.execute(
            "INSERT INTO risk_assessments
                 (user_id, risk_factors_json, industry_risk_score, company_risk_score,
                  composite_risk_score, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user_id,
                factors_json,
                industry_risk_score,
                company_risk_score,
                composite_risk_score,
                confidence,
                created_at.timestamp(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_assessment(&self, id: RecordId) -> EngineResult<Option<RiskAssessment>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, user_id, risk_factors_json, industry_risk_score,
                        company_risk_score, composite_risk_score, confidence, created_at
                 FROM risk_assessments WHERE id=?1",
                params![id],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, f64>(3)?,
                        r.get::<_, f64>(4)?,
                        r.get::<_, f64>(5)?,
                        r.get::<_, f64>(6)?,
                        r.get::<_, i64>(7)?,
                    ))
                },
            )
            .optional()?;

        match raw {
            None => Ok(None),
            Some((id, user_id, factors_json, industry, company, composite, confidence, ts)) => {
                Ok(Some(RiskAssessment {
                    id,
                    user_id,
                    risk_factors: serde_json::from_str(&factors_json)?,
                    industry_risk_score: industry,
                    company_risk_score: company,
                    composite_risk_score: composite,
                    confidence,
                    created_at: ts_to_datetime(ts),
                }))
            }
        }
    }

    /// A user's assessment history, oldest first, capped at `limit` most
    /// recent points. Feeds trend extrapolation.
    pub fn user_score_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> EngineResult<Vec<(i64, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT created_at, composite_risk_score
             FROM risk_assessments WHERE user_id=?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let mut points = stmt
            .query_map(params![user_id, limit as i64], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        points.reverse();
        Ok(points)
    }

    /// Composite-score history for all assessments tagged with an industry.
    pub fn industry_score_history(
        &self,
        industry: &str,
        limit: usize,
    ) -> EngineResult<Vec<(i64, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT created_at, composite_risk_score
             FROM risk_assessments
             WHERE json_extract(risk_factors_json, '$.industry')=?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let mut points = stmt
            .query_map(params![industry, limit as i64], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        points.reverse();
        Ok(points)
    }

    /// Company-risk history for all assessments tagged with a company.
    pub fn company_score_history(
        &self,
        company: &str,
        limit: usize,
    ) -> EngineResult<Vec<(i64, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT created_at, company_risk_score
             FROM risk_assessments
             WHERE json_extract(risk_factors_json, '$.company')=?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let mut points = stmt
            .query_map(params![company, limit as i64], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        points.reverse();
        Ok(points)
    }

    /// Risk-factor payloads of assessments inside `[start, end)`, with their
    /// creation timestamps. Feeds emerging-pattern detection.
    pub fn risk_factors_in_window(
        &self,
        start: Option<i64>,
        end: i64,
    ) -> EngineResult<Vec<(i64, RiskFactors)>> {
        let mut stmt = self.conn.prepare(
            "SELECT created_at, risk_factors_json
             FROM risk_assessments
             WHERE (?1 IS NULL OR created_at >= ?1) AND created_at < ?2
             ORDER BY created_at ASC, id ASC",
        )?;
        let raw = stmt
            .query_map(params![start, end], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(raw.len());
        for (ts, json) in raw {
            rows.push((ts, serde_json::from_str(&json)?));
        }
        Ok(rows)
    }

    // ── Interventions ──────────────────────────────────────────

    pub fn insert_intervention(
        &self,
        user_id: &str,
        risk_assessment_id: RecordId,
        intervention_type: InterventionType,
        payload: &InterventionPayload,
        triggered_at: DateTime<Utc>,
    ) -> EngineResult<RecordId> {
        let payload_json = serde_json::to_string(payload)?;
        self.conn.execute(
            "INSERT INTO interventions
                 (user_id, risk_assessment_id, type, payload_json, triggered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                risk_assessment_id,
                intervention_type.as_str(),
                payload_json,
                triggered_at.timestamp(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_intervention(&self, id: RecordId) -> EngineResult<Option<Intervention>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, user_id, risk_assessment_id, type, payload_json, triggered_at
                 FROM interventions WHERE id=?1",
                params![id],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;

        match raw {
            None => Ok(None),
            Some((id, user_id, assessment_id, type_token, payload_json, ts)) => {
                Ok(Some(Intervention {
                    id,
                    user_id,
                    risk_assessment_id: assessment_id,
                    intervention_type: InterventionType::parse(&type_token)?,
                    payload: serde_json::from_str(&payload_json)?,
                    triggered_at: ts_to_datetime(ts),
                }))
            }
        }
    }

    // ── Outcomes ───────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn insert_outcome(
        &self,
        user_id: &str,
        risk_assessment_id: RecordId,
        intervention_id: Option<RecordId>,
        outcome_type: OutcomeType,
        details: &OutcomeDetails,
        salary_change: Option<f64>,
        time_to_new_role_days: Option<i64>,
        satisfaction_score: Option<i64>,
        would_recommend: Option<bool>,
        recorded_at: DateTime<Utc>,
    ) -> EngineResult<RecordId> {
        let details_json = serde_json::to_string(details)?;
        self.conn.execute(
            "INSERT INTO outcomes
                 (user_id, risk_assessment_id, intervention_id, outcome_type, details_json,
                  salary_change, time_to_new_role_days, satisfaction_score,
                  would_recommend, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user_id,
                risk_assessment_id,
                intervention_id,
                outcome_type.as_str(),
                details_json,
                salary_change,
                time_to_new_role_days,
                satisfaction_score,
                would_recommend.map(i64::from),
                recorded_at.timestamp(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_outcome(&self, id: RecordId) -> EngineResult<Option<Outcome>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, user_id, risk_assessment_id, intervention_id, outcome_type,
                        details_json, salary_change, time_to_new_role_days,
                        satisfaction_score, would_recommend, recorded_at
                 FROM outcomes WHERE id=?1",
                params![id],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, i64>(2)?,
                        r.get::<_, Option<i64>>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, String>(5)?,
                        r.get::<_, Option<f64>>(6)?,
                        r.get::<_, Option<i64>>(7)?,
                        r.get::<_, Option<i64>>(8)?,
                        r.get::<_, Option<i64>>(9)?,
                        r.get::<_, i64>(10)?,
                    ))
                },
            )
            .optional()?;

        match raw {
            None => Ok(None),
            Some((
                id,
                user_id,
                assessment_id,
                intervention_id,
                type_token,
                details_json,
                salary_change,
                time_to_new_role_days,
                satisfaction_score,
                would_recommend,
                ts,
            )) => Ok(Some(Outcome {
                id,
                user_id,
                risk_assessment_id: assessment_id,
                intervention_id,
                outcome_type: OutcomeType::parse(&type_token)?,
                details: serde_json::from_str(&details_json)?,
                salary_change,
                time_to_new_role_days,
                satisfaction_score,
                would_recommend: would_recommend.map(|v| v != 0),
                recorded_at: ts_to_datetime(ts),
            })),
        }
    }

    // ── Success stories ────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn insert_story(
        &self,
        user_id: &str,
        story_type: &str,
        title: &str,
        description: &str,
        risk_factors_snapshot: &RiskFactors,
        intervention_timeline: &BTreeMap<String, DateTime<Utc>>,
        outcome_details: &OutcomeDetails,
        user_satisfaction: i64,
        would_recommend: bool,
        created_at: DateTime<Utc>,
    ) -> EngineResult<RecordId> {
        let snapshot_json = serde_json::to_string(risk_factors_snapshot)?;
        let timeline_json = serde_json::to_string(intervention_timeline)?;
        let details_json = serde_json::to_string(outcome_details)?;
        self.conn.execute(
            "INSERT INTO success_stories
                 (user_id, story_type, title, description, risk_factors_snapshot_json,
                  timeline_json, outcome_details_json, satisfaction, would_recommend,
                  created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user_id,
                story_type,
                title,
                description,
                snapshot_json,
                timeline_json,
                details_json,
                user_satisfaction,
                i64::from(would_recommend),
                created_at.timestamp(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent stories first, capped at `limit`.
    pub fn recent_stories(&self, limit: i64) -> EngineResult<Vec<SuccessStory>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, story_type, title, description,
                    risk_factors_snapshot_json, timeline_json, outcome_details_json,
                    satisfaction, would_recommend, created_at
             FROM success_stories
             ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let raw = stmt
            .query_map(params![limit], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, String>(7)?,
                    r.get::<_, i64>(8)?,
                    r.get::<_, i64>(9)?,
                    r.get::<_, i64>(10)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stories = Vec::with_capacity(raw.len());
        for (
            id,
            user_id,
            story_type,
            title,
            description,
            snapshot_json,
            timeline_json,
            details_json,
            satisfaction,
            would_recommend,
            ts,
        ) in raw
        {
            stories.push(SuccessStory {
                id,
                user_id,
                story_type,
                title,
                description,
                original_risk_factors: serde_json::from_str(&snapshot_json)?,
                intervention_timeline: serde_json::from_str(&timeline_json)?,
                outcome_details: serde_json::from_str(&details_json)?,
                user_satisfaction: satisfaction,
                would_recommend: would_recommend != 0,
                created_at: ts_to_datetime(ts),
            });
        }
        Ok(stories)
    }
}
