//! Forecast persistence and back-testing queries.

use super::{ts_to_datetime, RiskStore};
use crate::error::EngineResult;
use crate::model::{Forecast, ForecastType};
use crate::types::RecordId;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

impl RiskStore {
    #[allow(clippy::too_many_arguments)]
    pub fn insert_forecast(
        &self,
        forecast_type: ForecastType,
        target_entity: &str,
        horizon_days: i64,
        predicted_score: f64,
        confidence_low: f64,
        confidence_high: f64,
        generated_at: DateTime<Utc>,
    ) -> EngineResult<RecordId> {
        self.conn.execute(
            "INSERT INTO forecasts
                 (forecast_type, target_entity, horizon_days, predicted_score,
                  confidence_low, confidence_high, generated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                forecast_type.as_str(),
                target_entity,
                horizon_days,
                predicted_score,
                confidence_low,
                confidence_high,
                generated_at.timestamp(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_forecast(&self, id: RecordId) -> EngineResult<Option<Forecast>> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, forecast_type, target_entity, horizon_days, predicted_score,
                        confidence_low, confidence_high, generated_at, realized_outcome
                 FROM forecasts WHERE id=?1",
                params![id],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, i64>(3)?,
                        r.get::<_, f64>(4)?,
                        r.get::<_, f64>(5)?,
                        r.get::<_, f64>(6)?,
                        r.get::<_, i64>(7)?,
                        r.get::<_, Option<f64>>(8)?,
                    ))
                },
            )
            .optional()?;

        match raw {
            None => Ok(None),
            Some((id, type_token, entity, horizon, predicted, low, high, ts, realized)) => {
                Ok(Some(Forecast {
                    id,
                    forecast_type: ForecastType::parse(&type_token)?,
                    target_entity: entity,
                    horizon_days: horizon,
                    predicted_score: predicted,
                    confidence_low: low,
                    confidence_high: high,
                    generated_at: ts_to_datetime(ts),
                    realized_outcome: realized,
                }))
            }
        }
    }

    /// Returns false when the forecast does not exist.
    pub fn set_realized_outcome(&self, id: RecordId, realized: f64) -> EngineResult<bool> {
        let changed = self.conn.execute(
            "UPDATE forecasts SET realized_outcome=?1 WHERE id=?2",
            params![realized, id],
        )?;
        Ok(changed > 0)
    }

    /// (predicted, realized) pairs for forecasts generated inside the
    /// lookback whose horizon has elapsed and whose realized outcome is
    /// known. Unmatured or unrealized forecasts are excluded, not penalized.
    pub fn matured_forecast_pairs(
        &self,
        lookback_start: i64,
        now: i64,
    ) -> EngineResult<Vec<(f64, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT predicted_score, realized_outcome FROM forecasts
             WHERE realized_outcome IS NOT NULL
               AND generated_at >= ?1
               AND generated_at + horizon_days * 86400 <= ?2
             ORDER BY generated_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![lookback_start, now], |r| {
                Ok((r.get::<_, f64>(0)?, r.get::<_, Option<f64>>(1)?.unwrap_or(0.0)))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_forecasts(&self) -> EngineResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM forecasts", [], |r| r.get(0))?)
    }
}
