//! Read-only access to the operational database
//!
//! The schema belongs to the yard management application; this service only
//! reads stockpiles, their temperature acts, weather and stored predictions.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use shared::models::WeatherObservation;
use shared::pipeline::{resolve_identity, TemperaturePoint};
use shared::types::StockpileId;
use sqlx::{FromRow, PgPool};

use crate::error::{AppError, AppResult};

/// Days of temperature history loaded with a stockpile
pub const TEMPERATURE_HISTORY_DAYS: i64 = 90;

/// Stockpile row joined with its yard
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StockpileRow {
    pub shtabel_id: i32,
    pub sklad_id: i32,
    pub label: Option<String>,
    pub mark: Option<String>,
    pub formed_at: Option<NaiveDateTime>,
    pub last_temp: Option<f64>,
    pub last_temp_date: Option<NaiveDateTime>,
    pub status: Option<String>,
    pub sklad_number: Option<i32>,
    pub sklad_name: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
struct TempRecordRow {
    record_date: NaiveDateTime,
    max_temp: Option<f64>,
}

#[derive(Debug, Clone, FromRow)]
struct WeatherRow {
    ts: NaiveDateTime,
    t: Option<f64>,
    p: Option<f64>,
    humidity: Option<f64>,
    precipitation: Option<f64>,
}

/// A stored prediction with the fire that actually followed
#[derive(Debug, Clone, FromRow)]
pub struct PredictionOutcome {
    pub predicted_date: Option<NaiveDateTime>,
    pub actual_fire_date: Option<NaiveDateTime>,
    pub accuracy_days: Option<f64>,
}

/// Start of the day after `day`, saturating at the end of the calendar
fn day_end(day: NaiveDate) -> NaiveDateTime {
    day.succ_opt()
        .map(|next| next.and_time(NaiveTime::MIN))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Half-open timestamp range `[start, end)` of the temperature acts known on
/// `as_of`: the trailing history window up to the end of that day.
fn history_window(as_of: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = as_of
        .checked_sub_signed(Duration::days(TEMPERATURE_HISTORY_DAYS))
        .unwrap_or(NaiveDate::MIN);
    (start.and_time(NaiveTime::MIN), day_end(as_of))
}

impl PredictionOutcome {
    /// Predicted minus actual, in fractional days. Uses the stored value
    /// when present.
    pub fn error_days(&self) -> Option<f64> {
        if let Some(days) = self.accuracy_days {
            return Some(days);
        }
        let (predicted, actual) = (self.predicted_date?, self.actual_fire_date?);
        Some((predicted - actual).num_seconds() as f64 / 86_400.0)
    }
}

/// Everything needed to build point-in-time features for one stockpile
#[derive(Debug, Clone)]
pub struct StockpileSnapshot {
    pub stockpile: StockpileRow,
    pub temperatures: Vec<TemperaturePoint>,
}

impl StockpileSnapshot {
    /// `"{yard}_{stack}"` key when the yard number and stack label resolve
    pub fn stack_id(&self) -> Option<StockpileId> {
        let yard = self.stockpile.sklad_number.map(|n| n.to_string());
        resolve_identity(yard.as_deref(), self.stockpile.label.as_deref())
    }

    pub fn formed_on(&self) -> Option<NaiveDate> {
        self.stockpile.formed_at.map(|dt| dt.date())
    }
}

/// Repository over the yard database
#[derive(Clone)]
pub struct StockpileService {
    db: PgPool,
}

impl StockpileService {
    /// Create a new StockpileService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Load a stockpile with its recent temperature acts
    pub async fn get_snapshot(&self, shtabel_id: i32, as_of: NaiveDate) -> AppResult<StockpileSnapshot> {
        let stockpile = sqlx::query_as::<_, StockpileRow>(
            r#"
            SELECT s.id AS shtabel_id, s.sklad_id, s.label, s.mark, s.formed_at,
                   s.last_temp, s.last_temp_date, s.status,
                   sk.number AS sklad_number, sk.name AS sklad_name
            FROM "Shtabel" s
            JOIN "Sklad" sk ON s.sklad_id = sk.id
            WHERE s.id = $1
            "#,
        )
        .bind(shtabel_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Stockpile {}", shtabel_id)))?;

        let (since, until) = history_window(as_of);
        let temperatures = sqlx::query_as::<_, TempRecordRow>(
            r#"
            SELECT record_date, max_temp
            FROM "TempRecord"
            WHERE shtabel_id = $1 AND record_date >= $2 AND record_date < $3
            ORDER BY record_date DESC
            "#,
        )
        .bind(shtabel_id)
        .bind(since)
        .bind(until)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|row| TemperaturePoint {
            date: row.record_date.date(),
            max_temperature: row.max_temp,
        })
        .collect();

        Ok(StockpileSnapshot {
            stockpile,
            temperatures,
        })
    }

    /// Weather observations for one calendar day
    pub async fn get_weather_for_day(&self, day: NaiveDate) -> AppResult<Vec<WeatherObservation>> {
        let start = day.and_time(NaiveTime::MIN);
        let end = day_end(day);
        let rows = sqlx::query_as::<_, WeatherRow>(
            r#"
            SELECT ts, t, p, humidity, precipitation
            FROM "Weather"
            WHERE ts >= $1 AND ts < $2
            ORDER BY ts ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| WeatherObservation {
                timestamp: row.ts,
                air_temp: row.t,
                humidity: row.humidity,
                precipitation: row.precipitation,
                pressure: row.p,
            })
            .collect())
    }

    /// Stored predictions that have both a predicted and an actual fire date
    pub async fn predictions_with_actual_fires(
        &self,
        model_name: Option<&str>,
        model_version: Option<&str>,
    ) -> AppResult<Vec<PredictionOutcome>> {
        let rows = sqlx::query_as::<_, PredictionOutcome>(
            r#"
            SELECT p.predicted_date, p.actual_fire_date, p.accuracy_days
            FROM "Prediction" p
            WHERE p.predicted_date IS NOT NULL
              AND p.actual_fire_date IS NOT NULL
              AND ($1::text IS NULL OR p.model_name = $1)
              AND ($2::text IS NULL OR p.model_version = $2)
            ORDER BY p.ts DESC
            "#,
        )
        .bind(model_name)
        .bind(model_version)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Connectivity check for the health endpoint
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.db).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_error_days_from_dates() {
        let outcome = PredictionOutcome {
            predicted_date: Some(dt("2020-08-07 12:00")),
            actual_fire_date: Some(dt("2020-08-05 00:00")),
            accuracy_days: None,
        };
        assert_eq!(outcome.error_days(), Some(2.5));
    }

    #[test]
    fn test_error_days_prefers_stored_value() {
        let outcome = PredictionOutcome {
            predicted_date: Some(dt("2020-08-07 00:00")),
            actual_fire_date: Some(dt("2020-08-05 00:00")),
            accuracy_days: Some(-1.0),
        };
        assert_eq!(outcome.error_days(), Some(-1.0));
    }

    #[test]
    fn test_history_window_ends_with_as_of_day() {
        let (since, until) = history_window(NaiveDate::from_ymd_opt(2020, 8, 4).unwrap());
        assert_eq!(since, dt("2020-05-06 00:00"));
        assert_eq!(until, dt("2020-08-05 00:00"));
        // acts recorded later that day are known; next-day acts are not
        assert!(dt("2020-08-04 23:30") < until);
        assert!(dt("2020-08-05 08:00") >= until);
    }

    #[test]
    fn test_history_window_at_calendar_edges() {
        let (since, until) = history_window(NaiveDate::MAX);
        assert_eq!(until, NaiveDateTime::MAX);
        assert!(since < until);

        let (since, _) = history_window(NaiveDate::MIN);
        assert_eq!(since, NaiveDate::MIN.and_time(NaiveTime::MIN));
    }

    #[test]
    fn test_snapshot_stack_id() {
        let snapshot = StockpileSnapshot {
            stockpile: StockpileRow {
                shtabel_id: 7,
                sklad_id: 2,
                label: Some("04".to_string()),
                mark: None,
                formed_at: Some(dt("2020-07-01 08:00")),
                last_temp: Some(80.0),
                last_temp_date: None,
                status: None,
                sklad_number: Some(6),
                sklad_name: None,
            },
            temperatures: vec![],
        };
        assert_eq!(snapshot.stack_id().map(|id| id.as_str().to_string()), Some("6_4".to_string()));
        assert_eq!(snapshot.formed_on(), NaiveDate::from_ymd_opt(2020, 7, 1));
    }
}
