//! Dataset assembly
//!
//! One entry point for every consumer (offline training, CSV scoring, CSV
//! validation). Callers choose the delta definition and whether labels are
//! attached; the steps themselves never vary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::labeling::FireIndex;
use super::normalize::{normalize_fires, normalize_supplies, normalize_temperature, normalize_weather};
use super::raw::RawTable;
use super::table::FeatureTable;
use super::temporal::{aggregate_daily_weather, DeltaMode, StockStart, TemperaturePoint};
use super::{PipelineError, PipelineResult, SourceKind};
use crate::models::{
    DailyWeather, FeatureRow, FireEvent, SupplyRecord, TemperatureRecord, WeatherObservation,
    DEFAULT_AIR_TEMP, DEFAULT_HUMIDITY, DEFAULT_PRECIP,
};
use crate::types::StockpileId;

/// Whether the emitted table carries the fire label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyMode {
    Training,
    Inference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyOptions {
    pub mode: AssemblyMode,
    pub delta_mode: DeltaMode,
}

impl AssemblyOptions {
    /// Labeled output, ordinal delta
    pub fn training() -> Self {
        Self {
            mode: AssemblyMode::Training,
            delta_mode: DeltaMode::OrdinalLag,
        }
    }

    /// Unlabeled output, ordinal delta
    pub fn inference() -> Self {
        Self {
            mode: AssemblyMode::Inference,
            delta_mode: DeltaMode::OrdinalLag,
        }
    }

    pub fn with_delta_mode(mut self, delta_mode: DeltaMode) -> Self {
        self.delta_mode = delta_mode;
        self
    }
}

/// Weather source for a run
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherInput {
    Table(RawTable),
    /// The caller has no weather export; every row takes the defaults.
    /// Distinct from a table that is present but empty, which is fatal.
    Unavailable,
}

/// The four raw exports for one run
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTables {
    pub fires: RawTable,
    pub supplies: RawTable,
    pub temperature: RawTable,
    pub weather: WeatherInput,
}

/// What the run dropped, defaulted or labeled
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyReport {
    pub fires_dropped: usize,
    pub supplies_dropped: usize,
    pub temperature_dropped: usize,
    pub weather_dropped: usize,
    /// Emitted rows whose stockpile has no supply record (age defaulted to 0)
    pub missing_stock_start: usize,
    /// Temperature acts dropped for having no maximum temperature
    pub missing_temperature: usize,
    /// Weather columns absent from the export
    pub weather_defaulted_columns: Vec<&'static str>,
    pub weather_unavailable: bool,
    pub rows: usize,
    pub positive_labels: usize,
}

/// Run the full pipeline over raw exports.
///
/// Fails with [`PipelineError::EmptySource`] when any provided source has no
/// usable rows after date parsing. Nothing is emitted in that case.
pub fn assemble_dataset(
    sources: &SourceTables,
    options: AssemblyOptions,
) -> PipelineResult<(FeatureTable, AssemblyReport)> {
    let fires = normalize_fires(&sources.fires)?;
    let supplies = normalize_supplies(&sources.supplies)?;
    let temperature = normalize_temperature(&sources.temperature)?;
    let weather = match &sources.weather {
        WeatherInput::Table(table) => Some(normalize_weather(table)?),
        WeatherInput::Unavailable => None,
    };

    ensure_non_empty(SourceKind::Fires, fires.is_empty())?;
    ensure_non_empty(SourceKind::Supplies, supplies.is_empty())?;
    ensure_non_empty(SourceKind::Temperature, temperature.is_empty())?;
    if let Some(weather) = &weather {
        ensure_non_empty(SourceKind::Weather, weather.is_empty())?;
    }

    let (table, mut report) = assemble_records(
        &fires.records,
        &supplies.records,
        &temperature.records,
        weather.as_ref().map(|w| w.records.as_slice()),
        options,
    );

    report.fires_dropped = fires.dropped();
    report.supplies_dropped = supplies.dropped();
    report.temperature_dropped = temperature.dropped();
    if let Some(weather) = weather {
        report.weather_dropped = weather.dropped();
        report.weather_defaulted_columns = weather.defaulted_columns;
    }

    info!(
        mode = ?options.mode,
        delta_mode = ?options.delta_mode,
        rows = report.rows,
        positives = report.positive_labels,
        fires_dropped = report.fires_dropped,
        supplies_dropped = report.supplies_dropped,
        temperature_dropped = report.temperature_dropped,
        weather_dropped = report.weather_dropped,
        missing_stock_start = report.missing_stock_start,
        missing_temperature = report.missing_temperature,
        "Feature table assembled"
    );

    Ok((table, report))
}

fn ensure_non_empty(source_kind: SourceKind, empty: bool) -> PipelineResult<()> {
    if empty {
        return Err(PipelineError::EmptySource { source_kind });
    }
    Ok(())
}

struct WorkRow<'a> {
    stockpile: &'a StockpileId,
    point: TemperaturePoint,
    age_days: Option<f64>,
    weather: Option<DailyWeather>,
    target: u8,
}

/// Assemble already-normalized records. `weather: None` means no weather
/// source at all; every row then takes the defaults.
pub fn assemble_records(
    fires: &[FireEvent],
    supplies: &[SupplyRecord],
    temperature: &[TemperatureRecord],
    weather: Option<&[WeatherObservation]>,
    options: AssemblyOptions,
) -> (FeatureTable, AssemblyReport) {
    let mut report = AssemblyReport {
        weather_unavailable: weather.is_none(),
        ..Default::default()
    };

    let fire_index = FireIndex::from_events(fires);
    let stock_start = StockStart::from_supplies(supplies);
    let daily: BTreeMap<_, _> = weather.map(aggregate_daily_weather).unwrap_or_default();

    let mut rows: Vec<WorkRow<'_>> = temperature
        .iter()
        .map(|record| WorkRow {
            stockpile: &record.stockpile,
            point: TemperaturePoint {
                date: record.record_date,
                max_temperature: record.max_temperature,
            },
            age_days: stock_start.age_days(&record.stockpile, record.record_date),
            weather: daily.get(&record.record_date).copied(),
            target: fire_index.label(&record.stockpile, record.record_date),
        })
        .collect();

    rows.sort_by(|a, b| {
        a.stockpile
            .cmp(b.stockpile)
            .then(a.point.date.cmp(&b.point.date))
    });

    let mut deltas = Vec::with_capacity(rows.len());
    for group in rows.chunk_by(|a, b| a.stockpile == b.stockpile) {
        let series: Vec<TemperaturePoint> = group.iter().map(|r| r.point).collect();
        deltas.extend(options.delta_mode.deltas(&series));
    }

    let before = rows.len();
    let kept: Vec<(WorkRow<'_>, f64)> = rows
        .into_iter()
        .zip(deltas)
        .filter(|(row, _)| row.point.max_temperature.is_some())
        .collect();
    report.missing_temperature = before - kept.len();

    let temp_air = fill_with_default(
        kept.iter().map(|(r, _)| r.weather.and_then(|w| w.temp_air)),
        DEFAULT_AIR_TEMP,
    );
    let humidity = fill_with_default(
        kept.iter().map(|(r, _)| r.weather.and_then(|w| w.humidity)),
        DEFAULT_HUMIDITY,
    );
    let precip = fill_with_default(
        kept.iter().map(|(r, _)| r.weather.and_then(|w| w.precip)),
        DEFAULT_PRECIP,
    );

    let mut missing_start: Vec<&StockpileId> = Vec::new();
    let mut out = Vec::with_capacity(kept.len());
    for (i, (row, delta)) in kept.into_iter().enumerate() {
        let age_days = row.age_days.unwrap_or_else(|| {
            report.missing_stock_start += 1;
            if missing_start.last() != Some(&row.stockpile) {
                missing_start.push(row.stockpile);
            }
            0.0
        });
        if row.target == 1 {
            report.positive_labels += 1;
        }
        out.push(FeatureRow {
            stack_id: row.stockpile.clone(),
            yard: row.stockpile.yard().to_string(),
            stack: row.stockpile.stack().to_string(),
            date: row.point.date,
            max_temperature: row.point.max_temperature.unwrap_or_default(),
            age_days,
            temp_air: temp_air[i],
            humidity: humidity[i],
            precip: precip[i],
            temp_delta_3d: delta,
            target: (options.mode == AssemblyMode::Training).then_some(row.target),
        });
    }

    if !missing_start.is_empty() {
        warn!(
            stockpiles = missing_start.len(),
            rows = report.missing_stock_start,
            "Stockpiles without supply records, age set to 0"
        );
    }
    if report.weather_unavailable {
        warn!("No weather source, using default weather for every row");
    }

    report.rows = out.len();
    let labeled = options.mode == AssemblyMode::Training;
    (FeatureTable::new(out, labeled), report)
}

/// Forward fill, then backward fill. Leading gaps take the first known
/// value; a column with no values at all stays empty.
pub fn fill_forward_backward(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut filled = values.to_vec();
    let mut last = None;
    for slot in filled.iter_mut() {
        match slot {
            Some(v) => last = Some(*v),
            None => *slot = last,
        }
    }
    let mut next = None;
    for slot in filled.iter_mut().rev() {
        match slot {
            Some(v) => next = Some(*v),
            None => *slot = next,
        }
    }
    filled
}

fn fill_with_default(values: impl Iterator<Item = Option<f64>>, default: f64) -> Vec<f64> {
    let column: Vec<Option<f64>> = values.collect();
    fill_forward_backward(&column)
        .into_iter()
        .map(|v| v.unwrap_or(default))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn id(yard: &str, stack: &str) -> StockpileId {
        StockpileId::from_parts(yard, stack)
    }

    fn temp(yard: &str, stack: &str, d: NaiveDate, t: Option<f64>) -> TemperatureRecord {
        TemperatureRecord {
            stockpile: id(yard, stack),
            record_date: d,
            max_temperature: t,
        }
    }

    fn supply(yard: &str, stack: &str, d: NaiveDate) -> SupplyRecord {
        SupplyRecord {
            stockpile: id(yard, stack),
            arrival_date: d,
            departure_date: None,
            grade: None,
        }
    }

    #[test]
    fn test_fill_forward_then_backward() {
        let filled = fill_forward_backward(&[None, Some(1.0), None, None, Some(4.0), None]);
        assert_eq!(
            filled,
            vec![Some(1.0), Some(1.0), Some(1.0), Some(1.0), Some(4.0), Some(4.0)]
        );
        assert_eq!(fill_forward_backward(&[None, None]), vec![None, None]);
    }

    #[test]
    fn test_rows_sorted_and_nulls_dropped() {
        let temperature = vec![
            temp("6", "4", date(2020, 8, 6), Some(60.0)),
            temp("12", "1", date(2020, 8, 1), Some(30.0)),
            temp("6", "4", date(2020, 8, 4), None),
            temp("6", "4", date(2020, 8, 2), Some(40.0)),
        ];
        let (table, report) = assemble_records(
            &[],
            &[supply("6", "4", date(2020, 7, 1))],
            &temperature,
            None,
            AssemblyOptions::inference(),
        );
        let keys: Vec<_> = table
            .rows()
            .iter()
            .map(|r| (r.stack_id.as_str().to_string(), r.date))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("12_1".to_string(), date(2020, 8, 1)),
                ("6_4".to_string(), date(2020, 8, 2)),
                ("6_4".to_string(), date(2020, 8, 6)),
            ]
        );
        assert_eq!(report.missing_temperature, 1);
        assert_eq!(report.missing_stock_start, 1);
        assert!(report.weather_unavailable);
        assert!(table.rows().iter().all(|r| r.target.is_none()));
        assert!(table.rows().iter().all(|r| r.temp_air == DEFAULT_AIR_TEMP));
    }

    #[test]
    fn test_ordinal_delta_counts_null_acts_before_drop() {
        let temperature = vec![
            temp("1", "1", date(2020, 8, 1), Some(10.0)),
            temp("1", "1", date(2020, 8, 2), None),
            temp("1", "1", date(2020, 8, 3), Some(30.0)),
            temp("1", "1", date(2020, 8, 4), Some(45.0)),
        ];
        let (table, _) = assemble_records(&[], &[], &temperature, None, AssemblyOptions::training());
        let deltas: Vec<_> = table.rows().iter().map(|r| r.temp_delta_3d).collect();
        assert_eq!(deltas, vec![0.0, 0.0, 35.0]);
    }

    #[test]
    fn test_calendar_delta_mode() {
        let temperature = vec![
            temp("1", "1", date(2020, 8, 1), Some(10.0)),
            temp("1", "1", date(2020, 8, 3), Some(30.0)),
        ];
        let options = AssemblyOptions::training().with_delta_mode(DeltaMode::CalendarWindow);
        let (table, _) = assemble_records(&[], &[], &temperature, None, options);
        assert_eq!(table.rows()[1].temp_delta_3d, 20.0);
    }

    #[test]
    fn test_empty_weather_table_is_fatal_but_unavailable_is_not() {
        let sources = |weather| SourceTables {
            fires: RawTable::new(["Склад", "Штабель", "Дата возгорания"], vec![vec!["6", "4", "2020-08-05"]]),
            supplies: RawTable::new(["Склад", "Штабель", "Дата поступления"], vec![vec!["6", "4", "2020-07-01"]]),
            temperature: RawTable::new(
                ["Склад", "Штабель", "Дата акта", "Максимальная температура"],
                vec![vec!["6", "4", "2020-08-04", "220"]],
            ),
            weather,
        };

        let empty = WeatherInput::Table(RawTable::new(["date", "t"], Vec::<Vec<String>>::new()));
        let err = assemble_dataset(&sources(empty), AssemblyOptions::training()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::EmptySource {
                source_kind: SourceKind::Weather
            }
        ));

        let (table, report) =
            assemble_dataset(&sources(WeatherInput::Unavailable), AssemblyOptions::training()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(report.positive_labels, 1);
        assert_eq!(table.rows()[0].humidity, DEFAULT_HUMIDITY);
    }

    proptest! {
        #[test]
        fn prop_fill_idempotent(values in proptest::collection::vec(proptest::option::of(-100.0f64..100.0), 0..40)) {
            let once = fill_forward_backward(&values);
            let twice = fill_forward_backward(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
