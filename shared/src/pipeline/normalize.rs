//! Record normalization
//!
//! Maps each export's header variants onto canonical fields and parses
//! dates and numbers coercively: a cell that fails to parse becomes null and
//! the row is filtered, the run carries on.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, warn};

use super::identity::resolve_identity;
use super::raw::RawTable;
use super::{PipelineError, PipelineResult, SourceKind};
use crate::models::{
    FireEvent, SupplyRecord, TemperatureRecord, WeatherObservation, DEFAULT_AIR_TEMP,
    DEFAULT_HUMIDITY, DEFAULT_PRECIP,
};

/// A canonical field and the header spellings it is known under, in
/// priority order
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
}

impl ColumnSpec {
    const fn new(canonical: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { canonical, aliases }
    }
}

pub const YARD: ColumnSpec = ColumnSpec::new("yard", &["Склад", "yard", "sklad"]);
pub const STACK: ColumnSpec = ColumnSpec::new("stack", &["Штабель", "stack", "shtabel"]);

pub const FIRE_DATE: ColumnSpec = ColumnSpec::new(
    "fire_date",
    &["Дата возгорания", "Дата начала", "fire_date", "date_fire"],
);
pub const FIRE_GRADE: ColumnSpec = ColumnSpec::new("grade", &["Марка", "Груз", "grade", "mark"]);
pub const FIRE_FORMED: ColumnSpec = ColumnSpec::new(
    "formed_on",
    &["Формирование штабеля", "Нач.форм.штабеля", "formed_at", "formed_on"],
);

pub const SUPPLY_ARRIVAL: ColumnSpec = ColumnSpec::new(
    "arrival_date",
    &["Дата поступления", "ВыгрузкаНаСклад", "arrival_date", "date_in"],
);
pub const SUPPLY_DEPARTURE: ColumnSpec = ColumnSpec::new(
    "departure_date",
    &["Дата отправления", "ПогрузкаНаСудно", "departure_date", "date_out"],
);
pub const SUPPLY_GRADE: ColumnSpec =
    ColumnSpec::new("grade", &["Марка", "Наим. ЕТСНГ", "grade", "mark"]);

pub const TEMPERATURE_DATE: ColumnSpec =
    ColumnSpec::new("record_date", &["Дата акта", "Дата", "record_date", "date"]);
pub const TEMPERATURE_MAX: ColumnSpec = ColumnSpec::new(
    "max_temperature",
    &["Максимальная температура", "max_temperature", "max_temp"],
);

pub const WEATHER_TIMESTAMP: ColumnSpec =
    ColumnSpec::new("timestamp", &["datetime", "date", "ts", "timestamp"]);
pub const WEATHER_AIR_TEMP: ColumnSpec = ColumnSpec::new("temp_air", &["temp_air", "t", "air_temp"]);
pub const WEATHER_HUMIDITY: ColumnSpec = ColumnSpec::new("humidity", &["humidity"]);
pub const WEATHER_PRECIP: ColumnSpec =
    ColumnSpec::new("precip", &["precip", "precipitation"]);
pub const WEATHER_PRESSURE: ColumnSpec = ColumnSpec::new("pressure", &["pressure", "p"]);

/// Records that survived normalization, with drop counts
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    /// Rows dropped because a mandatory date did not parse
    pub invalid_dates: usize,
    /// Rows dropped because yard or stack was missing
    pub invalid_identity: usize,
    /// Canonical columns absent from the export and filled with defaults
    pub defaulted_columns: Vec<&'static str>,
}

impl<T> Normalized<T> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            invalid_dates: 0,
            invalid_identity: 0,
            defaulted_columns: Vec::new(),
        }
    }

    pub fn dropped(&self) -> usize {
        self.invalid_dates + self.invalid_identity
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn required(table: &RawTable, source_kind: SourceKind, spec: ColumnSpec) -> PipelineResult<usize> {
    table
        .column(spec.aliases)
        .ok_or(PipelineError::MissingColumn {
            source_kind,
            column: spec.canonical,
        })
}

/// Parse a calendar date, ignoring any time component.
///
/// Accepts ISO dates and date-times, `DD.MM.YYYY` with optional time and
/// RFC 3339 timestamps (which keep their local date).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    parse_datetime(raw).map(|dt| dt.date())
}

/// Parse a timestamp; a bare date reads as midnight
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%d.%m.%Y %H:%M:%S",
        "%d.%m.%Y %H:%M",
        "%Y/%m/%d %H:%M:%S",
    ];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%Y/%m/%d"];
    const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"];

    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.naive_local());
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, format) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// Parse a measurement. Decimal commas are accepted; non-finite values read
/// as missing.
pub fn parse_number(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().replace(',', ".").parse().ok()?;
    value.is_finite().then_some(value)
}

/// Normalize the fire-act export
pub fn normalize_fires(table: &RawTable) -> PipelineResult<Normalized<FireEvent>> {
    let source = SourceKind::Fires;
    let yard = required(table, source, YARD)?;
    let stack = required(table, source, STACK)?;
    let date = required(table, source, FIRE_DATE)?;
    let grade = table.column(FIRE_GRADE.aliases);
    let formed = table.column(FIRE_FORMED.aliases);

    let mut out = Normalized::new();
    for row in 0..table.len() {
        let Some(fire_date) = table.cell(row, Some(date)).and_then(parse_date) else {
            out.invalid_dates += 1;
            continue;
        };
        let Some(stockpile) = resolve_identity(table.cell(row, Some(yard)), table.cell(row, Some(stack)))
        else {
            out.invalid_identity += 1;
            continue;
        };
        out.records.push(FireEvent {
            stockpile,
            fire_date,
            grade: table.cell(row, grade).map(str::to_string),
            formed_on: table.cell(row, formed).and_then(parse_date),
        });
    }

    log_normalized(source, table.len(), &out);
    Ok(out)
}

/// Normalize the supply (arrival/shipment) export
pub fn normalize_supplies(table: &RawTable) -> PipelineResult<Normalized<SupplyRecord>> {
    let source = SourceKind::Supplies;
    let yard = required(table, source, YARD)?;
    let stack = required(table, source, STACK)?;
    let arrival = required(table, source, SUPPLY_ARRIVAL)?;
    let departure = table.column(SUPPLY_DEPARTURE.aliases);
    let grade = table.column(SUPPLY_GRADE.aliases);

    let mut out = Normalized::new();
    for row in 0..table.len() {
        let Some(arrival_date) = table.cell(row, Some(arrival)).and_then(parse_date) else {
            out.invalid_dates += 1;
            continue;
        };
        let Some(stockpile) = resolve_identity(table.cell(row, Some(yard)), table.cell(row, Some(stack)))
        else {
            out.invalid_identity += 1;
            continue;
        };
        out.records.push(SupplyRecord {
            stockpile,
            arrival_date,
            departure_date: table.cell(row, departure).and_then(parse_date),
            grade: table.cell(row, grade).map(str::to_string),
        });
    }

    log_normalized(source, table.len(), &out);
    Ok(out)
}

/// Normalize the temperature-act export. Piket and shift columns are
/// ignored. An unparsable maximum temperature is kept as `None` here and
/// removed during assembly.
pub fn normalize_temperature(table: &RawTable) -> PipelineResult<Normalized<TemperatureRecord>> {
    let source = SourceKind::Temperature;
    let yard = required(table, source, YARD)?;
    let stack = required(table, source, STACK)?;
    let date = required(table, source, TEMPERATURE_DATE)?;
    let max_temp = required(table, source, TEMPERATURE_MAX)?;

    let mut out = Normalized::new();
    for row in 0..table.len() {
        let Some(record_date) = table.cell(row, Some(date)).and_then(parse_date) else {
            out.invalid_dates += 1;
            continue;
        };
        let Some(stockpile) = resolve_identity(table.cell(row, Some(yard)), table.cell(row, Some(stack)))
        else {
            out.invalid_identity += 1;
            continue;
        };
        out.records.push(TemperatureRecord {
            stockpile,
            record_date,
            max_temperature: table.cell(row, Some(max_temp)).and_then(parse_number),
        });
    }

    log_normalized(source, table.len(), &out);
    Ok(out)
}

/// Normalize weather observations.
///
/// Only the timestamp is mandatory. A measurement column missing from the
/// export entirely is filled with its documented default (air 20.0 °C,
/// humidity 60 %, precipitation 0 mm); a blank cell in a present column stays
/// `None` for the fill policy to resolve.
pub fn normalize_weather(table: &RawTable) -> PipelineResult<Normalized<WeatherObservation>> {
    let source = SourceKind::Weather;
    let timestamp = required(table, source, WEATHER_TIMESTAMP)?;
    let air = table.column(WEATHER_AIR_TEMP.aliases);
    let humidity = table.column(WEATHER_HUMIDITY.aliases);
    let precip = table.column(WEATHER_PRECIP.aliases);
    let pressure = table.column(WEATHER_PRESSURE.aliases);

    let mut out = Normalized::new();
    for (column, spec) in [
        (air, WEATHER_AIR_TEMP),
        (humidity, WEATHER_HUMIDITY),
        (precip, WEATHER_PRECIP),
    ] {
        if column.is_none() {
            warn!(column = spec.canonical, "Weather column missing, using default");
            out.defaulted_columns.push(spec.canonical);
        }
    }

    let measure = |row: usize, column: Option<usize>, default: f64| match column {
        Some(_) => table.cell(row, column).and_then(parse_number),
        None => Some(default),
    };

    for row in 0..table.len() {
        let Some(ts) = table.cell(row, Some(timestamp)).and_then(parse_datetime) else {
            out.invalid_dates += 1;
            continue;
        };
        out.records.push(WeatherObservation {
            timestamp: ts,
            air_temp: measure(row, air, DEFAULT_AIR_TEMP),
            humidity: measure(row, humidity, DEFAULT_HUMIDITY),
            precipitation: measure(row, precip, DEFAULT_PRECIP),
            pressure: table.cell(row, pressure).and_then(parse_number),
        });
    }

    log_normalized(source, table.len(), &out);
    Ok(out)
}

fn log_normalized<T>(source: SourceKind, total: usize, out: &Normalized<T>) {
    if out.dropped() > 0 {
        warn!(
            source = %source,
            total,
            kept = out.records.len(),
            invalid_dates = out.invalid_dates,
            invalid_identity = out.invalid_identity,
            "Dropped malformed rows"
        );
    } else {
        debug!(source = %source, total, "Normalized source");
    }
}
