//! Time-derived features: stockpile age, daily weather and the 3-step
//! temperature delta

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{
    DailyWeather, FeatureVector, SupplyRecord, WeatherObservation, DEFAULT_AIR_TEMP,
    DEFAULT_HUMIDITY, DEFAULT_PRECIP,
};
use crate::types::StockpileId;

/// Number of prior acts the ordinal lag looks back
pub const DELTA_LAG_STEPS: usize = 3;

/// Width of the calendar lookback window, in days
pub const DELTA_WINDOW_DAYS: i64 = 3;

/// Earliest arrival date per stockpile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockStart {
    starts: HashMap<StockpileId, NaiveDate>,
}

impl StockStart {
    pub fn from_supplies(supplies: &[SupplyRecord]) -> Self {
        let mut starts: HashMap<StockpileId, NaiveDate> = HashMap::new();
        for supply in supplies {
            starts
                .entry(supply.stockpile.clone())
                .and_modify(|d| *d = (*d).min(supply.arrival_date))
                .or_insert(supply.arrival_date);
        }
        Self { starts }
    }

    pub fn get(&self, stockpile: &StockpileId) -> Option<NaiveDate> {
        self.starts.get(stockpile).copied()
    }

    /// Age of the stockpile on `date`, or `None` when no supply was ever
    /// recorded for it
    pub fn age_days(&self, stockpile: &StockpileId, date: NaiveDate) -> Option<f64> {
        self.get(stockpile).map(|start| age_between(start, date))
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }
}

/// Whole days from `start` to `date`, never negative
pub fn age_between(start: NaiveDate, date: NaiveDate) -> f64 {
    (date - start).num_days().max(0) as f64
}

/// Collapse observations to one row per calendar date: maximum air
/// temperature, mean humidity and total precipitation. Missing values are
/// skipped; a day with no precipitation values totals 0.
pub fn aggregate_daily_weather(
    observations: &[WeatherObservation],
) -> BTreeMap<NaiveDate, DailyWeather> {
    #[derive(Default)]
    struct Acc {
        max_air: Option<f64>,
        humidity_sum: f64,
        humidity_n: usize,
        precip_sum: f64,
    }

    let mut days: BTreeMap<NaiveDate, Acc> = BTreeMap::new();
    for obs in observations {
        let acc = days.entry(obs.date()).or_default();
        if let Some(t) = obs.air_temp {
            acc.max_air = Some(acc.max_air.map_or(t, |m| m.max(t)));
        }
        if let Some(h) = obs.humidity {
            acc.humidity_sum += h;
            acc.humidity_n += 1;
        }
        if let Some(p) = obs.precipitation {
            acc.precip_sum += p;
        }
    }

    days.into_iter()
        .map(|(date, acc)| {
            let humidity = (acc.humidity_n > 0).then(|| acc.humidity_sum / acc.humidity_n as f64);
            (
                date,
                DailyWeather {
                    date,
                    temp_air: acc.max_air,
                    humidity,
                    precip: Some(acc.precip_sum),
                },
            )
        })
        .collect()
}

/// A dated temperature reading of one stockpile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperaturePoint {
    pub date: NaiveDate,
    pub max_temperature: Option<f64>,
}

/// How `temp_delta_3d` is measured.
///
/// The two definitions disagree whenever acts are not taken daily, so the
/// caller picks one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaMode {
    /// Difference to the act exactly three acts earlier in the stockpile's
    /// own series. Used for training and batch scoring.
    #[default]
    OrdinalLag,
    /// Difference to the most recent act in the three calendar days before
    /// the current one. Used for single-point serving.
    CalendarWindow,
}

impl DeltaMode {
    /// Deltas for one stockpile's series, which must already be sorted by
    /// date. Returns one value per point; anything without a reference
    /// reading is 0.
    pub fn deltas(&self, series: &[TemperaturePoint]) -> Vec<f64> {
        match self {
            DeltaMode::OrdinalLag => ordinal_deltas(series),
            DeltaMode::CalendarWindow => series
                .iter()
                .enumerate()
                .map(|(i, point)| match point.max_temperature {
                    Some(current) => calendar_delta(current, point.date, &series[..i]),
                    None => 0.0,
                })
                .collect(),
        }
    }
}

fn ordinal_deltas(series: &[TemperaturePoint]) -> Vec<f64> {
    series
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let lag = i
                .checked_sub(DELTA_LAG_STEPS)
                .and_then(|j| series[j].max_temperature);
            match (point.max_temperature, lag) {
                (Some(current), Some(lag)) => current - lag,
                _ => 0.0,
            }
        })
        .collect()
}

/// `current` minus the latest reading dated in `[date - 3d, date)`
fn calendar_delta(current: f64, date: NaiveDate, history: &[TemperaturePoint]) -> f64 {
    let window_start = date
        .checked_sub_signed(chrono::Duration::days(DELTA_WINDOW_DAYS))
        .unwrap_or(NaiveDate::MIN);
    history
        .iter()
        .filter(|p| p.date >= window_start && p.date < date)
        .filter_map(|p| p.max_temperature.map(|t| (p.date, t)))
        // last one wins among equal dates
        .fold(None, |best: Option<(NaiveDate, f64)>, candidate| match best {
            Some((d, _)) if d > candidate.0 => best,
            _ => Some(candidate),
        })
        .map_or(0.0, |(_, lag)| current - lag)
}

/// What is known about one stockpile when serving a single prediction
#[derive(Debug, Clone, Copy)]
pub struct PointInTimeInput<'a> {
    pub target_date: NaiveDate,
    /// Latest temperature stored on the stockpile itself
    pub last_temperature: Option<f64>,
    /// Stack formation date
    pub formed_on: Option<NaiveDate>,
    /// Recent temperature acts, any order
    pub history: &'a [TemperaturePoint],
    /// Observations for the target date
    pub weather: &'a [WeatherObservation],
}

/// Build the feature vector for one stockpile on one day.
///
/// The current temperature is the stockpile's last reading, or the hottest
/// act in its history when that is missing or zero. Weather comes from the
/// target day only, with the usual defaults. The delta always uses the
/// calendar window.
pub fn point_in_time_features(input: &PointInTimeInput<'_>) -> FeatureVector {
    let max_temperature = match input.last_temperature {
        Some(t) if t != 0.0 => t,
        _ => input
            .history
            .iter()
            .filter_map(|p| p.max_temperature)
            .filter(|t| *t != 0.0)
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))))
            .unwrap_or(0.0),
    };

    let age_days = input
        .formed_on
        .map_or(0.0, |formed| age_between(formed, input.target_date));

    let day: Vec<WeatherObservation> = input
        .weather
        .iter()
        .filter(|o| o.date() == input.target_date)
        .cloned()
        .collect();
    let daily = aggregate_daily_weather(&day).remove(&input.target_date);
    let temp_air = daily.and_then(|d| d.temp_air).unwrap_or(DEFAULT_AIR_TEMP);
    let humidity = daily.and_then(|d| d.humidity).unwrap_or(DEFAULT_HUMIDITY);
    let precip = daily.and_then(|d| d.precip).unwrap_or(DEFAULT_PRECIP);

    let mut history = input.history.to_vec();
    history.sort_by_key(|p| p.date);
    let temp_delta_3d = calendar_delta(max_temperature, input.target_date, &history);

    FeatureVector {
        max_temperature,
        age_days,
        temp_air,
        humidity,
        precip,
        temp_delta_3d,
    }
}
