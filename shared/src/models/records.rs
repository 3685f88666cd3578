//! Source records after normalization

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::types::StockpileId;

/// A recorded self-ignition incident
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FireEvent {
    pub stockpile: StockpileId,
    pub fire_date: NaiveDate,
    /// Coal grade, when the export carries it
    pub grade: Option<String>,
    /// Stack formation date as written in the fire act
    pub formed_on: Option<NaiveDate>,
}

/// A shipment of coal arriving at (and later leaving) a stockpile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplyRecord {
    pub stockpile: StockpileId,
    pub arrival_date: NaiveDate,
    pub departure_date: Option<NaiveDate>,
    pub grade: Option<String>,
}

/// One temperature act for a stockpile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemperatureRecord {
    pub stockpile: StockpileId,
    pub record_date: NaiveDate,
    /// Mandatory for a feature row; rows where this stays `None` are dropped
    /// during assembly.
    pub max_temperature: Option<f64>,
}

/// A single weather station observation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeatherObservation {
    pub timestamp: NaiveDateTime,
    pub air_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub precipitation: Option<f64>,
    pub pressure: Option<f64>,
}

impl WeatherObservation {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Weather aggregated to one calendar day
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DailyWeather {
    pub date: NaiveDate,
    /// Daily maximum air temperature
    pub temp_air: Option<f64>,
    /// Daily mean relative humidity
    pub humidity: Option<f64>,
    /// Daily precipitation total
    pub precip: Option<f64>,
}
