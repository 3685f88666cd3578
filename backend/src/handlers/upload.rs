//! Multipart uploads of the raw exports

use axum::extract::Multipart;
use shared::pipeline::{RawTable, SourceKind, SourceTables, WeatherInput};
use shared::validation::validate_horizon;

use crate::error::{AppError, AppResult};

/// Exports and options read from one multipart request
#[derive(Debug)]
pub struct SourceUpload {
    pub sources: SourceTables,
    pub horizon_days: Option<u32>,
}

fn parse_horizon(raw: &str) -> AppResult<u32> {
    let days: u32 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::invalid("horizon_days", "horizon_days must be an integer"))?;
    validate_horizon(days).map_err(|e| AppError::invalid("horizon_days", e))?;
    Ok(days)
}

fn required(table: Option<RawTable>, field: &str) -> AppResult<RawTable> {
    table.ok_or_else(|| AppError::invalid(field, format!("File '{}' is required", field)))
}

/// Read `fires`, `supplies`, `temperature`, optional `weather` and optional
/// `horizon_days` fields. Unknown fields are ignored.
pub async fn read_sources(mut multipart: Multipart) -> AppResult<SourceUpload> {
    let mut fires = None;
    let mut supplies = None;
    let mut temperature = None;
    let mut weather = None;
    let mut horizon_days = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let kind = match name.as_str() {
            "fires" => Some(SourceKind::Fires),
            "supplies" => Some(SourceKind::Supplies),
            "temperature" => Some(SourceKind::Temperature),
            "weather" => Some(SourceKind::Weather),
            _ => None,
        };

        if let Some(kind) = kind {
            let bytes = field.bytes().await?;
            let table = RawTable::from_bytes(kind, &bytes)?;
            tracing::debug!(source = %kind, rows = table.len(), "Upload received");
            match kind {
                SourceKind::Fires => fires = Some(table),
                SourceKind::Supplies => supplies = Some(table),
                SourceKind::Temperature => temperature = Some(table),
                SourceKind::Weather => weather = Some(table),
            }
        } else if name == "horizon_days" {
            let text = field.text().await?;
            horizon_days = Some(parse_horizon(&text)?);
        }
    }

    Ok(SourceUpload {
        sources: SourceTables {
            fires: required(fires, "fires")?,
            supplies: required(supplies, "supplies")?,
            temperature: required(temperature, "temperature")?,
            weather: weather.map_or(WeatherInput::Unavailable, WeatherInput::Table),
        },
        horizon_days,
    })
}
