//! The assembled feature table and its CSV form

use std::io::{Read, Write};

use super::{PipelineError, PipelineResult};
use crate::models::{FeatureRow, FeatureVector, FEATURE_NAMES};

const KEY_COLUMNS: [&str; 4] = ["stack_id", "yard", "stack", "date"];
const TARGET_COLUMN: &str = "target";

/// Feature rows sorted by stockpile and date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
    labeled: bool,
}

impl FeatureTable {
    pub fn new(rows: Vec<FeatureRow>, labeled: bool) -> Self {
        Self { rows, labeled }
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<FeatureRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when rows carry the fire label
    pub fn is_labeled(&self) -> bool {
        self.labeled
    }

    pub fn vectors(&self) -> Vec<FeatureVector> {
        self.rows.iter().map(FeatureRow::features).collect()
    }

    /// Labels in row order, `None` for an unlabeled table
    pub fn targets(&self) -> Option<Vec<u8>> {
        if !self.labeled {
            return None;
        }
        Some(self.rows.iter().map(|r| r.target.unwrap_or(0)).collect())
    }

    pub fn positives(&self) -> usize {
        self.rows.iter().filter(|r| r.target == Some(1)).count()
    }

    pub fn headers(&self) -> Vec<&'static str> {
        let mut headers: Vec<&'static str> = KEY_COLUMNS.to_vec();
        headers.extend(FEATURE_NAMES);
        if self.labeled {
            headers.push(TARGET_COLUMN);
        }
        headers
    }

    /// Write the table as CSV with a header row. The header is written even
    /// for an empty table.
    pub fn write_csv<W: Write>(&self, writer: W) -> PipelineResult<()> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        wtr.write_record(self.headers()).map_err(PipelineError::Emit)?;
        for row in &self.rows {
            let mut row = row.clone();
            if self.labeled {
                row.target = Some(row.target.unwrap_or(0));
            } else {
                row.target = None;
            }
            wtr.serialize(row).map_err(PipelineError::Emit)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> PipelineResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(buf)
    }

    /// Read a table previously written by [`FeatureTable::write_csv`]. The
    /// table is labeled when a `target` column is present.
    pub fn read_csv<R: Read>(reader: R) -> PipelineResult<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let labeled = rdr
            .headers()
            .map_err(PipelineError::Load)?
            .iter()
            .any(|h| h == TARGET_COLUMN);
        let rows = rdr
            .deserialize()
            .collect::<Result<Vec<FeatureRow>, _>>()
            .map_err(PipelineError::Load)?;
        Ok(Self { rows, labeled })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StockpileId;
    use chrono::NaiveDate;

    fn row(target: Option<u8>) -> FeatureRow {
        FeatureRow {
            stack_id: StockpileId::from_parts("6", "4"),
            yard: "6".to_string(),
            stack: "4".to_string(),
            date: NaiveDate::from_ymd_opt(2020, 8, 4).unwrap(),
            max_temperature: 220.0,
            age_days: 34.0,
            temp_air: 20.0,
            humidity: 60.0,
            precip: 0.0,
            temp_delta_3d: 0.0,
            target,
        }
    }

    #[test]
    fn test_training_csv_has_target_column() {
        let table = FeatureTable::new(vec![row(Some(1))], true);
        let csv = String::from_utf8(table.to_csv_bytes().unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("stack_id,yard,stack,date,max_temperature,age_days,temp_air,humidity,precip,temp_delta_3d,target")
        );
        assert!(lines.next().unwrap().starts_with("6_4,6,4,2020-08-04,220"));

        let back = FeatureTable::read_csv(csv.as_bytes()).unwrap();
        assert!(back.is_labeled());
        assert_eq!(back.targets(), Some(vec![1]));
        assert_eq!(back.rows()[0].stack_id.as_str(), "6_4");
    }

    #[test]
    fn test_inference_csv_omits_target() {
        let table = FeatureTable::new(vec![row(None)], false);
        let csv = String::from_utf8(table.to_csv_bytes().unwrap()).unwrap();
        assert!(!csv.lines().next().unwrap().contains("target"));
        let back = FeatureTable::read_csv(csv.as_bytes()).unwrap();
        assert!(!back.is_labeled());
        assert_eq!(back.targets(), None);
    }

    #[test]
    fn test_empty_table_still_writes_header() {
        let csv = FeatureTable::new(vec![], false).to_csv_bytes().unwrap();
        assert_eq!(String::from_utf8(csv).unwrap().lines().count(), 1);
    }
}
