//! Raw string tables as exported by upstream systems

use std::io::Read;
use std::path::Path;

use super::{PipelineError, PipelineResult, SourceKind};

/// A header row plus string cells, before any typing.
///
/// Cells are trimmed on read; empty cells read back as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Build a table from literal headers and rows
    pub fn new<H, R, C>(headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|c| Into::<String>::into(c).trim().to_string())
                        .collect()
                })
                .collect(),
        }
    }

    /// Read a CSV export. Comma and semicolon delimiters are both accepted;
    /// the header line decides which one is used.
    pub fn from_reader<R: Read>(source_kind: SourceKind, mut reader: R) -> PipelineResult<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| PipelineError::Csv {
                source_kind,
                source: csv::Error::from(e),
            })?;
        Self::from_bytes(source_kind, &bytes)
    }

    pub fn from_bytes(source_kind: SourceKind, bytes: &[u8]) -> PipelineResult<Self> {
        let delimiter = sniff_delimiter(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers = reader
            .headers()
            .map_err(|source| PipelineError::Csv {
                source_kind,
                source,
            })?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| PipelineError::Csv {
                source_kind,
                source,
            })?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn from_path(source_kind: SourceKind, path: &Path) -> PipelineResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| PipelineError::Csv {
            source_kind,
            source: csv::Error::from(e),
        })?;
        Self::from_bytes(source_kind, &bytes)
    }

    /// Stack several exports of the same source. Columns are matched by
    /// header name; a column missing from one part reads as empty there.
    pub fn concat(tables: Vec<RawTable>) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for table in &tables {
            for h in &table.headers {
                if !headers.iter().any(|existing| existing == h) {
                    headers.push(h.clone());
                }
            }
        }

        let mut rows = Vec::new();
        for table in tables {
            let positions: Vec<Option<usize>> = headers
                .iter()
                .map(|h| table.headers.iter().position(|th| th == h))
                .collect();
            for row in table.rows {
                rows.push(
                    positions
                        .iter()
                        .map(|pos| pos.and_then(|i| row.get(i).cloned()).unwrap_or_default())
                        .collect(),
                );
            }
        }

        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first header matching any alias, compared
    /// case-insensitively. Aliases are tried in order.
    pub fn column(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| {
            self.headers
                .iter()
                .position(|h| h.to_lowercase() == alias.to_lowercase())
        })
    }

    /// Trimmed cell value, `None` for missing or empty cells
    pub fn cell(&self, row: usize, column: Option<usize>) -> Option<&str> {
        let value = self.rows.get(row)?.get(column?)?.as_str();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_comma_separated() {
        let data = "Склад,Штабель,Дата акта\n6,4,2020-08-04\n";
        let table = RawTable::from_bytes(SourceKind::Temperature, data.as_bytes()).unwrap();
        assert_eq!(table.headers(), &["Склад", "Штабель", "Дата акта"]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(0, Some(2)), Some("2020-08-04"));
    }

    #[test]
    fn test_reads_semicolon_separated_with_bom() {
        let data = "\u{feff}Склад;Штабель\n 6 ; 4 \n";
        let table = RawTable::from_bytes(SourceKind::Fires, data.as_bytes()).unwrap();
        assert_eq!(table.column(&["Склад"]), Some(0));
        assert_eq!(table.cell(0, Some(0)), Some("6"));
        assert_eq!(table.cell(0, Some(1)), Some("4"));
    }

    #[test]
    fn test_column_lookup_uses_alias_order() {
        let table = RawTable::new(["t", "temp_air"], vec![vec!["1", "2"]]);
        assert_eq!(table.column(&["temp_air", "t"]), Some(1));
        assert_eq!(table.column(&["TEMP_AIR"]), Some(1));
        assert_eq!(table.column(&["missing"]), None);
    }

    #[test]
    fn test_empty_cells_read_as_none() {
        let table = RawTable::new(["a", "b"], vec![vec!["", "x"]]);
        assert_eq!(table.cell(0, Some(0)), None);
        assert_eq!(table.cell(0, Some(1)), Some("x"));
        assert_eq!(table.cell(0, None), None);
        assert_eq!(table.cell(5, Some(1)), None);
    }

    #[test]
    fn test_concat_aligns_columns_by_name() {
        let a = RawTable::new(["date", "t"], vec![vec!["2020-01-01", "5"]]);
        let b = RawTable::new(["t", "humidity"], vec![vec!["7", "80"]]);
        let joined = RawTable::concat(vec![a, b]);
        assert_eq!(joined.headers(), &["date", "t", "humidity"]);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.cell(0, Some(2)), None);
        assert_eq!(joined.cell(1, Some(0)), None);
        assert_eq!(joined.cell(1, Some(1)), Some("7"));
    }
}
