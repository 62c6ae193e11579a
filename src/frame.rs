//! In-memory tables passed between pipeline stages.
//!
//! [`RawTable`] is a source file as decoded strings. [`Frame`] is what the
//! stages exchange: canonical [`Field`]s in canonical order and typed rows
//! that remember their position in the raw input.

use std::{fmt, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use log::debug;

use crate::{data::Cell, error::ParseError, io_utils};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    CountryRegion,
    Date,
    TotalCases,
    TotalDeaths,
    TotalRecovered,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::CountryRegion,
        Field::Date,
        Field::TotalCases,
        Field::TotalDeaths,
        Field::TotalRecovered,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::CountryRegion => "country_region",
            Field::Date => "date",
            Field::TotalCases => "total_cases",
            Field::TotalDeaths => "total_deaths",
            Field::TotalRecovered => "total_recovered",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Field::TotalCases | Field::TotalDeaths | Field::TotalRecovered
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.name() == value.trim())
            .ok_or_else(|| anyhow!("Unknown canonical field '{value}'"))
    }
}

/// A source file held entirely in memory.
///
/// Rows that cannot be decoded in the source encoding are left out of `rows`
/// and listed in `rejected`; the rest keep their position in the file.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub rejected: Vec<ParseError>,
    ordinals: Vec<usize>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            ordinals: (1..=rows.len()).collect(),
            headers,
            rows,
            rejected: Vec::new(),
        }
    }

    pub fn read(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Self> {
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, true)?;
        let headers = io_utils::reader_headers(&mut reader, encoding)?
            .into_iter()
            .map(|header| clean_header(&header))
            .collect::<Vec<_>>();
        let mut table = Self::new(headers, Vec::new());
        for (idx, record) in reader.byte_records().enumerate() {
            let record = record.with_context(|| format!("Reading row {}", idx + 2))?;
            match io_utils::decode_record(&record, encoding) {
                Ok(decoded) => {
                    table.rows.push(decoded);
                    table.ordinals.push(idx + 1);
                }
                Err(_) => {
                    let err = ParseError::Undecodable {
                        row: idx + 1,
                        encoding: encoding.name(),
                    };
                    debug!("Dropping {err}");
                    table.rejected.push(err);
                }
            }
        }
        Ok(table)
    }

    /// Decoded rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Data rows in the source, decoded or not.
    pub fn rows_read(&self) -> usize {
        self.rows.len() + self.rejected.len()
    }

    /// 1-based position in the source of the decoded row at `idx`.
    pub fn ordinal(&self, idx: usize) -> usize {
        self.ordinals.get(idx).copied().unwrap_or(idx + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }
}

fn clean_header(value: &str) -> String {
    value.trim_start_matches('\u{feff}').trim().to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameRow {
    /// 1-based position of the row in the raw input.
    pub ordinal: usize,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub fields: Vec<Field>,
    pub rows: Vec<FrameRow>,
}

impl Frame {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn position(&self, field: Field) -> Option<usize> {
        self.fields.iter().position(|f| *f == field)
    }

    pub fn has_field(&self, field: Field) -> bool {
        self.position(field).is_some()
    }

    /// Returns the column index of `field`, adding an empty column in
    /// canonical position when the frame does not carry it yet.
    pub fn ensure_field(&mut self, field: Field) -> usize {
        if let Some(idx) = self.position(field) {
            return idx;
        }
        let idx = self
            .fields
            .iter()
            .position(|existing| *existing > field)
            .unwrap_or(self.fields.len());
        self.fields.insert(idx, field);
        for row in &mut self.rows {
            row.cells.insert(idx, Cell::Missing);
        }
        idx
    }

    pub fn cell<'a>(&self, row: &'a FrameRow, field: Field) -> Option<&'a Cell> {
        self.position(field).and_then(|idx| row.cells.get(idx))
    }
}
