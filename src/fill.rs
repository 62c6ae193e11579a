use std::collections::BTreeMap;

use log::debug;

use crate::{
    data::{Cell, is_null_token},
    error::ParseError,
    frame::{Field, Frame},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Filled {
    pub frame: Frame,
    /// Cells set to zero, per numeric field.
    pub filled: BTreeMap<Field, usize>,
    pub rejected: Vec<ParseError>,
}

/// Applies the missing-value policy: absent numeric values become `0`, rows
/// without a country are dropped since a country has no default.
pub fn fill_missing(mut frame: Frame) -> Filled {
    let numeric = frame
        .fields
        .iter()
        .enumerate()
        .filter(|(_, field)| field.is_numeric())
        .map(|(idx, field)| (idx, *field))
        .collect::<Vec<_>>();
    let country = frame.position(Field::CountryRegion);

    let mut filled = BTreeMap::new();
    let mut rejected = Vec::new();
    let rows = std::mem::take(&mut frame.rows);
    for mut row in rows {
        if let Some(idx) = country {
            let blank = match &row.cells[idx] {
                Cell::Text(value) => value.trim().is_empty(),
                Cell::Missing => true,
                _ => false,
            };
            if blank {
                debug!("Dropping row {}: empty country_region", row.ordinal);
                rejected.push(ParseError::MissingCountry { row: row.ordinal });
                continue;
            }
        }
        for (idx, field) in &numeric {
            let absent = match &row.cells[*idx] {
                Cell::Missing => true,
                Cell::Text(value) => is_null_token(value),
                _ => false,
            };
            if absent {
                row.cells[*idx] = Cell::Number(0.0);
                *filled.entry(*field).or_insert(0usize) += 1;
            }
        }
        frame.rows.push(row);
    }

    Filled {
        frame,
        filled,
        rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameRow;

    fn frame(rows: Vec<Vec<Cell>>) -> Frame {
        Frame {
            fields: vec![
                Field::CountryRegion,
                Field::Date,
                Field::TotalCases,
                Field::TotalDeaths,
            ],
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(idx, cells)| FrameRow {
                    ordinal: idx + 1,
                    cells,
                })
                .collect(),
        }
    }

    #[test]
    fn null_numeric_values_become_zero_and_are_counted() {
        let out = fill_missing(frame(vec![vec![
            Cell::Text("Chad".into()),
            Cell::Text("2022-05-01".into()),
            Cell::Missing,
            Cell::Text("NaN".into()),
        ]]));
        assert!(out.rejected.is_empty());
        assert_eq!(out.frame.rows[0].cells[2], Cell::Number(0.0));
        assert_eq!(out.frame.rows[0].cells[3], Cell::Number(0.0));
        assert_eq!(out.filled.get(&Field::TotalCases), Some(&1));
        assert_eq!(out.filled.get(&Field::TotalDeaths), Some(&1));
    }

    #[test]
    fn present_values_and_dates_are_untouched() {
        let out = fill_missing(frame(vec![vec![
            Cell::Text("Chad".into()),
            Cell::Missing,
            Cell::Text("12".into()),
            Cell::Text("abc".into()),
        ]]));
        assert_eq!(out.frame.rows[0].cells[1], Cell::Missing);
        assert_eq!(out.frame.rows[0].cells[2], Cell::Text("12".into()));
        assert_eq!(out.frame.rows[0].cells[3], Cell::Text("abc".into()));
        assert!(out.filled.is_empty());
    }

    #[test]
    fn rows_without_country_are_rejected() {
        let out = fill_missing(frame(vec![
            vec![
                Cell::Missing,
                Cell::Text("2022-05-01".into()),
                Cell::Text("1".into()),
                Cell::Text("0".into()),
            ],
            vec![
                Cell::Text("Peru".into()),
                Cell::Text("2022-05-01".into()),
                Cell::Text("1".into()),
                Cell::Text("0".into()),
            ],
        ]));
        assert_eq!(out.frame.len(), 1);
        assert_eq!(out.rejected, vec![ParseError::MissingCountry { row: 1 }]);
    }
}
