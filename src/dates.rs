use log::debug;

use crate::{
    data::{Cell, parse_naive_date},
    error::ParseError,
    frame::{Field, Frame},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Dated {
    pub frame: Frame,
    pub rejected: Vec<ParseError>,
}

/// Converts the `date` column into calendar dates. Rows whose date cannot be
/// parsed are dropped and returned as rejections.
pub fn normalize_dates(mut frame: Frame, extra_formats: &[String]) -> Dated {
    let Some(idx) = frame.position(Field::Date) else {
        return Dated {
            frame,
            rejected: Vec::new(),
        };
    };

    let mut rejected = Vec::new();
    let rows = std::mem::take(&mut frame.rows);
    for mut row in rows {
        let parsed = match &row.cells[idx] {
            Cell::Date(date) => Ok(*date),
            Cell::Text(value) => parse_naive_date(value, extra_formats)
                .map_err(|_| value.clone()),
            other => Err(other.as_display()),
        };
        match parsed {
            Ok(date) => {
                row.cells[idx] = Cell::Date(date);
                frame.rows.push(row);
            }
            Err(value) => {
                let err = ParseError::InvalidDate {
                    row: row.ordinal,
                    value,
                };
                debug!("Dropping {err}");
                rejected.push(err);
            }
        }
    }

    Dated { frame, rejected }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameRow;
    use chrono::NaiveDate;

    fn dated_frame(values: &[Cell]) -> Frame {
        Frame {
            fields: vec![Field::CountryRegion, Field::Date],
            rows: values
                .iter()
                .enumerate()
                .map(|(idx, value)| FrameRow {
                    ordinal: idx + 1,
                    cells: vec![Cell::Text("Foo".into()), value.clone()],
                })
                .collect(),
        }
    }

    #[test]
    fn unparsable_dates_are_dropped_and_reported() {
        let out = normalize_dates(
            dated_frame(&[
                Cell::Text("2020-01-05".into()),
                Cell::Text("not-a-date".into()),
                Cell::Missing,
            ]),
            &[],
        );
        assert_eq!(out.frame.len(), 1);
        assert_eq!(
            out.frame.rows[0].cells[1],
            Cell::Date(NaiveDate::from_ymd_opt(2020, 1, 5).unwrap())
        );
        assert_eq!(
            out.rejected,
            vec![
                ParseError::InvalidDate {
                    row: 2,
                    value: "not-a-date".into()
                },
                ParseError::InvalidDate {
                    row: 3,
                    value: String::new()
                },
            ]
        );
    }

    #[test]
    fn frame_without_date_column_passes_through() {
        let frame = Frame {
            fields: vec![Field::CountryRegion],
            rows: vec![FrameRow {
                ordinal: 1,
                cells: vec![Cell::Text("Foo".into())],
            }],
        };
        let out = normalize_dates(frame.clone(), &[]);
        assert_eq!(out.frame, frame);
    }
}
