//! Monthly reduction: one observation per country and calendar month.
//!
//! Rows are stably sorted by `(country_region, date)`, so rows that share a
//! date keep their input order. Each `(country_region, year, month)` run of
//! the sorted rows then collapses to its last row, which is the latest
//! observation of the month (and the last-read one among equal dates). The
//! surviving rows are already in `(country_region, date)` order.

use chrono::{Datelike, NaiveDate};
use itertools::Itertools;

use crate::{
    data::Cell,
    frame::{Field, Frame, FrameRow},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Reduced {
    pub frame: Frame,
    /// Rows superseded by a later observation in the same month.
    pub collapsed: usize,
}

type MonthKey = (Option<String>, Option<(i32, u32)>);

pub fn reduce_monthly(mut frame: Frame) -> Reduced {
    let country_idx = frame.position(Field::CountryRegion);
    let date_idx = frame.position(Field::Date);

    let country_of = |row: &FrameRow| -> Option<String> {
        country_idx.and_then(|idx| row.cells[idx].as_text().map(str::to_string))
    };
    let date_of = |row: &FrameRow| -> Option<NaiveDate> {
        date_idx.and_then(|idx| row.cells[idx].as_date())
    };
    let month_of = |row: &FrameRow| -> MonthKey {
        (
            country_of(row),
            date_of(row).map(|date| (date.year(), date.month())),
        )
    };

    let before = frame.rows.len();
    let mut rows = std::mem::take(&mut frame.rows);
    rows.sort_by(|a, b| {
        country_cell(a, country_idx)
            .cmp(&country_cell(b, country_idx))
            .then_with(|| date_of(a).cmp(&date_of(b)))
    });

    frame.rows = rows
        .into_iter()
        .chunk_by(|row| month_of(row))
        .into_iter()
        .filter_map(|(_, group)| group.last())
        .collect();

    Reduced {
        collapsed: before - frame.rows.len(),
        frame,
    }
}

fn country_cell(row: &FrameRow, idx: Option<usize>) -> Option<&str> {
    idx.and_then(|idx| match &row.cells[idx] {
        Cell::Text(value) => Some(value.as_str()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ordinal: usize, country: &str, date: &str, cases: f64) -> FrameRow {
        FrameRow {
            ordinal,
            cells: vec![
                Cell::Text(country.to_string()),
                Cell::Date(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap()),
                Cell::Number(cases),
            ],
        }
    }

    fn frame(rows: Vec<FrameRow>) -> Frame {
        Frame {
            fields: vec![Field::CountryRegion, Field::Date, Field::TotalCases],
            rows,
        }
    }

    fn summary(frame: &Frame) -> Vec<(String, String, String)> {
        frame
            .rows
            .iter()
            .map(|row| {
                (
                    row.cells[0].as_display(),
                    row.cells[1].as_display(),
                    row.cells[2].as_display(),
                )
            })
            .collect()
    }

    #[test]
    fn keeps_latest_row_per_country_month() {
        let out = reduce_monthly(frame(vec![
            row(1, "Foo", "2020-01-20", 20.0),
            row(2, "Foo", "2020-01-05", 10.0),
            row(3, "Foo", "2020-02-01", 25.0),
        ]));
        assert_eq!(
            summary(&out.frame),
            vec![
                ("Foo".into(), "2020-01-20".into(), "20".into()),
                ("Foo".into(), "2020-02-01".into(), "25".into()),
            ]
        );
        assert_eq!(out.collapsed, 1);
    }

    #[test]
    fn ties_on_date_keep_the_last_input_row() {
        let out = reduce_monthly(frame(vec![
            row(1, "Foo", "2020-03-31", 1.0),
            row(2, "Foo", "2020-03-31", 2.0),
            row(3, "Foo", "2020-03-02", 0.0),
        ]));
        assert_eq!(out.frame.len(), 1);
        assert_eq!(out.frame.rows[0].ordinal, 2);
    }

    #[test]
    fn output_is_sorted_by_country_then_date() {
        let out = reduce_monthly(frame(vec![
            row(1, "Peru", "2021-05-02", 1.0),
            row(2, "Chad", "2021-06-09", 2.0),
            row(3, "Chad", "2021-05-30", 3.0),
            row(4, "Peru", "2020-12-31", 4.0),
        ]));
        let keys = summary(&out.frame)
            .into_iter()
            .map(|(country, date, _)| format!("{country} {date}"))
            .collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![
                "Chad 2021-05-30",
                "Chad 2021-06-09",
                "Peru 2020-12-31",
                "Peru 2021-05-02"
            ]
        );
        assert_eq!(out.collapsed, 0);
    }

    #[test]
    fn same_month_in_different_years_stays_distinct() {
        let out = reduce_monthly(frame(vec![
            row(1, "Foo", "2020-01-10", 1.0),
            row(2, "Foo", "2021-01-10", 2.0),
        ]));
        assert_eq!(out.frame.len(), 2);
    }

    #[test]
    fn empty_frame_reduces_to_empty() {
        let out = reduce_monthly(frame(Vec::new()));
        assert!(out.frame.is_empty());
        assert_eq!(out.collapsed, 0);
    }
}
