use log::{debug, warn};

use crate::{
    data::{Cell, parse_number},
    error::ParseError,
    frame::{Field, Frame},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Derived {
    pub frame: Frame,
    pub rejected: Vec<ParseError>,
    /// Rows where deaths exceed cases, leaving a negative recovered count.
    pub negative_recovered: usize,
}

/// Parses the case and death counts and sets
/// `total_recovered = total_cases - total_deaths` on every row.
///
/// A `total_recovered` column mapped from the source is overwritten; the
/// derived value is the only one carried forward.
pub fn compute_recovered(mut frame: Frame) -> Derived {
    let cases_idx = frame.ensure_field(Field::TotalCases);
    let deaths_idx = frame.ensure_field(Field::TotalDeaths);
    let recovered_idx = frame.ensure_field(Field::TotalRecovered);

    let mut rejected = Vec::new();
    let mut negative_recovered = 0usize;
    let rows = std::mem::take(&mut frame.rows);
    for mut row in rows {
        let cases = numeric_cell(&row.cells[cases_idx], Field::TotalCases, row.ordinal);
        let deaths = numeric_cell(&row.cells[deaths_idx], Field::TotalDeaths, row.ordinal);
        let (cases, deaths) = match (cases, deaths) {
            (Ok(cases), Ok(deaths)) => (cases, deaths),
            (Err(err), _) | (_, Err(err)) => {
                debug!("Dropping {err}");
                rejected.push(err);
                continue;
            }
        };
        let recovered = cases - deaths;
        if recovered < 0.0 {
            negative_recovered += 1;
        }
        row.cells[cases_idx] = Cell::Number(cases);
        row.cells[deaths_idx] = Cell::Number(deaths);
        row.cells[recovered_idx] = Cell::Number(recovered);
        frame.rows.push(row);
    }

    if negative_recovered > 0 {
        warn!("{negative_recovered} row(s) report more deaths than cases");
    }

    Derived {
        frame,
        rejected,
        negative_recovered,
    }
}

fn numeric_cell(cell: &Cell, field: Field, row: usize) -> Result<f64, ParseError> {
    match cell {
        Cell::Number(value) => Ok(*value),
        Cell::Missing => Ok(0.0),
        Cell::Text(value) => parse_number(value).map_err(|_| ParseError::InvalidNumber {
            row,
            field: field.name(),
            value: value.clone(),
        }),
        Cell::Date(date) => Err(ParseError::InvalidNumber {
            row,
            field: field.name(),
            value: date.to_string(),
        }),
    }
}
