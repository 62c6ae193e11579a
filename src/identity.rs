//! Identity assignment for reduced frames.
//!
//! Identities are dense: the `n`-th row of the final order receives
//! `base + n`. The base is `0` when a run replaces its destination and the
//! largest identity already persisted when it appends, so appended rows
//! never collide with stored ones.

use std::collections::HashMap;

use crate::{
    config::WriteMode,
    data::Cell,
    error::PipelineError,
    frame::{Field, Frame},
    record::{CanonicalRecord, MonthKey},
};

/// Identity base for a run: replace restarts at 1, append continues after
/// the persisted maximum.
pub fn identity_base(mode: WriteMode, persisted_max: u64) -> u64 {
    match mode {
        WriteMode::Replace => 0,
        WriteMode::Append => persisted_max,
    }
}

/// Re-issues identities for an append run. A record whose country-month
/// already has an identity in some destination keeps it; the others are
/// numbered `base + 1 ..` in their current order.
pub fn continue_ids(
    records: &mut [CanonicalRecord],
    known: &HashMap<MonthKey, u64>,
    base: u64,
) {
    let mut next = base;
    for record in records.iter_mut() {
        record.id = match known.get(&record.month_key()) {
            Some(id) => *id,
            None => {
                next += 1;
                next
            }
        };
    }
}

pub fn assign_ids(
    dataset: &str,
    frame: &Frame,
    base: u64,
) -> Result<Vec<CanonicalRecord>, PipelineError> {
    let missing = [
        Field::CountryRegion,
        Field::Date,
        Field::TotalCases,
        Field::TotalDeaths,
        Field::TotalRecovered,
    ]
    .into_iter()
    .filter(|field| !frame.has_field(*field))
    .map(|field| field.name().to_string())
    .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(PipelineError::Schema {
            dataset: dataset.to_string(),
            missing,
        });
    }

    let at = |field: Field| frame.position(field).unwrap_or_default();
    let (country, date, cases, deaths, recovered) = (
        at(Field::CountryRegion),
        at(Field::Date),
        at(Field::TotalCases),
        at(Field::TotalDeaths),
        at(Field::TotalRecovered),
    );

    frame
        .rows
        .iter()
        .zip(base + 1..)
        .map(|(row, id)| {
            let cells = &row.cells;
            match (
                &cells[country],
                cells[date].as_date(),
                cells[cases].as_number(),
                cells[deaths].as_number(),
                cells[recovered].as_number(),
            ) {
                (Cell::Text(name), Some(date), Some(cases), Some(deaths), Some(recovered)) => {
                    Ok(CanonicalRecord {
                        id,
                        country_region: name.clone(),
                        date,
                        total_cases: cases,
                        total_deaths: deaths,
                        total_recovered: recovered,
                    })
                }
                _ => Err(PipelineError::Schema {
                    dataset: dataset.to_string(),
                    missing: vec![format!("typed canonical values on input row {}", row.ordinal)],
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameRow;
    use chrono::NaiveDate;

    fn reduced(n: usize) -> Frame {
        Frame {
            fields: Field::ALL.to_vec(),
            rows: (0..n)
                .map(|i| FrameRow {
                    ordinal: i + 1,
                    cells: vec![
                        Cell::Text(format!("C{i}")),
                        Cell::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()),
                        Cell::Number(10.0),
                        Cell::Number(1.0),
                        Cell::Number(9.0),
                    ],
                })
                .collect(),
        }
    }

    #[test]
    fn replace_mode_ids_are_dense_from_one() {
        let base = identity_base(WriteMode::Replace, 40);
        let records = assign_ids("covid", &reduced(3), base).unwrap();
        let ids = records.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn append_mode_continues_after_persisted_maximum() {
        let base = identity_base(WriteMode::Append, 40);
        let records = assign_ids("covid", &reduced(2), base).unwrap();
        let ids = records.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![41, 42]);
    }

    #[test]
    fn continue_ids_keeps_stored_identities_and_packs_new_ones() {
        let mut records = assign_ids("covid", &reduced(4), 0).unwrap();
        let known = HashMap::from([(records[1].month_key(), 3)]);
        continue_ids(&mut records, &known, 7);
        let ids = records.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![8, 3, 9, 10]);
    }

    #[test]
    fn frames_missing_canonical_fields_fail() {
        let mut frame = reduced(1);
        frame.fields.pop();
        for row in &mut frame.rows {
            row.cells.pop();
        }
        let err = assign_ids("covid", &frame, 0).unwrap_err();
        assert_eq!(err.kind(), "SchemaError");
        assert!(err.to_string().contains("total_recovered"));
    }
}
