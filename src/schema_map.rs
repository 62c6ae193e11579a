//! Raw header validation and column projection onto canonical fields.

use std::collections::BTreeMap;

use log::debug;

use crate::{
    data::Cell,
    error::PipelineError,
    frame::{Field, Frame, FrameRow, RawTable},
};

#[derive(Debug, Clone)]
pub struct SchemaMapper<'a> {
    dataset: &'a str,
    required: &'a [String],
    columns: &'a BTreeMap<String, Field>,
}

impl<'a> SchemaMapper<'a> {
    pub fn new(
        dataset: &'a str,
        required: &'a [String],
        columns: &'a BTreeMap<String, Field>,
    ) -> Self {
        Self {
            dataset,
            required,
            columns,
        }
    }

    /// Every required column and every mapped column must be present in the
    /// raw header.
    pub fn validate_headers(&self, headers: &[String]) -> Result<(), PipelineError> {
        let mut missing = Vec::new();
        let wanted = self
            .required
            .iter()
            .chain(self.columns.keys())
            .collect::<Vec<_>>();
        for name in wanted {
            if !headers.iter().any(|h| h == name) && !missing.contains(name) {
                missing.push(name.clone());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Schema {
                dataset: self.dataset.to_string(),
                missing,
            })
        }
    }

    pub fn apply(&self, raw: &RawTable) -> Result<Frame, PipelineError> {
        self.validate_headers(&raw.headers)?;

        let mut projection = self
            .columns
            .iter()
            .filter_map(|(name, field)| raw.column_index(name).map(|idx| (*field, idx)))
            .collect::<Vec<_>>();
        projection.sort_by_key(|(field, _)| *field);
        debug!(
            "[{}] projecting {} of {} raw column(s)",
            self.dataset,
            projection.len(),
            raw.headers.len()
        );

        let mut frame = Frame::new(projection.iter().map(|(field, _)| *field).collect());
        frame.rows = raw
            .rows
            .iter()
            .enumerate()
            .map(|(idx, row)| FrameRow {
                ordinal: raw.ordinal(idx),
                cells: projection
                    .iter()
                    .map(|(_, source)| {
                        row.get(*source)
                            .map(|value| Cell::from_raw(value))
                            .unwrap_or(Cell::Missing)
                    })
                    .collect(),
            })
            .collect();
        Ok(frame)
    }
}
