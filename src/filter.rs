use std::collections::{BTreeMap, BTreeSet};

use crate::{
    data::Cell,
    frame::{Field, Frame},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Filtered {
    pub frame: Frame,
    /// Rows removed, per excluded category.
    pub excluded: BTreeMap<String, usize>,
}

impl Filtered {
    pub fn excluded_total(&self) -> usize {
        self.excluded.values().sum()
    }
}

/// Removes aggregate rows (continents and the like) from country-level data.
#[derive(Debug, Clone)]
pub struct CategoryFilter<'a> {
    excluded: &'a BTreeSet<String>,
}

impl<'a> CategoryFilter<'a> {
    pub fn new(excluded: &'a BTreeSet<String>) -> Self {
        Self { excluded }
    }

    /// Matching is exact and case-sensitive. A frame without a
    /// `country_region` column is returned unchanged.
    pub fn apply(&self, mut frame: Frame) -> Filtered {
        let mut excluded = BTreeMap::new();
        let Some(idx) = frame.position(Field::CountryRegion) else {
            return Filtered { frame, excluded };
        };
        if self.excluded.is_empty() {
            return Filtered { frame, excluded };
        }

        frame.rows.retain(|row| match &row.cells[idx] {
            Cell::Text(name) if self.excluded.contains(name) => {
                *excluded.entry(name.clone()).or_insert(0usize) += 1;
                false
            }
            _ => true,
        });
        Filtered { frame, excluded }
    }
}
