use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::data::{format_date, format_number};

/// Canonical output columns, in output order.
pub const CANONICAL_HEADERS: [&str; 6] = [
    "id",
    "country_region",
    "date",
    "total_cases",
    "total_deaths",
    "total_recovered",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub id: u64,
    pub country_region: String,
    pub date: NaiveDate,
    pub total_cases: f64,
    pub total_deaths: f64,
    pub total_recovered: f64,
}

/// `(country_region, year, month)`; at most one record per key.
pub type MonthKey = (String, i32, u32);

impl CanonicalRecord {
    pub fn month_key(&self) -> MonthKey {
        (
            self.country_region.clone(),
            self.date.year(),
            self.date.month(),
        )
    }

    pub fn to_row(&self) -> [String; 6] {
        [
            self.id.to_string(),
            self.country_region.clone(),
            format_date(self.date),
            format_number(self.total_cases),
            format_number(self.total_deaths),
            format_number(self.total_recovered),
        ]
    }
}
