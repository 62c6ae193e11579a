//! Error taxonomy for a canonicalization run.
//!
//! [`PipelineError`] values are fatal for the dataset they occur in and are
//! propagated with `?`. [`ParseError`] values are row-level: stages never
//! raise them, they turn them into [`DropReason`] counts on the run report.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The raw header lacks columns the dataset declares as required.
    #[error("dataset '{dataset}': missing required column(s) {missing:?}")]
    Schema {
        dataset: String,
        missing: Vec<String>,
    },

    /// The raw source could not be opened, read, or decoded.
    #[error("dataset '{dataset}': cannot read {path:?}: {reason}")]
    Input {
        dataset: String,
        path: PathBuf,
        reason: String,
    },

    /// A destination could not be reached or written.
    #[error("dataset '{dataset}': storage failure on {destination}: {reason}")]
    Storage {
        dataset: String,
        destination: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Short, stable label used in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Schema { .. } => "SchemaError",
            PipelineError::Input { .. } => "InputError",
            PipelineError::Storage { .. } => "StorageError",
            PipelineError::Config(_) => "ConfigError",
        }
    }

    pub fn storage(
        dataset: &str,
        destination: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        PipelineError::Storage {
            dataset: dataset.to_string(),
            destination: destination.into(),
            reason: reason.to_string(),
        }
    }
}

/// A single row that cannot be carried forward.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("row {row}: '{value}' is not a recognised date")]
    InvalidDate { row: usize, value: String },

    #[error("row {row}: '{value}' in {field} is not a number")]
    InvalidNumber {
        row: usize,
        field: &'static str,
        value: String,
    },

    #[error("row {row}: country_region is empty")]
    MissingCountry { row: usize },

    #[error("row {row}: not valid {encoding}")]
    Undecodable { row: usize, encoding: &'static str },
}

impl ParseError {
    pub fn reason(&self) -> DropReason {
        match self {
            ParseError::InvalidDate { .. } => DropReason::InvalidDate,
            ParseError::InvalidNumber { .. } => DropReason::InvalidNumber,
            ParseError::MissingCountry { .. } => DropReason::MissingCountry,
            ParseError::Undecodable { .. } => DropReason::Undecodable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    MissingCountry,
    InvalidDate,
    InvalidNumber,
    Undecodable,
}

impl DropReason {
    pub fn label(&self) -> &'static str {
        match self {
            DropReason::MissingCountry => "missing_country",
            DropReason::InvalidDate => "invalid_date",
            DropReason::InvalidNumber => "invalid_number",
            DropReason::Undecodable => "undecodable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_names_dataset_and_columns() {
        let err = PipelineError::Schema {
            dataset: "mpox".to_string(),
            missing: vec!["location".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("mpox"));
        assert!(message.contains("location"));
        assert_eq!(err.kind(), "SchemaError");
    }

    #[test]
    fn parse_errors_map_to_drop_reasons() {
        let err = ParseError::InvalidDate {
            row: 3,
            value: "not-a-date".to_string(),
        };
        assert_eq!(err.reason(), DropReason::InvalidDate);
        assert_eq!(err.reason().label(), "invalid_date");
    }
}
