//! Per-dataset run summaries.
//!
//! Row-level problems never abort a run; they are tallied here by reason so
//! that every row read is accounted for:
//! `rows_read = dropped + excluded + collapsed + already_stored + rows_written`.

use std::{collections::BTreeMap, fs::File, path::Path};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    config::WriteMode,
    error::{DropReason, ParseError, PipelineError},
    frame::Field,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed { kind: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub dataset: String,
    pub mode: WriteMode,
    pub rows_read: usize,
    pub filled_values: BTreeMap<Field, usize>,
    pub dropped: BTreeMap<DropReason, usize>,
    pub excluded: BTreeMap<String, usize>,
    pub negative_recovered: usize,
    pub collapsed: usize,
    pub already_stored: usize,
    pub rows_written: usize,
    pub first_id: Option<u64>,
    pub last_id: Option<u64>,
    pub destinations: Vec<String>,
    pub output_sha256: Option<String>,
    pub status: RunStatus,
}

impl RunReport {
    pub fn new(dataset: &str, mode: WriteMode) -> Self {
        Self {
            dataset: dataset.to_string(),
            mode,
            rows_read: 0,
            filled_values: BTreeMap::new(),
            dropped: BTreeMap::new(),
            excluded: BTreeMap::new(),
            negative_recovered: 0,
            collapsed: 0,
            already_stored: 0,
            rows_written: 0,
            first_id: None,
            last_id: None,
            destinations: Vec::new(),
            output_sha256: None,
            status: RunStatus::Succeeded,
        }
    }

    pub fn record_rejections(&mut self, rejected: &[ParseError]) {
        for err in rejected {
            *self.dropped.entry(err.reason()).or_insert(0) += 1;
        }
    }

    pub fn record_fills(&mut self, filled: &BTreeMap<Field, usize>) {
        for (field, count) in filled {
            *self.filled_values.entry(*field).or_insert(0) += count;
        }
    }

    pub fn record_exclusions(&mut self, excluded: &BTreeMap<String, usize>) {
        for (category, count) in excluded {
            *self.excluded.entry(category.clone()).or_insert(0) += count;
        }
    }

    pub fn record_failure(&mut self, err: &PipelineError) {
        self.status = RunStatus::Failed {
            kind: err.kind().to_string(),
            message: err.to_string(),
        };
    }

    pub fn dropped_for(&self, reason: DropReason) -> usize {
        self.dropped.get(&reason).copied().unwrap_or(0)
    }

    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }

    pub fn excluded_total(&self) -> usize {
        self.excluded.values().sum()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Succeeded)
    }

    pub fn status_label(&self) -> String {
        match &self.status {
            RunStatus::Succeeded => "ok".to_string(),
            RunStatus::Failed { kind, .. } => kind.clone(),
        }
    }

    pub fn summary_line(&self) -> String {
        match &self.status {
            RunStatus::Succeeded => format!(
                "[{}] read {} row(s): {} dropped, {} excluded, {} collapsed, {} already stored, {} written",
                self.dataset,
                self.rows_read,
                self.dropped_total(),
                self.excluded_total(),
                self.collapsed,
                self.already_stored,
                self.rows_written
            ),
            RunStatus::Failed { kind, message } => {
                format!("[{}] failed with {kind}: {message}", self.dataset)
            }
        }
    }
}

/// Besides `dataset`, `mode`, `filled` and `status`, the columns add up to
/// `read`.
pub const SUMMARY_HEADERS: [&str; 13] = [
    "dataset",
    "mode",
    "read",
    "filled",
    "missing_country",
    "invalid_date",
    "invalid_number",
    "undecodable",
    "excluded",
    "collapsed",
    "already_stored",
    "written",
    "status",
];

pub fn summary_rows(reports: &[RunReport]) -> Vec<Vec<String>> {
    reports
        .iter()
        .map(|report| {
            vec![
                report.dataset.clone(),
                report.mode.label().to_string(),
                report.rows_read.to_string(),
                report.filled_values.values().sum::<usize>().to_string(),
                report.dropped_for(DropReason::MissingCountry).to_string(),
                report.dropped_for(DropReason::InvalidDate).to_string(),
                report.dropped_for(DropReason::InvalidNumber).to_string(),
                report.dropped_for(DropReason::Undecodable).to_string(),
                report.excluded_total().to_string(),
                report.collapsed.to_string(),
                report.already_stored.to_string(),
                report.rows_written.to_string(),
                report.status_label(),
            ]
        })
        .collect()
}

pub fn save_json(path: &Path, reports: &[RunReport]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating report file {path:?}"))?;
    serde_json::to_writer_pretty(file, reports).context("Writing run report JSON")
}
