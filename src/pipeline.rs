//! Composes the canonicalization stages and runs them per dataset.
//!
//! [`canonicalize`] is the pure part: raw table in, reduced frame out, with
//! every row-level decision tallied on the report. [`run_dataset`] adds the
//! I/O around it (reading the source, persisting to the configured sinks) and
//! turns a fatal error into a failed report instead of unwinding, so one
//! dataset cannot take down its siblings.

use std::path::PathBuf;

use log::{error, info};

use crate::{
    config::{DatasetConfig, PipelineConfig, WriteMode},
    dates::normalize_dates,
    derive::compute_recovered,
    error::PipelineError,
    fill::fill_missing,
    filter::CategoryFilter,
    frame::{Frame, RawTable},
    identity::assign_ids,
    io_utils,
    record::CanonicalRecord,
    reduce::reduce_monthly,
    report::RunReport,
    schema_map::SchemaMapper,
    store::{CanonicalSink, CsvFileSink, SqliteSink},
    writer,
};

/// Everything a run needs beyond the dataset declarations, built once per
/// invocation and handed to each dataset run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineContext {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub database: Option<String>,
    pub mode: WriteMode,
}

impl PipelineContext {
    pub fn new(data_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            output_dir: output_dir.into(),
            database: None,
            mode: WriteMode::Replace,
        }
    }

    pub fn with_database(mut self, database: Option<String>) -> Self {
        self.database = database;
        self
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// The store, when configured, comes before the CSV file: its commit can
    /// still fail, the file's rename is the last step of a run.
    fn open_sinks(
        &self,
        dataset: &DatasetConfig,
    ) -> Result<Vec<Box<dyn CanonicalSink>>, PipelineError> {
        let mut sinks: Vec<Box<dyn CanonicalSink>> = Vec::with_capacity(2);
        if let Some(connection) = &self.database {
            let sink = SqliteSink::open(connection, &dataset.table).map_err(|err| {
                PipelineError::storage(&dataset.name, connection.clone(), format!("{err:#}"))
            })?;
            sinks.push(Box::new(sink));
        }
        sinks.push(Box::new(CsvFileSink::new(
            dataset.output_path(&self.output_dir),
        )));
        Ok(sinks)
    }
}

/// Stages 1 through 6: mapping, missing values, dates, recovered counts,
/// category exclusion, monthly reduction.
pub fn canonicalize(
    dataset: &DatasetConfig,
    raw: &RawTable,
    report: &mut RunReport,
) -> Result<Frame, PipelineError> {
    report.rows_read = raw.rows_read();
    report.record_rejections(&raw.rejected);

    let frame = SchemaMapper::new(&dataset.name, &dataset.required, &dataset.columns).apply(raw)?;

    let filled = fill_missing(frame);
    report.record_fills(&filled.filled);
    report.record_rejections(&filled.rejected);

    let dated = normalize_dates(filled.frame, &dataset.date_formats);
    report.record_rejections(&dated.rejected);

    let derived = compute_recovered(dated.frame);
    report.record_rejections(&derived.rejected);
    report.negative_recovered = derived.negative_recovered;

    let filtered = CategoryFilter::new(&dataset.exclude).apply(derived.frame);
    report.record_exclusions(&filtered.excluded);

    let reduced = reduce_monthly(filtered.frame);
    report.collapsed = reduced.collapsed;

    info!(
        "[{}] {} row(s) read, {} dropped, {} excluded, {} collapsed into {} country-month(s)",
        dataset.name,
        report.rows_read,
        report.dropped_total(),
        report.excluded_total(),
        report.collapsed,
        reduced.frame.len()
    );
    Ok(reduced.frame)
}

/// Stages 1 through 7 without persistence, as a replace-mode run would
/// number them.
pub fn canonical_records(
    dataset: &DatasetConfig,
    raw: &RawTable,
) -> Result<(Vec<CanonicalRecord>, RunReport), PipelineError> {
    let mut report = RunReport::new(&dataset.name, WriteMode::Replace);
    let frame = canonicalize(dataset, raw, &mut report)?;
    let records = assign_ids(&dataset.name, &frame, 0)?;
    report.rows_written = records.len();
    report.first_id = records.first().map(|r| r.id);
    report.last_id = records.last().map(|r| r.id);
    Ok((records, report))
}

pub fn read_source(ctx: &PipelineContext, dataset: &DatasetConfig) -> Result<RawTable, PipelineError> {
    let path = dataset.input_path(&ctx.data_dir);
    let input_error = |reason: String| PipelineError::Input {
        dataset: dataset.name.clone(),
        path: path.clone(),
        reason,
    };
    let delimiter = io_utils::resolve_input_delimiter(&path, dataset.delimiter_byte()?);
    let encoding = io_utils::resolve_encoding(dataset.encoding.as_deref())
        .map_err(|err| input_error(err.to_string()))?;
    RawTable::read(&path, delimiter, encoding).map_err(|err| input_error(format!("{err:#}")))
}

/// Runs one dataset end to end. Never panics or unwinds on pipeline errors:
/// the outcome, success or failure, is in the returned report.
pub fn run_dataset(ctx: &PipelineContext, dataset: &DatasetConfig) -> RunReport {
    let mut report = RunReport::new(&dataset.name, ctx.mode);
    if let Err(err) = try_run(ctx, dataset, &mut report) {
        error!("[{}] {}: {err}", dataset.name, err.kind());
        report.record_failure(&err);
    } else {
        info!("{}", report.summary_line());
    }
    report
}

fn try_run(
    ctx: &PipelineContext,
    dataset: &DatasetConfig,
    report: &mut RunReport,
) -> Result<(), PipelineError> {
    info!(
        "[{}] canonicalizing {:?} ({} mode)",
        dataset.name,
        dataset.input_path(&ctx.data_dir),
        ctx.mode.label()
    );
    let raw = read_source(ctx, dataset)?;
    let frame = canonicalize(dataset, &raw, report)?;

    let mut sinks = ctx.open_sinks(dataset)?;
    let outcome = writer::persist(&dataset.name, ctx.mode, &frame, &mut sinks)?;
    report.already_stored = outcome.already_stored;
    report.rows_written = outcome.records.len();
    report.first_id = outcome.records.iter().map(|r| r.id).min();
    report.last_id = outcome.records.iter().map(|r| r.id).max();
    report.destinations = outcome.destinations;
    report.output_sha256 = outcome.digest;
    Ok(())
}

/// Runs every configured dataset independently, in configuration order.
pub fn run_all(ctx: &PipelineContext, config: &PipelineConfig) -> Vec<RunReport> {
    config
        .datasets
        .iter()
        .map(|dataset| run_dataset(ctx, dataset))
        .collect()
}
