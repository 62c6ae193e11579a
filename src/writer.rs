use log::{info, warn};

use crate::{
    config::WriteMode,
    error::PipelineError,
    frame::Frame,
    identity::{assign_ids, continue_ids, identity_base},
    record::CanonicalRecord,
    store::{CanonicalSink, PersistedState},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutcome {
    /// Rows written to at least one destination.
    pub records: Vec<CanonicalRecord>,
    /// Reduced rows whose country-month every destination already holds.
    pub already_stored: usize,
    pub digest: Option<String>,
    pub destinations: Vec<String>,
}

/// Assigns identities and writes the reduced frame to every sink.
///
/// In append mode each sink receives only the rows whose country-month it
/// does not hold yet. A row already stored by another sink keeps that
/// identity; new rows continue after the largest identity of any sink.
///
/// Every sink stages its rows before any of them commits, and a failure
/// while staging discards all staged writes. Commits then run in sink
/// order, so sinks whose commit can fail (transactions) go before the file
/// sink, whose commit is a rename.
pub fn persist(
    dataset: &str,
    mode: WriteMode,
    frame: &Frame,
    sinks: &mut [Box<dyn CanonicalSink>],
) -> Result<WriteOutcome, PipelineError> {
    let mut records = assign_ids(dataset, frame, 0)?;
    let mut already_stored = 0usize;

    let batches = match mode {
        WriteMode::Replace => vec![records.clone(); sinks.len()],
        WriteMode::Append => {
            let mut states = Vec::with_capacity(sinks.len());
            for sink in sinks.iter_mut() {
                states.push(sink.persisted().map_err(|err| storage_error(dataset, &**sink, err))?);
            }
            let mut merged = PersistedState::default();
            for state in &states {
                merged.merge(state);
            }
            continue_ids(
                &mut records,
                &merged.ids,
                identity_base(mode, merged.max_id),
            );

            let before = records.len();
            records.retain(|record| {
                let key = record.month_key();
                states.iter().any(|state| !state.holds(&key))
            });
            already_stored = before - records.len();
            if already_stored > 0 {
                warn!(
                    "[{dataset}] {already_stored} country-month(s) already stored; skipping them"
                );
            }

            sinks
                .iter()
                .zip(&states)
                .map(|(sink, state)| {
                    let batch = records
                        .iter()
                        .filter(|record| !state.holds(&record.month_key()))
                        .cloned()
                        .collect::<Vec<_>>();
                    let backfilled = batch
                        .iter()
                        .filter(|record| merged.holds(&record.month_key()))
                        .count();
                    if backfilled > 0 {
                        warn!(
                            "[{dataset}] {} lacks {backfilled} stored country-month(s); adding them",
                            sink.describe()
                        );
                    }
                    batch
                })
                .collect::<Vec<_>>()
        }
    };

    for idx in 0..sinks.len() {
        if let Err(err) = sinks[idx].stage(mode, &batches[idx]) {
            let err = storage_error(dataset, &*sinks[idx], err);
            discard_all(sinks);
            return Err(err);
        }
    }

    let mut digest = None;
    let mut destinations = Vec::with_capacity(sinks.len());
    for idx in 0..sinks.len() {
        let destination = sinks[idx].describe();
        match sinks[idx].commit() {
            Ok(produced) => {
                if produced.is_some() {
                    digest = produced;
                }
            }
            Err(err) => {
                let err = storage_error(dataset, &*sinks[idx], err);
                discard_all(&mut sinks[idx..]);
                return Err(err);
            }
        }
        info!(
            "[{dataset}] {} {} row(s) -> {destination}",
            if mode == WriteMode::Replace { "wrote" } else { "appended" },
            batches[idx].len()
        );
        destinations.push(destination);
    }

    Ok(WriteOutcome {
        records,
        already_stored,
        digest,
        destinations,
    })
}

fn storage_error(dataset: &str, sink: &dyn CanonicalSink, err: anyhow::Error) -> PipelineError {
    PipelineError::storage(dataset, sink.describe(), format!("{err:#}"))
}

fn discard_all(sinks: &mut [Box<dyn CanonicalSink>]) {
    for sink in sinks.iter_mut() {
        sink.discard();
    }
}
