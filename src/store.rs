//! Destinations for canonical tables.
//!
//! A [`CanonicalSink`] is one durable copy of a dataset's canonical table:
//! the flat CSV artifact ([`CsvFileSink`]) or a relational table
//! ([`SqliteSink`]). Writes happen in two steps so that a run either changes
//! every destination or none: [`CanonicalSink::stage`] prepares the rows
//! without making them visible (a temp file, an open transaction), and
//! [`CanonicalSink::commit`] publishes them (a rename, `COMMIT`).

use std::{
    collections::HashMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use log::{debug, warn};
use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    config::WriteMode,
    data::format_date,
    io_utils,
    record::{CANONICAL_HEADERS, CanonicalRecord, MonthKey},
};

/// What a destination already holds: the identity stored for each
/// country-month, and the largest identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub max_id: u64,
    pub ids: HashMap<MonthKey, u64>,
}

impl PersistedState {
    pub fn holds(&self, key: &MonthKey) -> bool {
        self.ids.contains_key(key)
    }

    /// Folds another destination's state in. The first identity seen for a
    /// country-month is kept.
    pub fn merge(&mut self, other: &PersistedState) {
        self.max_id = self.max_id.max(other.max_id);
        for (key, id) in &other.ids {
            self.ids.entry(key.clone()).or_insert(*id);
        }
    }

    fn observe(&mut self, record: &CanonicalRecord) {
        self.max_id = self.max_id.max(record.id);
        self.ids.insert(record.month_key(), record.id);
    }
}

pub trait CanonicalSink {
    /// Human-readable destination, used in logs and errors.
    fn describe(&self) -> String;

    fn persisted(&mut self) -> Result<PersistedState>;

    /// Prepares `records` without making them visible. In replace mode they
    /// become the whole table; in append mode they are added to it. A second
    /// call discards the previous staged write.
    fn stage(&mut self, mode: WriteMode, records: &[CanonicalRecord]) -> Result<()>;

    /// Publishes the staged write. Returns a content digest when the sink
    /// produces one.
    fn commit(&mut self) -> Result<Option<String>>;

    /// Drops a staged write, if any. The destination keeps its old content.
    fn discard(&mut self);

    fn write(&mut self, mode: WriteMode, records: &[CanonicalRecord]) -> Result<Option<String>> {
        self.stage(mode, records)?;
        self.commit()
    }
}

#[derive(Debug)]
pub struct CsvFileSink {
    path: PathBuf,
    staged: Option<io_utils::StagedCsv>,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staged: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_records(&self) -> Result<Vec<CanonicalRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .with_context(|| format!("Opening canonical file {:?}", self.path))?;
        let mut reader = io_utils::open_csv_reader(BufReader::new(file), b',', true);
        let headers = reader.headers()?.iter().collect::<Vec<_>>();
        if headers != CANONICAL_HEADERS {
            bail!(
                "{:?} does not carry the canonical header (found {:?})",
                self.path,
                headers
            );
        }
        reader
            .deserialize::<CanonicalRecord>()
            .enumerate()
            .map(|(idx, record)| {
                record.with_context(|| format!("Reading row {} of {:?}", idx + 2, self.path))
            })
            .collect()
    }

    fn stage_all(&self, records: &[CanonicalRecord]) -> Result<io_utils::StagedCsv> {
        io_utils::stage_csv(
            &self.path,
            &CANONICAL_HEADERS,
            records.iter().map(|record| record.to_row()),
        )
    }
}

impl CanonicalSink for CsvFileSink {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn persisted(&mut self) -> Result<PersistedState> {
        let mut state = PersistedState::default();
        for record in self.read_records()? {
            state.observe(&record);
        }
        Ok(state)
    }

    fn stage(&mut self, mode: WriteMode, records: &[CanonicalRecord]) -> Result<()> {
        self.staged = None;
        let staged = match mode {
            WriteMode::Replace => self.stage_all(records)?,
            WriteMode::Append => {
                let mut combined = self.read_records()?;
                combined.extend_from_slice(records);
                self.stage_all(&combined)?
            }
        };
        debug!("Staged {:?} (sha256 {})", self.path, staged.digest());
        self.staged = Some(staged);
        Ok(())
    }

    fn commit(&mut self) -> Result<Option<String>> {
        let staged = self
            .staged
            .take()
            .ok_or_else(|| anyhow!("Nothing staged for {:?}", self.path))?;
        staged.persist(&self.path).map(Some)
    }

    fn discard(&mut self) {
        self.staged = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

/// Accepts `sqlite::memory:`, `sqlite://<path>`, `sqlite:<path>`, or a bare
/// path. Other URL schemes are rejected.
pub fn parse_connection_string(value: &str) -> Result<StoreLocation> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("Connection string is empty");
    }
    let rest = if let Some(rest) = trimmed.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("sqlite:") {
        rest
    } else if let Some((scheme, _)) = trimmed.split_once("://") {
        bail!("Unsupported store scheme '{scheme}' (expected sqlite)");
    } else {
        trimmed
    };
    match rest {
        "" => Err(anyhow!("Connection string '{value}' has no path")),
        ":memory:" => Ok(StoreLocation::Memory),
        path => Ok(StoreLocation::File(PathBuf::from(path))),
    }
}

pub struct SqliteSink {
    conn: Connection,
    table: String,
    location: StoreLocation,
}

impl SqliteSink {
    pub fn open(connection: &str, table: &str) -> Result<Self> {
        let location = parse_connection_string(connection)?;
        let conn = match &location {
            StoreLocation::Memory => Connection::open_in_memory()?,
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Creating store directory {parent:?}"))?;
                }
                Connection::open(path).with_context(|| format!("Opening store {path:?}"))?
            }
        };
        let sink = Self {
            conn,
            table: table.to_string(),
            location,
        };
        sink.ensure_table()?;
        Ok(sink)
    }

    fn ensure_table(&self) -> Result<()> {
        let table = &self.table;
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{table}\" (
                    id INTEGER PRIMARY KEY,
                    country_region TEXT NOT NULL,
                    date TEXT NOT NULL,
                    total_cases REAL NOT NULL,
                    total_deaths REAL NOT NULL,
                    total_recovered REAL NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS \"{table}_country_month\"
                    ON \"{table}\" (country_region, substr(date, 1, 7));"
            ))
            .with_context(|| format!("Preparing table '{table}'"))
    }

    fn insert_all(conn: &Connection, table: &str, records: &[CanonicalRecord]) -> Result<()> {
        let mut stmt = conn.prepare(&format!(
            "INSERT INTO \"{table}\" (id, country_region, date, total_cases, total_deaths, total_recovered)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ))?;
        for record in records {
            let id = i64::try_from(record.id)
                .map_err(|_| anyhow!("Identity {} exceeds the store's range", record.id))?;
            stmt.execute(params![
                id,
                record.country_region,
                format_date(record.date),
                record.total_cases,
                record.total_deaths,
                record.total_recovered,
            ])
            .with_context(|| format!("Inserting id {} ({})", record.id, record.country_region))?;
        }
        Ok(())
    }

    fn write_rows(&self, mode: WriteMode, records: &[CanonicalRecord]) -> Result<()> {
        if mode == WriteMode::Replace {
            self.conn
                .execute(&format!("DELETE FROM \"{}\"", self.table), [])?;
        }
        Self::insert_all(&self.conn, &self.table, records)?;
        debug!(
            "Staged {} row(s) for {} ({})",
            records.len(),
            self.describe(),
            mode.label()
        );
        Ok(())
    }

    /// Reads stored rows ordered by identity.
    pub fn read_records(
        &self,
        country: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<CanonicalRecord>> {
        let table = &self.table;
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, country_region, date, total_cases, total_deaths, total_recovered
             FROM \"{table}\"
             WHERE (?1 IS NULL OR country_region = ?1)
             ORDER BY id
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![country, limit], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (id, country_region, date, total_cases, total_deaths, total_recovered) = row?;
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("Stored row {id} has malformed date '{date}'"))?;
            records.push(CanonicalRecord {
                id: u64::try_from(id).map_err(|_| anyhow!("Stored row has negative id {id}"))?,
                country_region,
                date,
                total_cases,
                total_deaths,
                total_recovered,
            });
        }
        Ok(records)
    }
}

impl CanonicalSink for SqliteSink {
    fn describe(&self) -> String {
        match &self.location {
            StoreLocation::Memory => format!("sqlite::memory:/{}", self.table),
            StoreLocation::File(path) => format!("{}#{}", path.display(), self.table),
        }
    }

    fn persisted(&mut self) -> Result<PersistedState> {
        let table = &self.table;
        let max_id: Option<i64> = self
            .conn
            .query_row(&format!("SELECT MAX(id) FROM \"{table}\""), [], |row| row.get(0))
            .optional()?
            .flatten();
        let mut state = PersistedState {
            max_id: max_id.unwrap_or(0).max(0) as u64,
            ids: HashMap::new(),
        };
        for record in self.read_records(None, None)? {
            state.ids.insert(record.month_key(), record.id);
        }
        Ok(state)
    }

    fn stage(&mut self, mode: WriteMode, records: &[CanonicalRecord]) -> Result<()> {
        self.discard();
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .with_context(|| format!("Starting a write on {}", self.describe()))?;
        let written = self.write_rows(mode, records);
        if written.is_err() {
            self.discard();
        }
        written
    }

    fn commit(&mut self) -> Result<Option<String>> {
        if self.conn.is_autocommit() {
            bail!("Nothing staged for {}", self.describe());
        }
        self.conn
            .execute_batch("COMMIT")
            .with_context(|| format!("Committing {}", self.describe()))?;
        Ok(None)
    }

    fn discard(&mut self) {
        if self.conn.is_autocommit() {
            return;
        }
        if let Err(err) = self.conn.execute_batch("ROLLBACK") {
            warn!("Rolling back {} failed: {err}", self.describe());
        }
    }
}
