#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use epi_canon::config::DatasetConfig;
use epi_canon::frame::{Field, RawTable};
use tempfile::{TempDir, tempdir};

pub const OWID_HEADER: &str = "iso_code,location,date,total_cases,total_deaths,new_cases";

/// Scratch directory with `data/` and `cleaned_data/` subdirectories, removed
/// on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let workspace = Self {
            temp_dir: tempdir().expect("temp dir"),
        };
        fs::create_dir_all(workspace.data_dir()).expect("create data dir");
        workspace
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.path().join("data")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("cleaned_data")
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path().join(name)).expect("read workspace file")
    }
}

/// A dataset shaped like the OWID mpox export.
pub fn owid_dataset(name: &str, exclude: &[&str]) -> DatasetConfig {
    DatasetConfig {
        name: name.to_string(),
        input: PathBuf::from(format!("{name}.csv")),
        output: PathBuf::from(format!("cleaned_{name}.csv")),
        table: name.to_string(),
        delimiter: None,
        encoding: None,
        date_formats: Vec::new(),
        required: ["date", "location", "total_cases", "total_deaths"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        columns: [
            ("date", Field::Date),
            ("location", Field::CountryRegion),
            ("total_cases", Field::TotalCases),
            ("total_deaths", Field::TotalDeaths),
        ]
        .into_iter()
        .map(|(raw, field)| (raw.to_string(), field))
        .collect::<BTreeMap<_, _>>(),
        exclude: exclude.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
    }
}

/// Builds an OWID-shaped raw table from `(location, date, cases, deaths)`.
pub fn owid_table(rows: &[(&str, &str, &str, &str)]) -> RawTable {
    RawTable::new(
        OWID_HEADER.split(',').map(|s| s.to_string()).collect(),
        rows.iter()
            .map(|(location, date, cases, deaths)| {
                vec![
                    "XXX".to_string(),
                    location.to_string(),
                    date.to_string(),
                    cases.to_string(),
                    deaths.to_string(),
                    "1".to_string(),
                ]
            })
            .collect(),
    )
}

pub fn owid_csv(rows: &[(&str, &str, &str, &str)]) -> String {
    let mut out = String::from(OWID_HEADER);
    out.push('\n');
    for (location, date, cases, deaths) in rows {
        out.push_str(&format!("XXX,{location},{date},{cases},{deaths},1\n"));
    }
    out
}
