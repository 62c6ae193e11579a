//! Versioned pipeline configuration.
//!
//! Each dataset declares its raw-to-canonical column mapping, the raw columns
//! it requires, and the category names it excludes. Configuration is loaded
//! from YAML (or taken from [`PipelineConfig::builtin`]) and validated before
//! any input is read.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{cli, error::PipelineError, frame::Field, io_utils};

pub const CONTINENTS: &[&str] = &[
    "Africa",
    "Asia",
    "Europe",
    "North America",
    "South America",
    "Oceania",
    "Antarctica",
];

const MANDATORY_FIELDS: [Field; 4] = [
    Field::CountryRegion,
    Field::Date,
    Field::TotalCases,
    Field::TotalDeaths,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Overwrite the destination table with this run's output.
    #[default]
    Replace,
    /// Insert only country-months the destination does not hold yet.
    Append,
}

impl WriteMode {
    pub fn label(&self) -> &'static str {
        match self {
            WriteMode::Replace => "replace",
            WriteMode::Append => "append",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default)]
    pub mode: WriteMode,
    pub datasets: Vec<DatasetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetConfig {
    pub name: String,
    /// Raw CSV, relative to the data directory unless absolute.
    pub input: PathBuf,
    /// Canonical CSV, relative to the output directory unless absolute.
    pub output: PathBuf,
    /// Relational table receiving the canonical rows.
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_formats: Vec<String>,
    pub required: Vec<String>,
    /// Raw column name -> canonical field.
    pub columns: BTreeMap<String, Field>,
    #[serde(default)]
    pub exclude: BTreeSet<String>,
}

impl DatasetConfig {
    pub fn input_path(&self, data_dir: &Path) -> PathBuf {
        resolve_against(data_dir, &self.input)
    }

    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        resolve_against(output_dir, &self.output)
    }

    pub fn delimiter_byte(&self) -> Result<Option<u8>, PipelineError> {
        self.delimiter
            .as_deref()
            .map(|raw| {
                cli::parse_delimiter(raw).map_err(|err| {
                    PipelineError::Config(format!("dataset '{}': {err}", self.name))
                })
            })
            .transpose()
    }

    fn validate(&self) -> Result<(), PipelineError> {
        let fail = |msg: String| PipelineError::Config(format!("dataset '{}': {msg}", self.name));

        if !is_sql_identifier(&self.table) {
            return Err(fail(format!(
                "table '{}' must be a plain SQL identifier",
                self.table
            )));
        }
        let mut seen = HashSet::new();
        for (raw, field) in &self.columns {
            if !seen.insert(*field) {
                return Err(fail(format!(
                    "more than one raw column maps to '{field}' (second: '{raw}')"
                )));
            }
        }
        for field in MANDATORY_FIELDS {
            if !seen.contains(&field) {
                return Err(fail(format!("no raw column maps to '{field}'")));
            }
        }
        for required in &self.required {
            if !self.columns.contains_key(required) {
                return Err(fail(format!(
                    "required column '{required}' is not part of the column mapping"
                )));
            }
        }
        self.delimiter_byte()?;
        io_utils::resolve_encoding(self.encoding.as_deref()).map_err(|err| fail(err.to_string()))?;
        Ok(())
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: PipelineConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_yaml::to_string(self).context("Serializing config")?;
        let mut file =
            File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.datasets.is_empty() {
            return Err(PipelineError::Config(
                "at least one dataset must be declared".to_string(),
            ));
        }
        let mut names = HashSet::new();
        let mut tables = HashSet::new();
        for dataset in &self.datasets {
            if dataset.name.trim().is_empty() {
                return Err(PipelineError::Config(
                    "dataset names cannot be empty".to_string(),
                ));
            }
            if !names.insert(dataset.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "dataset '{}' is declared twice",
                    dataset.name
                )));
            }
            if !tables.insert(dataset.table.as_str()) {
                return Err(PipelineError::Config(format!(
                    "table '{}' is used by more than one dataset",
                    dataset.table
                )));
            }
            dataset.validate()?;
        }
        Ok(())
    }

    /// Keeps only the named datasets, in configuration order.
    pub fn select(&mut self, names: &[String]) -> Result<(), PipelineError> {
        if names.is_empty() {
            return Ok(());
        }
        for name in names {
            if !self.datasets.iter().any(|d| &d.name == name) {
                return Err(PipelineError::Config(format!("unknown dataset '{name}'")));
            }
        }
        self.datasets.retain(|d| names.contains(&d.name));
        Ok(())
    }

    /// The COVID-19 (worldometer) and Mpox (OWID) sources.
    pub fn builtin() -> Self {
        let exclude = CONTINENTS.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>();
        PipelineConfig {
            database: None,
            mode: WriteMode::Replace,
            datasets: vec![
                DatasetConfig {
                    name: "covid19_daily".to_string(),
                    input: PathBuf::from("worldometer_coronavirus_daily_data.csv"),
                    output: PathBuf::from("cleaned_covid19_daily_dataset.csv"),
                    table: "covid19_daily".to_string(),
                    delimiter: None,
                    encoding: None,
                    date_formats: Vec::new(),
                    required: strings(&[
                        "date",
                        "country",
                        "cumulative_total_cases",
                        "cumulative_total_deaths",
                    ]),
                    columns: mapping(&[
                        ("date", Field::Date),
                        ("country", Field::CountryRegion),
                        ("cumulative_total_cases", Field::TotalCases),
                        ("cumulative_total_deaths", Field::TotalDeaths),
                    ]),
                    exclude: exclude.clone(),
                },
                DatasetConfig {
                    name: "mpox".to_string(),
                    input: PathBuf::from("owid-monkeypox-data.csv"),
                    output: PathBuf::from("cleaned_mpox_dataset.csv"),
                    table: "mpox".to_string(),
                    delimiter: None,
                    encoding: None,
                    date_formats: Vec::new(),
                    required: strings(&["date", "location", "total_cases", "total_deaths"]),
                    columns: mapping(&[
                        ("date", Field::Date),
                        ("location", Field::CountryRegion),
                        ("total_cases", Field::TotalCases),
                        ("total_deaths", Field::TotalDeaths),
                    ]),
                    exclude,
                },
            ],
        }
    }
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn mapping(pairs: &[(&str, Field)]) -> BTreeMap<String, Field> {
    pairs
        .iter()
        .map(|(raw, field)| (raw.to_string(), *field))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_is_valid() {
        let config = PipelineConfig::builtin();
        config.validate().expect("builtin config validates");
        assert_eq!(config.datasets.len(), 2);
        assert!(config.datasets[0].exclude.contains("Europe"));
    }

    #[test]
    fn yaml_round_trip_preserves_mapping() {
        let config = PipelineConfig::builtin();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("country: country_region"));
        let parsed: PipelineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn validation_rejects_unmapped_required_column() {
        let mut config = PipelineConfig::builtin();
        config.datasets[1].required.push("iso_code".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("iso_code"));
    }

    #[test]
    fn validation_rejects_missing_canonical_target() {
        let mut config = PipelineConfig::builtin();
        config.datasets[0].columns.remove("cumulative_total_deaths");
        config.datasets[0]
            .required
            .retain(|c| c != "cumulative_total_deaths");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("total_deaths"));
    }

    #[test]
    fn validation_rejects_duplicate_targets_and_bad_tables() {
        let mut config = PipelineConfig::builtin();
        config.datasets[0]
            .columns
            .insert("new_cases".to_string(), Field::TotalCases);
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::builtin();
        config.datasets[0].table = "covid; DROP TABLE mpox".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn select_keeps_named_datasets() {
        let mut config = PipelineConfig::builtin();
        config.select(&["mpox".to_string()]).unwrap();
        assert_eq!(config.datasets.len(), 1);
        assert_eq!(config.datasets[0].name, "mpox");
        assert!(config.select(&["measles".to_string()]).is_err());
    }
}
