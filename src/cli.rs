use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::WriteMode;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Canonicalize daily epidemiological CSV sources into monthly snapshots",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the canonicalization pipeline for every configured dataset
    Run(RunArgs),
    /// Write the built-in dataset configuration to a YAML file
    InitConfig(InitConfigArgs),
    /// Print canonical rows stored in the relational store
    Show(ShowArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Pipeline configuration (YAML); the built-in datasets are used when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Directory holding the raw source files
    #[arg(long = "data-dir", default_value = "data")]
    pub data_dir: PathBuf,
    /// Directory receiving the canonical CSV files
    #[arg(short = 'o', long = "output-dir", default_value = "cleaned_data")]
    pub output_dir: PathBuf,
    /// Store connection string, e.g. `sqlite://cleaned_data/epi.db`
    #[arg(long)]
    pub database: Option<String>,
    /// Persistence mode (overrides the configuration)
    #[arg(long, value_enum)]
    pub mode: Option<WriteMode>,
    /// Restrict the run to these datasets (repeatable)
    #[arg(short = 'd', long = "dataset", action = clap::ArgAction::Append)]
    pub datasets: Vec<String>,
    /// Write the run summary as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InitConfigArgs {
    /// Destination YAML file
    #[arg(short, long, default_value = "epi-canon.yaml")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Store connection string
    #[arg(long)]
    pub database: String,
    /// Canonical table to read
    #[arg(short, long)]
    pub table: String,
    /// Only rows for this country or territory
    #[arg(long)]
    pub country: Option<String>,
    /// Maximum rows to print
    #[arg(long)]
    pub limit: Option<usize>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err(format!("Delimiter '{other}' must be a single character"));
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
