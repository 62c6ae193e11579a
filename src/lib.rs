pub mod cli;
pub mod config;
pub mod data;
pub mod dates;
pub mod derive;
pub mod error;
pub mod fill;
pub mod filter;
pub mod frame;
pub mod identity;
pub mod io_utils;
pub mod pipeline;
pub mod record;
pub mod reduce;
pub mod report;
pub mod schema_map;
pub mod store;
pub mod table;
pub mod writer;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    config::PipelineConfig,
    pipeline::PipelineContext,
};

static LOGGER: OnceLock<()> = OnceLock::new();

const DATABASE_ENV: &str = "DATABASE_URL";

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("epi_canon", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(&args),
        Commands::InitConfig(args) => handle_init_config(&args),
        Commands::Show(args) => handle_show(&args),
    }
}

fn handle_run(args: &cli::RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Loading configuration from {path:?}"))?,
        None => {
            debug!("No configuration given; using built-in datasets");
            PipelineConfig::builtin()
        }
    };
    config.select(&args.datasets)?;

    let database = args
        .database
        .clone()
        .or_else(|| config.database.clone())
        .or_else(|| env::var(DATABASE_ENV).ok().filter(|v| !v.trim().is_empty()));
    if database.is_none() {
        info!("No store configured; writing canonical CSV files only");
    }
    let ctx = PipelineContext::new(&args.data_dir, &args.output_dir)
        .with_database(database)
        .with_mode(args.mode.unwrap_or(config.mode));

    let reports = pipeline::run_all(&ctx, &config);

    let headers = report::SUMMARY_HEADERS
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    table::print_table(&headers, &report::summary_rows(&reports));
    if let Some(path) = &args.report {
        report::save_json(path, &reports)?;
        info!("Run report written to {path:?}");
    }

    let failed = reports
        .iter()
        .filter(|report| !report.is_success())
        .map(|report| format!("{} ({})", report.dataset, report.status_label()))
        .collect::<Vec<_>>();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} dataset(s) failed: {}",
            failed.len(),
            reports.len(),
            failed.join(", ")
        ))
    }
}

fn handle_init_config(args: &cli::InitConfigArgs) -> Result<()> {
    let config = PipelineConfig::builtin();
    config
        .save(&args.output)
        .with_context(|| format!("Writing configuration to {:?}", args.output))?;
    info!(
        "Configuration for {} dataset(s) written to {:?}",
        config.datasets.len(),
        args.output
    );
    Ok(())
}

fn handle_show(args: &cli::ShowArgs) -> Result<()> {
    let sink = store::SqliteSink::open(&args.database, &args.table)
        .with_context(|| format!("Opening table '{}'", args.table))?;
    let records = sink.read_records(args.country.as_deref(), args.limit)?;
    let headers = record::CANONICAL_HEADERS
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = records
        .iter()
        .map(|r| r.to_row().to_vec())
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    info!("Displayed {} row(s) from '{}'", rows.len(), args.table);
    Ok(())
}
