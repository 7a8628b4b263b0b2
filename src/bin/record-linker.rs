// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use record_linker::{
    config::Settings,
    link::{
        loader::{ConfigEntry, ConfigLoader},
        runner::{LinkRunner, RunOptions},
    },
    table::{baserow::BaserowBackend, client::TableClient},
};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::{
    io::{stderr, IsTerminal},
    path::PathBuf,
    process::exit,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "record-linker [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to settings file to use instead of the default one.
    #[arg(short, long, global = true, value_name = "path")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<bool> {
        let settings = Settings::load(self.settings.as_deref())?;
        match self.command {
            Command::Run(opts) => run_links(settings, opts).await,
            Command::Check => run_check(settings).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Link records for every active link configuration.
    #[command(override_usage = "record-linker run [options]")]
    Run(RunArgs),

    /// Load and validate link configurations without linking anything.
    #[command(override_usage = "record-linker check")]
    Check,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RunArgs {
    /// Match and report, but write nothing.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Leave source rows alone whose reference field is already filled.
    #[arg(long)]
    pub skip_linked: bool,

    /// Compare text match values without regard to case.
    #[arg(short, long)]
    pub ignore_case: bool,

    /// Only run link configurations with these names.
    #[arg(long, value_name = "name")]
    pub only: Vec<String>,

    /// Print run report as JSON to stdout.
    #[arg(long)]
    pub json: bool,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time()
        .with_writer(stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match run().await {
        Ok(true) => exit(0),
        Ok(false) => exit(1),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

async fn run() -> Result<bool> {
    Cli::parse().run().await
}

fn connect(settings: &Settings) -> Result<TableClient<BaserowBackend>> {
    let backend = BaserowBackend::from_settings(&settings.baserow)?;
    Ok(TableClient::from_settings(backend, &settings.client))
}

async fn run_links(settings: Settings, opts: RunArgs) -> Result<bool> {
    let client = connect(&settings)?;
    let entries = ConfigLoader::new(&client, settings.config_table_id()?)
        .load_configs()
        .await?;
    let entries = select(entries, &opts.only)?;

    let mut options = RunOptions::from_settings(&settings);
    options.dry_run = opts.dry_run;
    options.skip_linked |= opts.skip_linked;
    options.match_options.ignore_case |= opts.ignore_case;
    options.show_progress = stderr().is_terminal();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finish current link configuration then stop");
            on_signal.cancel();
        }
    });

    let report = LinkRunner::new(&client, options)
        .with_cancellation(cancel)
        .run_entries(&entries)
        .await;
    report.log();

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(report.is_success())
}

async fn run_check(settings: Settings) -> Result<bool> {
    let client = connect(&settings)?;
    let entries = ConfigLoader::new(&client, settings.config_table_id()?)
        .load_configs()
        .await?;

    let mut valid = true;
    for entry in &entries {
        match entry {
            ConfigEntry::Ready(config) => info!(
                name = %config.name,
                source = %config.source_table_id,
                target = %config.target_table_id,
                reference = %config.reference_mode,
                "{:?} = {:?} -> {:?}",
                config.source_match_field,
                config.target_match_field,
                config.source_reference_field
            ),
            ConfigEntry::Inactive { name } => info!(name = %name, "inactive"),
            ConfigEntry::Malformed { row, name, error } => {
                error!(name = %name, %row, "malformed: {error}");
                valid = false;
            }
        }
    }

    Ok(valid)
}

/// Keep only configuration rows named by `only`, or all if `only` is empty.
fn select(entries: Vec<ConfigEntry>, only: &[String]) -> Result<Vec<ConfigEntry>> {
    if only.is_empty() {
        return Ok(entries);
    }

    for name in only {
        if !entries.iter().any(|entry| entry.name() == name) {
            bail!("no link configuration named {name:?}");
        }
    }

    Ok(entries
        .into_iter()
        .filter(|entry| only.iter().any(|name| name == entry.name()))
        .collect())
}
