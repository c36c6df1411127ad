//! Chain ledger binary.
//!
//! Loads configuration, then runs one of the `setup`, `ingest`, `show`, or
//! `config` subcommands. Results are printed to stdout as JSON; logs go to
//! stderr.

use std::{
    io::{self, IsTerminal, Write},
    process::ExitCode,
};

use chain_ledger_server::{
    commands,
    config::{
        AppConfig, CONFIG_EXAMPLE, Cli, CliCommand, ConfigAction, LogFormat, ShowTarget,
        config_schema,
    },
    error::{CliError, LedgerSnafu, OutputSnafu},
};
use chain_ledger_state::Ledger;
use clap::Parser;
use serde::Serialize;
use snafu::ResultExt;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Configuration utilities work without a configuration file.
    if let CliCommand::Config { action } = cli.command {
        match action {
            ConfigAction::Schema => println!("{}", config_schema()),
            ConfigAction::Example => print!("{CONFIG_EXAMPLE}"),
        }
        return ExitCode::SUCCESS;
    }

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        },
    };
    init_logging(cli.log_format.unwrap_or(config.log_format));

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            if let Some(action) = e.suggested_action() {
                eprintln!("Hint: {action}");
            }
            ExitCode::FAILURE
        },
    }
}

fn run(command: CliCommand, config: &AppConfig) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    match command {
        CliCommand::Setup { reset } => {
            let report = commands::setup(&config.ledger, reset)?;
            let output = SetupOutput { dropped: &report.dropped, created: &report.created };
            print_json(&mut stdout, &output)
        },
        CliCommand::Ingest { file } => {
            let report = commands::ingest_events(&config.ledger, file.as_deref())?;
            print_json(&mut stdout, &report)
        },
        CliCommand::Show { target } => {
            let ledger = Ledger::connect(&config.ledger).context(LedgerSnafu)?;
            match target {
                ShowTarget::Blocks { from, to } => {
                    commands::show_blocks(&ledger, from, to, &mut stdout)?;
                },
                ShowTarget::State { table, key, history } => {
                    commands::show_state(&ledger, &table, key.as_deref(), history, &mut stdout)?;
                },
            }
            Ok(())
        },
        CliCommand::Config { .. } => Ok(()),
    }
}

#[derive(Serialize)]
struct SetupOutput<'a> {
    dropped: &'a [String],
    created: &'a [String],
}

fn print_json(out: &mut impl Write, value: &impl Serialize) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *out, value).map_err(io::Error::from).context(OutputSnafu)?;
    writeln!(out).context(OutputSnafu)
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the default `info` filter.
fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = match format {
        LogFormat::Json => true,
        LogFormat::Text => false,
        LogFormat::Auto => !io::stderr().is_terminal(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(io::stderr))
            .init();
    }
}
