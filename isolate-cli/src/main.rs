// SPDX-License-Identifier: MIT

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;

use crate::archive::ArchiveCommand;
use crate::error::{CliError, Result};

mod archive;
mod config;
mod error;

/// Content-addressed archiving client
#[derive(Parser)]
#[command(name = "isolate", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    Archive(ArchiveCommand),
}

fn init_logging() -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()
        .map_err(|e| CliError::Logging {
            reason: e.to_string(),
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .finish()
        .try_init()
        .map_err(|e| CliError::Logging {
            reason: e.to_string(),
        })
}

async fn run(cli: Cli) -> Result<()> {
    init_logging()?;
    let config = config::load()?;
    match cli.command {
        Commands::Archive(cmd) => cmd.run(config).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version requests are not failures.
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("isolate: {e}");
            ExitCode::FAILURE
        }
    }
}
