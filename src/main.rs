mod cds;
mod cli;
mod config;
mod dataset;
mod db;
mod download;
mod error;
mod outcome;
mod pipeline;
mod plan;
mod reading;
mod transform;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use cli::{command, Cli, Commands};
use tracing::{debug, warn};

/// Conventional exit status after SIGINT.
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.log_level());

    match execute(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Run(args) => {
            tokio::select! {
                summary = command::run(args) => {
                    let summary = summary?;
                    println!("{summary}");
                    for window in summary.failed_windows() {
                        warn!(%window, "Window needs a retry");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("Interrupted; artifacts already downloaded are kept for the next run");
                    return Ok(ExitCode::from(INTERRUPTED));
                }
            }
        }
        Commands::Plan(args) => println!("{}", command::plan(args)?),
        Commands::Inspect(args) => println!("{}", command::inspect(args)?),
    }

    Ok(ExitCode::SUCCESS)
}

fn setup_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("era5land={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .init();

    debug!("Logging initialized at level: {level}");
}
