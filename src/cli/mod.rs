//! Command line interface.

pub mod args;
pub mod command;

use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use self::args::{InspectArgs, PlanArgs, RunArgs};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Loads ERA5-Land reanalysis time series into a relational table
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Cli {
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Retrieve, transform and load every planned chunk
    Run(RunArgs),
    /// Print the chunk plan without touching the network or the database
    Plan(PlanArgs),
    /// Read a downloaded artifact and describe its contents
    Inspect(InspectArgs),
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    let style = ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

    ProgressBar::new(size).with_message(message).with_style(style)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn should_have_consistent_arguments() {
        Cli::command().debug_assert();
    }

    #[test]
    fn should_pick_log_level() {
        let cli = Cli::try_parse_from(["era5land", "-v", "plan"]).unwrap();
        assert_eq!(cli.log_level(), "debug");

        let cli = Cli::try_parse_from(["era5land", "plan", "--quiet"]).unwrap();
        assert_eq!(cli.log_level(), "warn");

        let cli = Cli::try_parse_from(["era5land", "plan"]).unwrap();
        assert_eq!(cli.log_level(), "info");
    }
}
