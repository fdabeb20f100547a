//! CLI argument parsing for tarantula

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::event::Outcome;

/// Output format for rankings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

/// Outcome selector for `events --only`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutcomeArg {
    Pass,
    Fail,
}

impl From<OutcomeArg> for Outcome {
    fn from(arg: OutcomeArg) -> Self {
        match arg {
            OutcomeArg::Pass => Outcome::Pass,
            OutcomeArg::Fail => Outcome::Fail,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "tarantula")]
#[command(version)]
#[command(about = "Spectrum-based fault localization with the Tarantula metric", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    /// Tracer configuration file (TOML)
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Exclude code from tracing (e.g., -e ignore=fn:check,mod:app::support)
    #[arg(short = 'e', long = "ignore", value_name = "EXPR", global = true)]
    pub ignore: Vec<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Trace the built-in `middle` example and rank its lines
    Demo {
        /// Write the collected runs as a JSON report
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Number of ranked events to print
        #[arg(long, value_name = "N")]
        top: Option<usize>,
    },

    /// Rank the events of a saved report by suspiciousness
    Rank {
        /// JSON report written by `demo --output`
        report: PathBuf,

        /// Number of ranked events to print
        #[arg(long, value_name = "N")]
        top: Option<usize>,

        /// Output format (text or json)
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List the events of a saved report
    Events {
        /// JSON report written by `demo --output`
        report: PathBuf,

        /// Only events seen exclusively in passing or failing runs
        #[arg(long, value_enum)]
        only: Option<OutcomeArg>,
    },
}
