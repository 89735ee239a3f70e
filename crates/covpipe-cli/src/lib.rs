//! Covpipe CLI Library
//!
//! Command-line interface for the Covpipe coverage pipeline.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
mod output;

pub use commands::{
    CleanArgs, Cli, ColorArg, Commands, ConfigArgs, DiscoverArgs, MergeArgs, ReportArgs, RunArgs,
    SummaryFormat,
};
pub use config::{CliConfig, ColorChoice, Verbosity, DEFAULT_CONFIG_FILE};
pub use error::{CliError, CliResult};
pub use output::ProgressReporter;
