//! Covpipe CLI: coverage for Rust test suites
//!
//! ## Usage
//!
//! ```bash
//! covpipe clean                                 # Drop snapshots of an earlier run
//! covpipe run                                   # Compile, test binaries, report
//! covpipe run --build-events events.jsonl       # Replay a recorded build
//! covpipe report --build-events e.jsonl --index target/coverage/covpipe.profdata
//! covpipe config --default                      # Print default configuration
//! ```

use clap::Parser;
use covpipe_cli::{handlers, logging, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = build_config(&cli);
    logging::init(config.verbosity);

    match run(&cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(command: &Commands, config: &CliConfig) -> CliResult<()> {
    match command {
        Commands::Run(args) => handlers::execute_run(config, args),
        Commands::Discover(args) => handlers::execute_discover(config, args),
        Commands::Merge(args) => handlers::execute_merge(config, args),
        Commands::Clean(args) => handlers::execute_clean(config, args).map(|_| ()),
        Commands::Report(args) => handlers::execute_report(config, args),
        Commands::Config(args) => handlers::execute_config(config, args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    let color: ColorChoice = cli.color.clone().into();

    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_config_file(cli.config.clone())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_verbosity() {
        let quiet = build_config(&Cli::parse_from(["covpipe", "-q", "-v", "config"]));
        assert_eq!(quiet.verbosity, Verbosity::Quiet);
        let debug = build_config(&Cli::parse_from(["covpipe", "-vv", "config"]));
        assert_eq!(debug.verbosity, Verbosity::Debug);
        assert!(debug.config_file.is_none());
    }

    #[test]
    fn test_build_config_color_and_file() {
        let config = build_config(&Cli::parse_from([
            "covpipe", "--color", "always", "--config", "c.yaml", "config",
        ]));
        assert_eq!(config.color, ColorChoice::Always);
        assert_eq!(config.config_file, Some(std::path::PathBuf::from("c.yaml")));
    }
}
