//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Covpipe: merge instrumented test coverage into summary and annotated reports
#[derive(Parser, Debug)]
#[command(name = "covpipe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Pipeline configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile, discover, merge, render and publish coverage
    Run(RunArgs),

    /// List the test binaries in a build-event stream
    Discover(DiscoverArgs),

    /// Merge snapshot files into a merged index
    Merge(MergeArgs),

    /// Delete snapshots left by an earlier test run
    Clean(CleanArgs),

    /// Render reports from an existing merged index
    Report(ReportArgs),

    /// Show the pipeline configuration
    Config(ConfigArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Replay a recorded build-event stream instead of compiling
    #[arg(long)]
    pub build_events: Option<PathBuf>,

    /// Path exclusion regex
    #[arg(long)]
    pub exclude: Option<String>,

    /// Output destination for the annotated report
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Snapshot naming pattern
    #[arg(long)]
    pub pattern: Option<String>,

    /// Summary output format
    #[arg(short, long, default_value = "text")]
    pub format: SummaryFormat,

    /// Extra arguments for `cargo test --no-run`
    #[arg(last = true)]
    pub cargo_args: Vec<String>,
}

/// Arguments for the discover command
#[derive(Parser, Debug)]
pub struct DiscoverArgs {
    /// Recorded build-event stream
    #[arg(long)]
    pub build_events: PathBuf,
}

/// Arguments for the merge command
#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Recorded build-event stream
    #[arg(long)]
    pub build_events: PathBuf,

    /// Snapshot naming pattern
    #[arg(long)]
    pub pattern: Option<String>,

    /// Merged index file to write
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Snapshot naming pattern
    #[arg(long)]
    pub pattern: Option<String>,
}

/// Arguments for the report command
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Recorded build-event stream
    #[arg(long)]
    pub build_events: PathBuf,

    /// Merged index file
    #[arg(long)]
    pub index: PathBuf,

    /// Also write the annotated HTML report to this path
    #[arg(long)]
    pub html: Option<PathBuf>,

    /// Path exclusion regex
    #[arg(long)]
    pub exclude: Option<String>,

    /// Summary output format
    #[arg(short, long, default_value = "text")]
    pub format: SummaryFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Print the built-in defaults instead of the effective configuration
    #[arg(long)]
    pub default: bool,
}

/// Summary output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SummaryFormat {
    /// Aligned text table
    #[default]
    Text,
    /// JSON document
    Json,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod cli_tests {
        use super::*;

        #[test]
        fn test_parse_run_command() {
            let cli = Cli::parse_from(["covpipe", "run"]);
            let Commands::Run(args) = cli.command else {
                panic!("expected run");
            };
            assert!(args.build_events.is_none());
            assert_eq!(args.format, SummaryFormat::Text);
            assert!(args.cargo_args.is_empty());
        }

        #[test]
        fn test_parse_run_overrides() {
            let cli = Cli::parse_from([
                "covpipe",
                "run",
                "--build-events",
                "events.jsonl",
                "--exclude",
                "/vendor/",
                "--output",
                "out",
                "--pattern",
                "raw/c-%p.json",
                "--format",
                "json",
                "--",
                "--workspace",
            ]);
            let Commands::Run(args) = cli.command else {
                panic!("expected run");
            };
            assert_eq!(args.build_events, Some(PathBuf::from("events.jsonl")));
            assert_eq!(args.exclude.as_deref(), Some("/vendor/"));
            assert_eq!(args.output, Some(PathBuf::from("out")));
            assert_eq!(args.pattern.as_deref(), Some("raw/c-%p.json"));
            assert_eq!(args.format, SummaryFormat::Json);
            assert_eq!(args.cargo_args, vec!["--workspace".to_string()]);
        }

        #[test]
        fn test_global_flags() {
            let cli = Cli::parse_from(["covpipe", "-vv", "--color", "never", "-c", "c.yaml", "config"]);
            assert_eq!(cli.verbose, 2);
            assert!(matches!(cli.color, ColorArg::Never));
            assert_eq!(cli.config, Some(PathBuf::from("c.yaml")));
        }

        #[test]
        fn test_report_requires_index() {
            assert!(Cli::try_parse_from(["covpipe", "report", "--build-events", "e.jsonl"]).is_err());
        }

        #[test]
        fn test_parse_clean_command() {
            let cli = Cli::parse_from(["covpipe", "clean", "--pattern", "raw/c-%p.json"]);
            let Commands::Clean(args) = cli.command else {
                panic!("expected clean");
            };
            assert_eq!(args.pattern.as_deref(), Some("raw/c-%p.json"));
        }

        #[test]
        fn test_parse_merge_command() {
            let cli = Cli::parse_from([
                "covpipe",
                "merge",
                "--build-events",
                "e.jsonl",
                "-o",
                "cov.profdata",
            ]);
            let Commands::Merge(args) = cli.command else {
                panic!("expected merge");
            };
            assert_eq!(args.output, Some(PathBuf::from("cov.profdata")));
        }
    }
}
