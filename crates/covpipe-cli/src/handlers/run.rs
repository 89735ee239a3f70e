//! Run command handler

use crate::commands::{RunArgs, SummaryFormat};
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::ProgressReporter;
use covpipe::{CargoBuild, Pipeline, PipelineConfig, PipelineOutcome, RecordedBuild};

/// Apply command-line overrides to a loaded configuration
#[must_use]
pub fn apply_overrides(mut config: PipelineConfig, args: &RunArgs) -> PipelineConfig {
    if let Some(exclude) = &args.exclude {
        config = config.with_exclusion_regex(exclude.clone());
    }
    if let Some(output) = &args.output {
        config = config.with_output_destination(output.clone());
    }
    if let Some(pattern) = &args.pattern {
        config = config.with_snapshot_pattern(pattern.clone());
    }
    config.cargo_args.extend(args.cargo_args.iter().cloned());
    config
}

/// Execute the run command
pub fn execute_run(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let pipeline_config = apply_overrides(config.pipeline_config()?, args);
    tracing::debug!(
        destination = %pipeline_config.output_destination.display(),
        exclude = %pipeline_config.path_exclusion_regex,
        recorded = args.build_events.is_some(),
        "starting pipeline"
    );
    let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());

    let pipeline = Pipeline::new(pipeline_config).with_observer(reporter.clone());
    let pipeline = match &args.build_events {
        Some(path) => pipeline.with_driver(RecordedBuild::new(path)),
        None => pipeline.with_driver(CargoBuild::new()),
    };

    let outcome = pipeline.run()?;
    print_summary(&outcome, args.format, config.color.should_color())?;
    if config.verbosity.is_verbose() {
        reporter.info(&format!(
            "merged {} snapshots from {} test binaries",
            outcome.snapshot_count,
            outcome.artifacts.len()
        ));
    }
    reporter.success(&format!(
        "annotated report written to {}",
        outcome.report_path.display()
    ));
    Ok(())
}

fn print_summary(outcome: &PipelineOutcome, format: SummaryFormat, use_color: bool) -> CliResult<()> {
    match format {
        SummaryFormat::Text => print!("{}", outcome.summary.to_text(use_color)),
        SummaryFormat::Json => println!("{}", outcome.summary.to_json()?),
    }
    Ok(())
}
