//! Report command handler

use super::discover::discover_recorded;
use crate::commands::{ReportArgs, SummaryFormat};
use crate::config::CliConfig;
use crate::error::CliResult;
use covpipe::demangle;
use covpipe::{reconcile, AnnotatedReport, MergedIndex, PathFilter, RenderContext, SummaryReport};

/// Execute the report command
pub fn execute_report(config: &CliConfig, args: &ReportArgs) -> CliResult<()> {
    let mut pipeline_config = config.pipeline_config()?;
    if let Some(exclude) = &args.exclude {
        pipeline_config = pipeline_config.with_exclusion_regex(exclude.clone());
    }
    let filter = PathFilter::from_regex(pipeline_config.exclusion_regex()?);
    let demangler = demangle::from_config(pipeline_config.demangler_command.as_deref())?;

    let artifacts = discover_recorded(config, &args.build_events)?;
    let index = MergedIndex::read_from(&args.index)?;
    let ctx = RenderContext::new(&index, &artifacts, &filter, &*demangler);

    let summary = SummaryReport::render(&ctx)?;
    match args.format {
        SummaryFormat::Text => print!("{}", summary.to_text(config.color.should_color())),
        SummaryFormat::Json => println!("{}", summary.to_json()?),
    }

    if let Some(html) = &args.html {
        let annotated = AnnotatedReport::render(&ctx)?;
        reconcile(&summary, &annotated)?;
        annotated.write_html(html, &pipeline_config.title)?;
        if !config.verbosity.is_quiet() {
            eprintln!("annotated report written to {}", html.display());
        }
    }
    Ok(())
}
