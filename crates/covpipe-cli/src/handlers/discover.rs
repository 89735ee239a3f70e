//! Discover command handler

use crate::commands::DiscoverArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use covpipe::{ArtifactSet, BuildDriver, RecordedBuild, Stage};

/// Discover the test binaries of a recorded build
///
/// The same rules as a full run apply: compile errors are build failures and
/// an empty result is a discovery mismatch.
pub fn discover_recorded(config: &CliConfig, events: &std::path::Path) -> CliResult<ArtifactSet> {
    let pipeline_config = config.pipeline_config()?;
    let stream = RecordedBuild::new(events)
        .build(&pipeline_config)
        .map_err(|e| e.in_stage(Stage::Compile))?;
    let artifacts = covpipe::discover_from_stream(&stream)?;
    artifacts.require_non_empty()?;
    Ok(artifacts)
}

/// Execute the discover command
pub fn execute_discover(config: &CliConfig, args: &DiscoverArgs) -> CliResult<()> {
    let artifacts = discover_recorded(config, &args.build_events)?;
    for path in &artifacts {
        println!("{}", path.display());
    }
    Ok(())
}
