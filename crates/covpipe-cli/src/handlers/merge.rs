//! Merge command handler

use super::discover::discover_recorded;
use crate::commands::MergeArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use covpipe::{JsonSnapshotReader, ProfileMerger, Stage};

/// Execute the merge command
pub fn execute_merge(config: &CliConfig, args: &MergeArgs) -> CliResult<()> {
    let mut pipeline_config = config.pipeline_config()?;
    if let Some(pattern) = &args.pattern {
        pipeline_config = pipeline_config.with_snapshot_pattern(pattern.clone());
    }
    let artifacts = discover_recorded(config, &args.build_events)?;

    let pattern = pipeline_config.snapshot_pattern()?;
    let snapshots = pattern.find()?;
    let index = ProfileMerger::new(&artifacts, &JsonSnapshotReader).merge(&snapshots)?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| pipeline_config.merged_index_path());
    index
        .write_to(&output)
        .map_err(|e| e.in_stage(Stage::Merge))?;

    println!(
        "merged {} snapshots into {} records ({} test binaries) -> {}",
        snapshots.len(),
        index.len(),
        index.objects().len(),
        output.display()
    );
    Ok(())
}
