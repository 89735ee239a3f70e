//! Clean command handler

use crate::commands::CleanArgs;
use crate::config::CliConfig;
use crate::error::CliResult;

/// Execute the clean command
pub fn execute_clean(config: &CliConfig, args: &CleanArgs) -> CliResult<usize> {
    let mut pipeline_config = config.pipeline_config()?;
    if let Some(pattern) = &args.pattern {
        pipeline_config = pipeline_config.with_snapshot_pattern(pattern.clone());
    }
    let pattern = pipeline_config.snapshot_pattern()?;
    let removed = pattern.clear()?;
    if !config.verbosity.is_quiet() {
        println!(
            "removed {removed} stale snapshots from {}",
            pattern.directory().display()
        );
    }
    Ok(removed)
}
