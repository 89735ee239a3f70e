//! Config command handler

use crate::commands::ConfigArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use covpipe::PipelineConfig;

/// Render the configuration the command would print
pub fn render_config(config: &CliConfig, args: &ConfigArgs) -> CliResult<String> {
    let pipeline_config = if args.default {
        PipelineConfig::default()
    } else {
        config.pipeline_config()?
    };
    Ok(pipeline_config.to_yaml()?)
}

/// Execute the config command
pub fn execute_config(config: &CliConfig, args: &ConfigArgs) -> CliResult<()> {
    print!("{}", render_config(config, args)?);
    Ok(())
}
