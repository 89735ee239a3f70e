//! Pipeline configuration
//!
//! Every option the pipeline recognizes lives in [`PipelineConfig`]. Nothing
//! is read from the ambient environment; the CLI loads a YAML file and applies
//! flag overrides on top.

use crate::result::{CovError, CovResult};
use crate::snapshot::SnapshotPattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default snapshot naming pattern (`%p` = process id, `%m` = module signature)
///
/// Nothing in the name identifies the run. Clear the directory with
/// [`SnapshotPattern::clear`] before the tests execute, or dumps of an earlier
/// run are merged too.
pub const DEFAULT_SNAPSHOT_PATTERN: &str = "target/coverage/raw/cov-%p-%m.json";

/// Default exclusion of dependency and toolchain sources
pub const DEFAULT_EXCLUSION_REGEX: &str =
    r"(/\.cargo/(registry|git)/|/rustc/[0-9a-f]+/|/\.rustup/)";

/// File name of the merged index inside the work directory
pub const MERGED_INDEX_FILE: &str = "covpipe.profdata";

/// Fixed file name the annotated report is staged under before relocation
pub const ANNOTATED_REPORT_FILE: &str = "index.html";

/// File name of the machine-readable summary, staged and published
pub const SUMMARY_JSON_FILE: &str = "summary.json";

/// Covpipe configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Whether binaries are compiled with coverage instrumentation
    pub instrumentation_enabled: bool,
    /// Snapshot file pattern shared by the compile step and the merger
    pub snapshot_name_pattern: String,
    /// Sources matching this regex are dropped from both reports
    pub path_exclusion_regex: String,
    /// Directory the annotated report is published to
    pub output_destination: PathBuf,
    /// Scratch directory for the merged index and the staged report
    pub work_dir: PathBuf,
    /// External demangler command (e.g. `rustfilt`); built-in when unset
    pub demangler_command: Option<String>,
    /// Title of the annotated report
    pub title: String,
    /// Extra arguments for `cargo test --no-run`
    pub cargo_args: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            instrumentation_enabled: true,
            snapshot_name_pattern: DEFAULT_SNAPSHOT_PATTERN.to_string(),
            path_exclusion_regex: DEFAULT_EXCLUSION_REGEX.to_string(),
            output_destination: PathBuf::from("target/coverage/html"),
            work_dir: PathBuf::from("target/coverage"),
            demangler_command: None,
            title: "Coverage Report".to_string(),
            cargo_args: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file
    ///
    /// Missing fields take their defaults.
    pub fn from_yaml_file(path: &Path) -> CovResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CovError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(yaml: &str) -> CovResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(yaml).map_err(|e| CovError::config(e.to_string()))
    }

    /// Render configuration as YAML
    pub fn to_yaml(&self) -> CovResult<String> {
        serde_yaml_ng::to_string(self).map_err(|e| CovError::config(e.to_string()))
    }

    /// Set instrumentation
    #[must_use]
    pub const fn with_instrumentation(mut self, enabled: bool) -> Self {
        self.instrumentation_enabled = enabled;
        self
    }

    /// Set snapshot name pattern
    #[must_use]
    pub fn with_snapshot_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.snapshot_name_pattern = pattern.into();
        self
    }

    /// Set path exclusion regex
    #[must_use]
    pub fn with_exclusion_regex(mut self, regex: impl Into<String>) -> Self {
        self.path_exclusion_regex = regex.into();
        self
    }

    /// Set output destination
    #[must_use]
    pub fn with_output_destination(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_destination = dir.into();
        self
    }

    /// Set work directory
    #[must_use]
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    /// Set external demangler command
    #[must_use]
    pub fn with_demangler_command(mut self, command: impl Into<String>) -> Self {
        self.demangler_command = Some(command.into());
        self
    }

    /// Set report title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Parsed snapshot pattern
    pub fn snapshot_pattern(&self) -> CovResult<SnapshotPattern> {
        SnapshotPattern::parse(&self.snapshot_name_pattern)
    }

    /// Compiled exclusion regex
    pub fn exclusion_regex(&self) -> CovResult<Regex> {
        Regex::new(&self.path_exclusion_regex).map_err(|e| {
            CovError::config(format!(
                "invalid path exclusion regex `{}`: {e}",
                self.path_exclusion_regex
            ))
        })
    }

    /// Path of the merged index file
    #[must_use]
    pub fn merged_index_path(&self) -> PathBuf {
        self.work_dir.join(MERGED_INDEX_FILE)
    }

    /// Path the annotated report is staged at before relocation
    #[must_use]
    pub fn staged_report_path(&self) -> PathBuf {
        self.work_dir.join(ANNOTATED_REPORT_FILE)
    }

    /// Final path of the published annotated report
    #[must_use]
    pub fn published_report_path(&self) -> PathBuf {
        self.output_destination.join(ANNOTATED_REPORT_FILE)
    }

    /// Path the JSON summary is staged at before relocation
    #[must_use]
    pub fn staged_summary_path(&self) -> PathBuf {
        self.work_dir.join(SUMMARY_JSON_FILE)
    }

    /// Final path of the published JSON summary
    #[must_use]
    pub fn published_summary_path(&self) -> PathBuf {
        self.output_destination.join(SUMMARY_JSON_FILE)
    }

    /// Check that the pattern and regex are usable
    pub fn validate(&self) -> CovResult<()> {
        self.snapshot_pattern()?;
        self.exclusion_regex()?;
        if self.output_destination.as_os_str().is_empty() {
            return Err(CovError::config("output destination must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(config.instrumentation_enabled);
        assert_eq!(config.snapshot_name_pattern, DEFAULT_SNAPSHOT_PATTERN);
        assert!(config.demangler_command.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_regex_excludes_registry_sources() {
        let regex = PipelineConfig::default().exclusion_regex().unwrap();
        assert!(regex.is_match("/home/ci/.cargo/registry/src/index/serde-1.0/src/lib.rs"));
        assert!(regex.is_match("/rustc/90b35a6239c3d8bdabc530a6a0816f7ff89a0aaf/library/core/src/fmt/mod.rs"));
        assert!(!regex.is_match("/work/project/src/lib.rs"));
    }

    #[test]
    fn test_yaml_partial_uses_defaults() {
        let config = PipelineConfig::from_yaml_str(
            "path_exclusion_regex: vendor/\noutput_destination: public/coverage\n",
        )
        .unwrap();
        assert_eq!(config.path_exclusion_regex, "vendor/");
        assert_eq!(config.output_destination, PathBuf::from("public/coverage"));
        assert_eq!(config.snapshot_name_pattern, DEFAULT_SNAPSHOT_PATTERN);
    }

    #[test]
    fn test_yaml_empty_is_default() {
        let config = PipelineConfig::from_yaml_str("   \n").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = PipelineConfig::default()
            .with_demangler_command("rustfilt")
            .with_title("Nightly");
        let yaml = config.to_yaml().unwrap();
        assert_eq!(PipelineConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_yaml_unknown_type_is_config_error() {
        let err = PipelineConfig::from_yaml_str("instrumentation_enabled: [1, 2]").unwrap_err();
        assert!(matches!(err, CovError::Config { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_regex() {
        let config = PipelineConfig::default().with_exclusion_regex("(unclosed");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exclusion regex"));
    }

    #[test]
    fn test_validate_rejects_pattern_without_pid() {
        let config = PipelineConfig::default().with_snapshot_pattern("raw/cov-%m.json");
        assert!(matches!(
            config.validate().unwrap_err(),
            CovError::Config { .. }
        ));
    }

    #[test]
    fn test_derived_paths() {
        let config = PipelineConfig::default()
            .with_work_dir("/tmp/cov")
            .with_output_destination("/srv/site");
        assert_eq!(
            config.merged_index_path(),
            PathBuf::from("/tmp/cov/covpipe.profdata")
        );
        assert_eq!(config.staged_report_path(), PathBuf::from("/tmp/cov/index.html"));
        assert_eq!(
            config.published_report_path(),
            PathBuf::from("/srv/site/index.html")
        );
    }
}
