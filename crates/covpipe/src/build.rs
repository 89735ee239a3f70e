//! Compile step
//!
//! A [`BuildDriver`] produces the build-event stream the discoverer reads.
//! [`CargoBuild`] compiles the test binaries with instrumentation;
//! [`RecordedBuild`] replays a stream captured earlier.

use crate::artifact::discover_from_stream;
use crate::config::PipelineConfig;
use crate::result::{CovError, CovResult};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Flag that turns on counter instrumentation in rustc
pub const INSTRUMENT_FLAG: &str = "-C instrument-coverage";

/// Produces the build-event stream for a run
pub trait BuildDriver {
    /// Compile (or replay) and return newline-delimited JSON build events
    fn build(&self, config: &PipelineConfig) -> CovResult<String>;
}

/// Instrumented `cargo test --no-run --message-format=json`
#[derive(Debug, Clone, Default)]
pub struct CargoBuild {
    cargo: Option<PathBuf>,
    manifest_dir: Option<PathBuf>,
}

impl CargoBuild {
    /// Use `cargo` from `PATH` in the current directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific cargo executable
    #[must_use]
    pub fn with_cargo(mut self, cargo: impl Into<PathBuf>) -> Self {
        self.cargo = Some(cargo.into());
        self
    }

    /// Run cargo in `dir`
    #[must_use]
    pub fn with_manifest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.manifest_dir = Some(dir.into());
        self
    }

    /// Environment handed to cargo so compile and merge agree on snapshot names
    pub fn environment(&self, config: &PipelineConfig) -> CovResult<Vec<(String, String)>> {
        let base = match &self.manifest_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()
                .map_err(|e| CovError::build(format!("resolving working directory: {e}")))?,
        };
        let pattern = config.snapshot_pattern()?;
        let rustflags = match std::env::var("RUSTFLAGS") {
            Ok(existing) if !existing.trim().is_empty() => format!("{existing} {INSTRUMENT_FLAG}"),
            _ => INSTRUMENT_FLAG.to_string(),
        };
        Ok(vec![
            ("RUSTFLAGS".to_string(), rustflags),
            ("CARGO_INCREMENTAL".to_string(), "0".to_string()),
            ("LLVM_PROFILE_FILE".to_string(), pattern.absolute(&base)),
        ])
    }
}

impl BuildDriver for CargoBuild {
    fn build(&self, config: &PipelineConfig) -> CovResult<String> {
        let cargo = self
            .cargo
            .clone()
            .unwrap_or_else(|| PathBuf::from("cargo"));
        let mut command = Command::new(&cargo);
        command
            .args(["test", "--no-run", "--message-format=json"])
            .args(&config.cargo_args)
            .envs(self.environment(config)?)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.manifest_dir {
            command.current_dir(dir);
        }

        tracing::info!(cargo = %cargo.display(), args = ?config.cargo_args, "compiling instrumented test binaries");
        let output = command
            .output()
            .map_err(|e| CovError::build(format!("running {}: {e}", cargo.display())))?;
        let stream = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            // Prefer the compiler diagnostic carried by the stream.
            discover_from_stream(&stream)?;
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first_error = stderr
                .lines()
                .find(|line| line.starts_with("error"))
                .unwrap_or("compilation failed");
            return Err(CovError::build(format!(
                "cargo exited with {}: {first_error}",
                output.status
            )));
        }
        Ok(stream)
    }
}

/// Replays a build-event stream recorded to a file
#[derive(Debug, Clone)]
pub struct RecordedBuild {
    path: PathBuf,
}

impl RecordedBuild {
    /// Replay `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Recorded stream location
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BuildDriver for RecordedBuild {
    fn build(&self, _config: &PipelineConfig) -> CovResult<String> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            CovError::build(format!(
                "reading build events {}: {e}",
                self.path.display()
            ))
        })
    }
}
