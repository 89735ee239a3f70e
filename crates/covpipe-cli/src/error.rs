//! Error types for the CLI

use covpipe::{CovError, Stage};
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Pipeline error
    #[error("{}", describe(.0))]
    Pipeline(#[from] CovError),

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe(error: &CovError) -> String {
    match error.stage() {
        Some(stage) => format!("stage '{stage}' failed: {error}"),
        None => error.to_string(),
    }
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Stage that failed, for pipeline errors
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Pipeline(e) => e.stage(),
            _ => None,
        }
    }

    /// Process exit status for this error
    ///
    /// compile 2, discover 3, merge 4, render 5, persist 6, anything else 1.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self.stage() {
            Some(Stage::Compile) => 2,
            Some(Stage::Discover) => 3,
            Some(Stage::Merge) => 4,
            Some(Stage::RenderSummary | Stage::RenderAnnotated) => 5,
            Some(Stage::Persist) => 6,
            None => 1,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use covpipe::ReportKind;

    #[test]
    fn test_config_error() {
        let err = CliError::config("bad config");
        assert!(err.to_string().contains("Configuration"));
        assert!(err.to_string().contains("bad config"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_invalid_argument_error() {
        let err = CliError::invalid_argument("bad arg");
        assert!(err.to_string().contains("Invalid argument"));
    }

    #[test]
    fn test_pipeline_error_names_stage() {
        let err = CliError::from(CovError::merge("no snapshot files"));
        assert_eq!(
            err.to_string(),
            "stage 'merge' failed: Merge failure: no snapshot files"
        );
    }

    #[test]
    fn test_exit_codes_per_stage() {
        let code = |e: CovError| CliError::from(e).exit_code();
        assert_eq!(code(CovError::build("x")), 2);
        assert_eq!(code(CovError::discovery("x")), 3);
        assert_eq!(code(CovError::merge("x")), 4);
        assert_eq!(code(CovError::render(ReportKind::Summary, "x")), 5);
        assert_eq!(code(CovError::render(ReportKind::Annotated, "x")), 5);
        assert_eq!(code(CovError::persist("x")), 6);
        assert_eq!(code(CovError::config("x")), 1);
    }

    #[test]
    fn test_io_error() {
        let err: CliError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(err.to_string().contains("I/O error"));
        assert_eq!(err.exit_code(), 1);
    }
}
