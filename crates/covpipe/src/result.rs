//! Result and error types for Covpipe.

use std::fmt;
use thiserror::Error;

/// Result type for Covpipe operations
pub type CovResult<T> = Result<T, CovError>;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Instrumented compilation (external build driver)
    Compile,
    /// Test binary discovery from the build-event stream
    Discover,
    /// Snapshot merging into the merged index
    Merge,
    /// Summary rendering
    RenderSummary,
    /// Annotated report rendering
    RenderAnnotated,
    /// Relocation of the annotated report to its destination
    Persist,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Self; 6] = [
        Self::Compile,
        Self::Discover,
        Self::Merge,
        Self::RenderSummary,
        Self::RenderAnnotated,
        Self::Persist,
    ];

    /// Short stage name used in logs and error output
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Discover => "discover",
            Self::Merge => "merge",
            Self::RenderSummary => "render-summary",
            Self::RenderAnnotated => "render-annotated",
            Self::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which report a render failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// Summary report
    Summary,
    /// Annotated report
    Annotated,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Summary => f.write_str("summary"),
            Self::Annotated => f.write_str("annotated"),
        }
    }
}

/// Errors that can occur in Covpipe
///
/// Every variant except `Config` and `Io` belongs to exactly one pipeline
/// stage. All of them are fatal to a run.
#[derive(Debug, Error)]
pub enum CovError {
    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Instrumented compilation failed
    #[error("Build failure: {message}")]
    BuildFailure {
        /// Error message
        message: String,
    },

    /// Object list empty, or objects seen downstream disagree with discovery
    #[error("Discovery mismatch: {message}")]
    DiscoveryMismatch {
        /// Error message
        message: String,
    },

    /// No matching snapshots, corrupt snapshot or corrupt index
    #[error("Merge failure: {message}")]
    MergeFailure {
        /// Error message
        message: String,
    },

    /// Summary or annotated rendering failed
    #[error("Render failure ({report}): {message}")]
    RenderFailure {
        /// Report being rendered
        report: ReportKind,
        /// Error message
        message: String,
    },

    /// Final relocation of the annotated report failed
    #[error("Persist failure: {message}")]
    PersistFailure {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CovError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a build failure
    #[must_use]
    pub fn build(message: impl Into<String>) -> Self {
        Self::BuildFailure {
            message: message.into(),
        }
    }

    /// Create a discovery mismatch
    #[must_use]
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::DiscoveryMismatch {
            message: message.into(),
        }
    }

    /// Create a merge failure
    #[must_use]
    pub fn merge(message: impl Into<String>) -> Self {
        Self::MergeFailure {
            message: message.into(),
        }
    }

    /// Create a render failure for the given report
    #[must_use]
    pub fn render(report: ReportKind, message: impl Into<String>) -> Self {
        Self::RenderFailure {
            report,
            message: message.into(),
        }
    }

    /// Create a persist failure
    #[must_use]
    pub fn persist(message: impl Into<String>) -> Self {
        Self::PersistFailure {
            message: message.into(),
        }
    }

    /// The pipeline stage this error belongs to, if any
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::BuildFailure { .. } => Some(Stage::Compile),
            Self::DiscoveryMismatch { .. } => Some(Stage::Discover),
            Self::MergeFailure { .. } => Some(Stage::Merge),
            Self::RenderFailure {
                report: ReportKind::Summary,
                ..
            } => Some(Stage::RenderSummary),
            Self::RenderFailure {
                report: ReportKind::Annotated,
                ..
            } => Some(Stage::RenderAnnotated),
            Self::PersistFailure { .. } => Some(Stage::Persist),
            Self::Config { .. } | Self::Io(_) => None,
        }
    }

    /// Re-home a stage-less error (I/O, config) into the given stage
    ///
    /// Errors that already carry a stage are returned unchanged.
    #[must_use]
    pub fn in_stage(self, stage: Stage) -> Self {
        if self.stage().is_some() {
            return self;
        }
        let message = self.to_string();
        match stage {
            Stage::Compile => Self::build(message),
            Stage::Discover => Self::discovery(message),
            Stage::Merge => Self::merge(message),
            Stage::RenderSummary => Self::render(ReportKind::Summary, message),
            Stage::RenderAnnotated => Self::render(ReportKind::Annotated, message),
            Stage::Persist => Self::persist(message),
        }
    }
}
