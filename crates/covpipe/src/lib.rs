//! Covpipe: Coverage Aggregation Pipeline for Rust Test Suites
//!
//! Covpipe compiles a workspace's tests with counter instrumentation, learns
//! which test binaries exist from the build-event stream, merges the raw
//! snapshots those binaries write into one sparse index, and renders it twice:
//! as a Summary (text or JSON) and as an annotated HTML listing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ compile  │──►│ discover │──►│  merge   │──►│  render  │──►│ persist  │
//! │ (cargo)  │   │ (events) │   │ (index)  │   │ sum+html │   │ (move)   │
//! └──────────┘   └──────────┘   └──────────┘   └──────────┘   └──────────┘
//!                     │ Arc<ArtifactSet>  ▲            ▲
//!                     └───────────────────┴────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use covpipe::{Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::default().with_output_destination("target/coverage/html");
//! let outcome = Pipeline::new(config).run()?;
//! println!("{}", outcome.summary.to_text(false));
//! # Ok::<(), covpipe::CovError>(())
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

#[allow(clippy::missing_errors_doc)]
pub mod artifact;
#[allow(clippy::missing_errors_doc)]
pub mod build;
#[allow(clippy::missing_errors_doc)]
pub mod config;
#[allow(clippy::missing_errors_doc)]
pub mod demangle;
#[allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]
pub mod merge;
#[allow(clippy::missing_errors_doc)]
pub mod pipeline;
#[allow(
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::format_push_string
)]
pub mod render;
mod result;
#[allow(clippy::missing_errors_doc)]
pub mod snapshot;

pub use artifact::{discover, discover_from_stream, ArtifactKind, ArtifactSet, BuildEvent};
pub use build::{BuildDriver, CargoBuild, RecordedBuild};
pub use config::PipelineConfig;
pub use demangle::{Demangler, ExternalDemangler, RustDemangler};
pub use merge::{MergedIndex, ProfileMerger};
pub use pipeline::{Pipeline, PipelineObserver, PipelineOutcome};
pub use render::{reconcile, AnnotatedReport, PathFilter, RenderContext, SummaryReport};
pub use result::{CovError, CovResult, ReportKind, Stage};
pub use snapshot::{JsonSnapshotReader, RawSnapshot, SnapshotPattern, SnapshotReader};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::artifact::*;
    pub use super::build::*;
    pub use super::config::*;
    pub use super::demangle::{Demangler, ExternalDemangler, RustDemangler};
    pub use super::merge::*;
    pub use super::pipeline::*;
    pub use super::render::*;
    pub use super::result::*;
    pub use super::snapshot::*;
}
