//! Report rendering
//!
//! Both reports take the same [`RenderContext`]: one merged index, one
//! discovered object list, one exclusion filter. [`reconcile`] checks that
//! their totals agree.

mod annotated;
mod model;
mod summary;

pub use annotated::{escape_html, AnnotatedFile, AnnotatedLine, AnnotatedReport};
pub use model::{
    CoverageModel, CoverageTotals, Counts, FileCoverage, FunctionCoverage, LineCoverage,
    RegionCoverage,
};
pub use summary::{FileSummary, ObjectSummary, SummaryReport};

use crate::artifact::ArtifactSet;
use crate::demangle::Demangler;
use crate::merge::MergedIndex;
use crate::result::{CovError, CovResult, ReportKind};
use regex::Regex;
use std::path::Path;

/// Removes third-party and toolchain sources from both reports
#[derive(Debug, Clone)]
pub struct PathFilter {
    regex: Regex,
}

impl PathFilter {
    /// Compile a filter from a regular expression
    pub fn new(pattern: &str) -> CovResult<Self> {
        Regex::new(pattern)
            .map(Self::from_regex)
            .map_err(|e| CovError::config(format!("invalid path exclusion regex `{pattern}`: {e}")))
    }

    /// Wrap an already compiled regex
    #[must_use]
    pub const fn from_regex(regex: Regex) -> Self {
        Self { regex }
    }

    /// Whether `path` is excluded
    #[must_use]
    pub fn excludes(&self, path: &Path) -> bool {
        self.regex.is_match(&path.to_string_lossy())
    }

    /// The underlying expression
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Inputs shared by the Summary and Annotated renderers
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    /// Merged counters of the run
    pub index: &'a MergedIndex,
    /// Test binaries discovered for the run
    pub artifacts: &'a ArtifactSet,
    /// Exclusion filter
    pub filter: &'a PathFilter,
    /// Symbol demangler
    pub demangler: &'a dyn Demangler,
}

impl std::fmt::Debug for RenderContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("records", &self.index.len())
            .field("artifacts", &self.artifacts.len())
            .field("filter", &self.filter.as_str())
            .finish_non_exhaustive()
    }
}

impl<'a> RenderContext<'a> {
    /// Bundle the shared inputs
    #[must_use]
    pub fn new(
        index: &'a MergedIndex,
        artifacts: &'a ArtifactSet,
        filter: &'a PathFilter,
        demangler: &'a dyn Demangler,
    ) -> Self {
        Self {
            index,
            artifacts,
            filter,
            demangler,
        }
    }
}

/// Check that the Summary and the Annotated report describe the same coverage
///
/// The summary's totals must equal the sum of the annotated per-file totals,
/// file by file. Any divergence is a render failure.
pub fn reconcile(summary: &SummaryReport, annotated: &AnnotatedReport) -> CovResult<()> {
    let divergence = |message: String| CovError::render(ReportKind::Annotated, message);

    if summary.files.len() != annotated.files.len() {
        return Err(divergence(format!(
            "summary lists {} files, annotated report lists {}",
            summary.files.len(),
            annotated.files.len()
        )));
    }
    for (row, file) in summary.files.iter().zip(&annotated.files) {
        if row.path != file.path || row.totals != file.totals {
            return Err(divergence(format!(
                "totals for {} diverge between summary and annotated report",
                row.path.display()
            )));
        }
    }

    let annotated_totals: CoverageTotals = annotated.files.iter().map(|f| f.totals).sum();
    if annotated_totals != summary.totals {
        return Err(divergence(
            "aggregate totals diverge between summary and annotated report".to_string(),
        ));
    }
    Ok(())
}
