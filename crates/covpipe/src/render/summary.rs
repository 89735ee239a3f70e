//! Per-file and per-object summary report

use super::model::{CoverageModel, CoverageTotals, Counts};
use super::RenderContext;
use crate::result::{CovError, CovResult, ReportKind};
use console::style;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Counts for one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    /// Source path
    pub path: PathBuf,
    /// Counts for this file
    pub totals: CoverageTotals,
}

/// Counts restricted to the records one test binary reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Test binary
    pub path: PathBuf,
    /// Counts for this binary
    pub totals: CoverageTotals,
}

/// Textual coverage summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Exclusion expression the report was rendered with
    pub exclusion_regex: String,
    /// One row per discovered test binary
    pub objects: Vec<ObjectSummary>,
    /// One row per non-excluded source file
    pub files: Vec<FileSummary>,
    /// Aggregate counts
    pub totals: CoverageTotals,
}

impl SummaryReport {
    /// Render the summary for a context
    pub fn render(ctx: &RenderContext<'_>) -> CovResult<Self> {
        let model = CoverageModel::build(ctx, None, false)?;
        let files: Vec<FileSummary> = model
            .files
            .iter()
            .map(|f| FileSummary {
                path: f.path.clone(),
                totals: f.totals,
            })
            .collect();

        let mut objects = Vec::with_capacity(ctx.artifacts.len());
        for object in ctx.artifacts {
            let scoped = CoverageModel::build(ctx, Some(object.as_path()), false)?;
            objects.push(ObjectSummary {
                path: object.clone(),
                totals: scoped.totals(),
            });
        }

        tracing::debug!(files = files.len(), objects = objects.len(), "rendered summary");
        Ok(Self {
            exclusion_regex: ctx.filter.as_str().to_string(),
            objects,
            totals: model.totals(),
            files,
        })
    }

    /// Whether no source file survived filtering
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Render as an aligned text table
    #[must_use]
    pub fn to_text(&self, use_color: bool) -> String {
        let prefix = common_dir(self.files.iter().map(|f| f.path.as_path()));
        let rows: Vec<(String, CoverageTotals)> = self
            .files
            .iter()
            .map(|f| (display_path(&f.path, prefix.as_deref()), f.totals))
            .collect();
        let width = rows
            .iter()
            .map(|(name, _)| name.len())
            .chain(std::iter::once("Filename".len()))
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<width$}  {:>15}  {:>15}  {:>15}",
            "Filename", "Regions", "Functions", "Lines"
        );
        let rule = "-".repeat(width + 51);
        let _ = writeln!(out, "{rule}");
        for (name, totals) in &rows {
            write_row(&mut out, name, totals, width, use_color);
        }
        let _ = writeln!(out, "{rule}");
        write_row(&mut out, "TOTAL", &self.totals, width, use_color);

        if !self.objects.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Test binaries:");
            for object in &self.objects {
                let _ = writeln!(
                    out,
                    "  {}  lines {}",
                    object.path.display(),
                    percent_cell(object.totals.lines, use_color)
                );
            }
        }
        out
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> CovResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CovError::render(ReportKind::Summary, format!("JSON encoding: {e}")))
    }

    /// Write the JSON form to `path`
    pub fn write_json(&self, path: &Path) -> CovResult<()> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CovError::render(ReportKind::Summary, format!("creating {}: {e}", parent.display()))
            })?;
        }
        std::fs::write(path, json).map_err(|e| {
            CovError::render(ReportKind::Summary, format!("writing {}: {e}", path.display()))
        })
    }
}

fn write_row(out: &mut String, name: &str, totals: &CoverageTotals, width: usize, use_color: bool) {
    let _ = writeln!(
        out,
        "{name:<width$}  {}  {}  {}",
        cell(totals.regions, use_color),
        cell(totals.functions, use_color),
        cell(totals.lines, use_color),
    );
}

fn cell(counts: Counts, use_color: bool) -> String {
    let fraction = format!("{}/{}", counts.covered, counts.total);
    format!("{fraction:>7} {}", percent_cell(counts, use_color))
}

fn percent_cell(counts: Counts, use_color: bool) -> String {
    let Some(percent) = counts.percent() else {
        return format!("{:>7}", "-");
    };
    let text = format!("{percent:>6.2}%");
    let styled = style(text).force_styling(use_color);
    let styled = if percent >= 80.0 {
        styled.green()
    } else if percent >= 50.0 {
        styled.yellow()
    } else {
        styled.red()
    };
    styled.to_string()
}

fn common_dir<'a>(mut paths: impl Iterator<Item = &'a Path>) -> Option<PathBuf> {
    let mut prefix = paths.next()?.parent()?.to_path_buf();
    for path in paths {
        while !path.starts_with(&prefix) {
            if !prefix.pop() {
                return None;
            }
        }
    }
    if prefix.as_os_str().is_empty() {
        None
    } else {
        Some(prefix)
    }
}

fn display_path(path: &Path, prefix: Option<&Path>) -> String {
    prefix
        .and_then(|p| path.strip_prefix(p).ok())
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactSet;
    use crate::demangle::RustDemangler;
    use crate::merge::MergedIndex;
    use crate::render::PathFilter;
    use crate::snapshot::{FunctionCounters, RawSnapshot, RegionCounter, RegionSpan};

    fn func(name: &str, file: &str, count: u64) -> FunctionCounters {
        FunctionCounters {
            name: name.to_string(),
            hash: 7,
            file: PathBuf::from(file),
            regions: vec![RegionCounter::new(RegionSpan::new(1, 1, 4, 2), count)],
        }
    }

    fn report() -> SummaryReport {
        let index = MergedIndex::from_snapshots(&[
            RawSnapshot::new("/t/deps/alpha-1")
                .with_function(func("a", "/w/crate/src/a.rs", 3))
                .with_function(func("b", "/w/crate/src/nested/b.rs", 0)),
            RawSnapshot::new("/t/deps/beta-2").with_function(func("a", "/w/crate/src/a.rs", 1)),
        ])
        .unwrap();
        let artifacts =
            ArtifactSet::new([PathBuf::from("/t/deps/alpha-1"), PathBuf::from("/t/deps/beta-2")]);
        let filter = PathFilter::new("^$").unwrap();
        SummaryReport::render(&RenderContext::new(&index, &artifacts, &filter, &RustDemangler))
            .unwrap()
    }

    mod render_tests {
        use super::*;

        #[test]
        fn test_totals_sum_files() {
            let report = report();
            assert_eq!(report.files.len(), 2);
            let sum: CoverageTotals = report.files.iter().map(|f| f.totals).sum();
            assert_eq!(report.totals, sum);
            assert_eq!(report.totals.lines, Counts::new(4, 8));
            assert_eq!(report.totals.functions, Counts::new(1, 2));
        }

        #[test]
        fn test_object_rows_are_scoped() {
            let report = report();
            assert_eq!(report.objects.len(), 2);
            assert_eq!(report.objects[0].totals.functions, Counts::new(1, 2));
            assert_eq!(report.objects[1].totals.functions, Counts::new(1, 1));
        }

        #[test]
        fn test_function_names_stay_raw() {
            let index = MergedIndex::from_snapshots(&[RawSnapshot::new("/t/deps/alpha-1")
                .with_function(func("_ZN4demo1a17h0123456789abcdefE", "/w/a.rs", 1))])
            .unwrap();
            let artifacts = ArtifactSet::new([PathBuf::from("/t/deps/alpha-1")]);
            let filter = PathFilter::new("^$").unwrap();
            let ctx = RenderContext::new(&index, &artifacts, &filter, &RustDemangler);
            let model = CoverageModel::build(&ctx, None, false).unwrap();
            assert_eq!(model.files[0].functions[0].name, "_ZN4demo1a17h0123456789abcdefE");
        }
    }

    mod text_tests {
        use super::*;

        #[test]
        fn test_plain_table() {
            let text = report().to_text(false);
            assert!(text.starts_with("Filename"));
            assert!(text.contains("a.rs"));
            assert!(text.contains("nested/b.rs"));
            assert!(!text.contains("/w/crate/src/a.rs"));
            assert!(text.contains("TOTAL"));
            assert!(text.contains("50.00%"));
            assert!(!text.contains('\u{1b}'));
        }

        #[test]
        fn test_colored_table() {
            let text = report().to_text(true);
            assert!(text.contains('\u{1b}'));
        }

        #[test]
        fn test_no_data_is_dash() {
            assert_eq!(percent_cell(Counts::default(), false).trim(), "-");
        }

        #[test]
        fn test_common_dir() {
            let paths = [Path::new("/w/src/a.rs"), Path::new("/w/src/x/b.rs")];
            assert_eq!(common_dir(paths.into_iter()), Some(PathBuf::from("/w/src")));
            let relative = [Path::new("a.rs")];
            assert_eq!(common_dir(relative.into_iter()), None);
        }
    }

    #[test]
    fn test_json_contains_totals() {
        let json = report().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["totals"]["lines"]["covered"], 4);
        assert_eq!(value["objects"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_write_json_creates_parent() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("work/summary.json");
        report().write_json(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("\"totals\""));

        let err = report().write_json(temp.path()).unwrap_err();
        assert!(matches!(
            err,
            CovError::RenderFailure { report: ReportKind::Summary, .. }
        ));
    }
}
