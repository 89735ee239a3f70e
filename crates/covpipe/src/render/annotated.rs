//! Annotated HTML report
//!
//! Every non-excluded source file is listed line by line with its hit count,
//! followed by its functions and regions. Sources that cannot be read are
//! still reported, listing only their instrumented lines.

use super::model::{
    CoverageModel, CoverageTotals, Counts, FileCoverage, FunctionCoverage, LineCoverage,
    RegionCoverage,
};
use super::RenderContext;
use crate::result::{CovError, CovResult, ReportKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// One source line with its coverage, if instrumented
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedLine {
    /// 1-based line number
    pub number: u32,
    /// Source text (empty when the source was unavailable)
    pub text: String,
    /// Coverage of the line, `None` for non-instrumented lines
    pub coverage: Option<LineCoverage>,
}

/// One annotated source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedFile {
    /// Source path
    pub path: PathBuf,
    /// Whether the source text could be read
    pub source_available: bool,
    /// Annotated lines
    pub lines: Vec<AnnotatedLine>,
    /// Regions with hit and instantiation counts
    pub regions: Vec<RegionCoverage>,
    /// Functions with demangled names
    pub functions: Vec<FunctionCoverage>,
    /// Counts for this file
    pub totals: CoverageTotals,
}

/// Annotated coverage report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedReport {
    /// Files, ordered by path
    pub files: Vec<AnnotatedFile>,
    /// Aggregate counts
    pub totals: CoverageTotals,
}

impl AnnotatedReport {
    /// Render the annotated report for a context
    ///
    /// Function names go through the context's demangler.
    pub fn render(ctx: &RenderContext<'_>) -> CovResult<Self> {
        let model = CoverageModel::build(ctx, None, true)?;
        let totals = model.totals();
        let files: Vec<AnnotatedFile> = model.files.into_iter().map(annotate).collect();
        tracing::debug!(files = files.len(), "rendered annotated report");
        Ok(Self { files, totals })
    }

    /// Look up a file
    #[must_use]
    pub fn file(&self, path: &Path) -> Option<&AnnotatedFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Render as a standalone HTML document
    #[must_use]
    pub fn to_html(&self, title: &str) -> String {
        let mut html = String::new();
        let title = escape_html(title);

        html.push_str(&format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 20px; }}
        .summary {{ background: #f5f5f5; padding: 20px; border-radius: 8px; margin-bottom: 20px; }}
        table {{ border-collapse: collapse; margin-bottom: 16px; }}
        th, td {{ padding: 2px 8px; text-align: left; }}
        .source {{ font-family: monospace; white-space: pre; }}
        .source td.count {{ text-align: right; color: #666; }}
        tr[data-covered="true"], .source tr.hit {{ background: #e8f5e9; }}
        tr[data-covered="false"], .source tr.miss {{ background: #ffebee; }}
        .file {{ margin-top: 32px; }}
    </style>
</head>
<body>
<div class="summary">
    <h1>{title}</h1>
    <p>Generated {}</p>
    <table>
        <tr><th></th><th>Covered</th><th>Total</th><th>Percent</th></tr>
{}{}{}    </table>
</div>
"#,
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            totals_row("Lines", self.totals.lines),
            totals_row("Regions", self.totals.regions),
            totals_row("Functions", self.totals.functions),
        ));

        // File index
        html.push_str("<h2>Files</h2>\n<table>\n");
        html.push_str("<tr><th>File</th><th>Lines</th><th>Regions</th><th>Functions</th></tr>\n");
        for (i, file) in self.files.iter().enumerate() {
            let _ = writeln!(
                html,
                r##"<tr><td><a href="#file-{i}">{}</a></td><td>{}</td><td>{}</td><td>{}</td></tr>"##,
                escape_html(&file.path.display().to_string()),
                percent(file.totals.lines),
                percent(file.totals.regions),
                percent(file.totals.functions),
            );
        }
        html.push_str("</table>\n");

        for (i, file) in self.files.iter().enumerate() {
            write_file(&mut html, i, file);
        }

        html.push_str(
            r#"
<footer>
    <p>Generated by covpipe</p>
</footer>
</body>
</html>
"#,
        );
        html
    }

    /// Render to HTML and write it to `path`
    pub fn write_html(&self, path: &Path, title: &str) -> CovResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CovError::render(
                    ReportKind::Annotated,
                    format!("creating {}: {e}", parent.display()),
                )
            })?;
        }
        std::fs::write(path, self.to_html(title)).map_err(|e| {
            CovError::render(
                ReportKind::Annotated,
                format!("writing {}: {e}", path.display()),
            )
        })
    }
}

fn annotate(file: FileCoverage) -> AnnotatedFile {
    let by_line: BTreeMap<u32, LineCoverage> = file.lines.iter().map(|l| (l.line, *l)).collect();

    let (source_available, lines) = match std::fs::read_to_string(&file.path) {
        Ok(source) => {
            let mut lines: Vec<AnnotatedLine> = source
                .lines()
                .zip(1u32..)
                .map(|(text, number)| AnnotatedLine {
                    number,
                    text: text.to_string(),
                    coverage: by_line.get(&number).copied(),
                })
                .collect();
            let last = lines.last().map_or(0, |l| l.number);
            // Counters past the end of a file edited after the build.
            lines.extend(by_line.range(last + 1..).map(|(number, coverage)| AnnotatedLine {
                number: *number,
                text: String::new(),
                coverage: Some(*coverage),
            }));
            (true, lines)
        }
        Err(e) => {
            tracing::warn!(path = %file.path.display(), error = %e, "source unavailable, listing instrumented lines only");
            let lines = by_line
                .values()
                .map(|coverage| AnnotatedLine {
                    number: coverage.line,
                    text: String::new(),
                    coverage: Some(*coverage),
                })
                .collect();
            (false, lines)
        }
    };

    AnnotatedFile {
        path: file.path,
        source_available,
        lines,
        regions: file.regions,
        functions: file.functions,
        totals: file.totals,
    }
}

fn write_file(html: &mut String, index: usize, file: &AnnotatedFile) {
    let _ = writeln!(
        html,
        r#"<div class="file" id="file-{index}">
<h2>{}</h2>
<p>Lines {} &middot; Regions {} &middot; Functions {}</p>"#,
        escape_html(&file.path.display().to_string()),
        percent(file.totals.lines),
        percent(file.totals.regions),
        percent(file.totals.functions),
    );
    if !file.source_available {
        html.push_str("<p><em>Source unavailable; showing instrumented lines only.</em></p>\n");
    }

    if !file.functions.is_empty() {
        html.push_str("<table class=\"functions\">\n");
        html.push_str("<tr><th>Function</th><th>Entry</th><th>Hits</th><th>Instantiations</th></tr>\n");
        for function in &file.functions {
            let _ = writeln!(
                html,
                "<tr data-covered=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}/{}</td></tr>",
                function.hits > 0,
                escape_html(&function.name),
                function.entry,
                function.hits,
                function.executed_instantiations,
                function.instantiations,
            );
        }
        html.push_str("</table>\n");
    }

    if !file.regions.is_empty() {
        html.push_str("<table class=\"regions\">\n");
        html.push_str("<tr><th>Region</th><th>Hits</th><th>Instantiations</th></tr>\n");
        for region in &file.regions {
            let _ = writeln!(
                html,
                "<tr data-covered=\"{}\"><td>{}</td><td>{}</td><td>{}/{}</td></tr>",
                region.hits > 0,
                region.span,
                region.hits,
                region.executed_instantiations,
                region.instantiations,
            );
        }
        html.push_str("</table>\n");
    }

    html.push_str("<table class=\"source\">\n");
    for line in &file.lines {
        match line.coverage {
            Some(coverage) => {
                let _ = writeln!(
                    html,
                    "<tr class=\"{}\" data-line=\"{}\" data-covered=\"{}\"><td>{}</td><td class=\"count\">{}</td><td>{}</td></tr>",
                    if coverage.covered { "hit" } else { "miss" },
                    line.number,
                    coverage.covered,
                    line.number,
                    coverage.hits,
                    escape_html(&line.text),
                );
            }
            None => {
                let _ = writeln!(
                    html,
                    "<tr class=\"plain\" data-line=\"{}\"><td>{}</td><td class=\"count\"></td><td>{}</td></tr>",
                    line.number,
                    line.number,
                    escape_html(&line.text),
                );
            }
        }
    }
    html.push_str("</table>\n</div>\n");
}

fn totals_row(label: &str, counts: Counts) -> String {
    format!(
        "        <tr><td>{label}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
        counts.covered,
        counts.total,
        percent(counts)
    )
}

fn percent(counts: Counts) -> String {
    counts
        .percent()
        .map_or_else(|| "-".to_string(), |p| format!("{p:.2}%"))
}

/// Escape HTML special characters
#[must_use]
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
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
    use tempfile::TempDir;

    const OBJ: &str = "/t/deps/suite-1";

    fn report_for(file: &Path) -> AnnotatedReport {
        let snapshot = RawSnapshot::new(OBJ).with_function(FunctionCounters {
            name: "_ZN4demo5check17h0123456789abcdefE".to_string(),
            hash: 3,
            file: file.to_path_buf(),
            regions: vec![
                RegionCounter::new(RegionSpan::new(1, 1, 5, 2), 2),
                RegionCounter::new(RegionSpan::new(3, 9, 3, 30), 0),
            ],
        });
        let index = MergedIndex::from_snapshots([&snapshot]).unwrap();
        let artifacts = ArtifactSet::new([PathBuf::from(OBJ)]);
        let filter = PathFilter::new("^$").unwrap();
        AnnotatedReport::render(&RenderContext::new(&index, &artifacts, &filter, &RustDemangler))
            .unwrap()
    }

    mod render_tests {
        use super::*;

        #[test]
        fn test_reads_source_lines() {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("lib.rs");
            std::fs::write(
                &path,
                "fn check(x: u8) -> bool {\n    let y = x;\n    if y > 3 { return false; }\n    true\n}\n// trailing\n",
            )
            .unwrap();

            let report = report_for(&path);
            let file = report.file(&path).unwrap();
            assert!(file.source_available);
            assert_eq!(file.lines.len(), 6);
            assert_eq!(file.lines[0].text, "fn check(x: u8) -> bool {");
            assert!(file.lines[0].coverage.unwrap().covered);
            assert!(!file.lines[2].coverage.unwrap().covered);
            assert!(file.lines[5].coverage.is_none());
            assert_eq!(file.functions[0].name, "demo::check");
            assert_eq!(report.totals.lines, Counts::new(4, 5));
        }

        #[test]
        fn test_missing_source_lists_instrumented_lines() {
            let report = report_for(Path::new("/nonexistent/covpipe/src/lib.rs"));
            let file = &report.files[0];
            assert!(!file.source_available);
            assert_eq!(file.lines.len(), 5);
            assert!(file.lines.iter().all(|l| l.coverage.is_some() && l.text.is_empty()));
        }

        #[test]
        fn test_counters_past_end_of_source_are_kept() {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("short.rs");
            std::fs::write(&path, "fn check() {\n}\n").unwrap();
            let report = report_for(&path);
            let numbers: Vec<u32> = report.files[0].lines.iter().map(|l| l.number).collect();
            assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        }
    }

    mod html_tests {
        use super::*;

        #[test]
        fn test_html_marks_coverage() {
            let report = report_for(Path::new("/nonexistent/covpipe/src/lib.rs"));
            let html = report.to_html("Demo <Coverage>");
            assert!(html.starts_with("<!DOCTYPE html>"));
            assert!(html.contains("<title>Demo &lt;Coverage&gt;</title>"));
            assert!(html.contains("data-covered=\"true\""));
            assert!(html.contains("data-covered=\"false\""));
            assert!(html.contains("class=\"miss\""));
            assert!(html.contains("demo::check"));
            assert!(html.contains("/nonexistent/covpipe/src/lib.rs"));
            assert!(html.contains("Source unavailable"));
        }

        #[test]
        fn test_escape_html() {
            assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
        }

        #[test]
        fn test_write_html_creates_parent() {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("nested/out/index.html");
            report_for(Path::new("/nonexistent/a.rs"))
                .write_html(&path, "t")
                .unwrap();
            assert!(std::fs::read_to_string(&path).unwrap().contains("</html>"));
        }
    }
}
