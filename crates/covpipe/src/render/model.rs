//! Coverage model shared by both reports
//!
//! The Summary and the Annotated report are both derived from
//! [`CoverageModel::build`], so they see the same files, the same filter and
//! the same counts.

use super::RenderContext;
use crate::merge::{MergedFunction, RecordKey};
use crate::result::CovResult;
use crate::snapshot::RegionSpan;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::{Add, AddAssign};
use std::path::{Path, PathBuf};

/// Covered/total pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    /// Items with a non-zero count
    pub covered: u64,
    /// All instrumented items
    pub total: u64,
}

impl Counts {
    /// Create a pair
    #[must_use]
    pub const fn new(covered: u64, total: u64) -> Self {
        Self { covered, total }
    }

    /// Items never executed
    #[must_use]
    pub const fn missed(&self) -> u64 {
        self.total - self.covered
    }

    /// Coverage percentage, `None` when nothing is instrumented
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.covered as f64 * 100.0 / self.total as f64)
        }
    }

    fn tally<I: IntoIterator<Item = bool>>(items: I) -> Self {
        items.into_iter().fold(Self::default(), |acc, covered| Self {
            covered: acc.covered + u64::from(covered),
            total: acc.total + 1,
        })
    }
}

impl Add for Counts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            covered: self.covered + rhs.covered,
            total: self.total + rhs.total,
        }
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Line, region and function counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageTotals {
    /// Instrumented lines
    pub lines: Counts,
    /// Distinct regions
    pub regions: Counts,
    /// Distinct source functions
    pub functions: Counts,
}

impl Add for CoverageTotals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            lines: self.lines + rhs.lines,
            regions: self.regions + rhs.regions,
            functions: self.functions + rhs.functions,
        }
    }
}

impl AddAssign for CoverageTotals {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for CoverageTotals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Hits of one source line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCoverage {
    /// 1-based line number
    pub line: u32,
    /// Summed hits over all instantiations
    pub hits: u64,
    /// Whether the line executed at least once
    pub covered: bool,
}

/// Hits of one region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCoverage {
    /// Source span
    pub span: RegionSpan,
    /// Summed hits over all instantiations
    pub hits: u64,
    /// Instantiations carrying this region
    pub instantiations: usize,
    /// Instantiations that executed it
    pub executed_instantiations: usize,
}

/// One source function with all of its instantiations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCoverage {
    /// Display name (demangled when a demangler ran)
    pub name: String,
    /// Raw symbols of every instantiation
    pub symbols: Vec<String>,
    /// Entry region
    pub entry: RegionSpan,
    /// Summed entry count
    pub hits: u64,
    /// Number of instantiations
    pub instantiations: usize,
    /// Instantiations entered at least once
    pub executed_instantiations: usize,
}

/// Everything known about one source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCoverage {
    /// Source path
    pub path: PathBuf,
    /// Instrumented lines, ascending
    pub lines: Vec<LineCoverage>,
    /// Regions, ordered by span
    pub regions: Vec<RegionCoverage>,
    /// Functions, ordered by entry span
    pub functions: Vec<FunctionCoverage>,
    /// Counts for this file
    pub totals: CoverageTotals,
}

/// Coverage of every non-excluded file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageModel {
    /// Files, ordered by path
    pub files: Vec<FileCoverage>,
}

#[derive(Default)]
struct FunctionAcc {
    symbols: Vec<String>,
    hits: u64,
    instantiations: usize,
    executed: usize,
}

#[derive(Default)]
struct FileAcc<'a> {
    records: Vec<(&'a RecordKey, &'a MergedFunction)>,
}

impl CoverageModel {
    /// Build the model
    ///
    /// `object` restricts it to records reported by one test binary.
    /// `demangle` runs the context's demangler over function names.
    pub fn build(ctx: &RenderContext<'_>, object: Option<&Path>, demangle: bool) -> CovResult<Self> {
        ctx.index.check_objects(ctx.artifacts)?;

        let mut by_file: BTreeMap<&Path, FileAcc<'_>> = BTreeMap::new();
        for (key, record) in ctx.index.records() {
            if ctx.filter.excludes(&record.file) {
                continue;
            }
            if object.is_some_and(|o| !record.objects.contains(o)) {
                continue;
            }
            by_file
                .entry(record.file.as_path())
                .or_default()
                .records
                .push((key, record));
        }

        let names: HashMap<String, String> = if demangle {
            let symbols: Vec<String> = by_file
                .values()
                .flat_map(|acc| acc.records.iter().map(|(key, _)| key.symbol.clone()))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let demangled = ctx.demangler.demangle(&symbols)?;
            symbols.into_iter().zip(demangled).collect()
        } else {
            HashMap::new()
        };

        let files = by_file
            .into_iter()
            .map(|(path, acc)| build_file(path, &acc.records, &names))
            .collect();
        Ok(Self { files })
    }

    /// Sum of every file's counts
    #[must_use]
    pub fn totals(&self) -> CoverageTotals {
        self.files.iter().map(|f| f.totals).sum()
    }

    /// Look up a file
    #[must_use]
    pub fn file(&self, path: &Path) -> Option<&FileCoverage> {
        self.files.iter().find(|f| f.path == path)
    }
}

fn build_file(
    path: &Path,
    records: &[(&RecordKey, &MergedFunction)],
    names: &HashMap<String, String>,
) -> FileCoverage {
    let mut lines: BTreeMap<u32, u64> = BTreeMap::new();
    let mut regions: BTreeMap<RegionSpan, RegionCoverage> = BTreeMap::new();
    let mut functions: BTreeMap<RegionSpan, FunctionAcc> = BTreeMap::new();

    for (key, record) in records {
        for (line, hits) in instantiation_lines(record) {
            let slot = lines.entry(line).or_insert(0);
            *slot = slot.saturating_add(hits);
        }

        for (span, hits) in record.region_counts() {
            let region = regions.entry(span).or_insert(RegionCoverage {
                span,
                hits: 0,
                instantiations: 0,
                executed_instantiations: 0,
            });
            region.hits = region.hits.saturating_add(hits);
            region.instantiations += 1;
            region.executed_instantiations += usize::from(hits > 0);
        }

        if let Some(entry) = record.entry_span() {
            let acc = functions.entry(entry).or_default();
            acc.symbols.push(key.symbol.clone());
            acc.hits = acc.hits.saturating_add(record.entry_count());
            acc.instantiations += 1;
            acc.executed += usize::from(record.entry_count() > 0);
        }
    }

    let lines: Vec<LineCoverage> = lines
        .into_iter()
        .map(|(line, hits)| LineCoverage {
            line,
            hits,
            covered: hits > 0,
        })
        .collect();
    let regions: Vec<RegionCoverage> = regions.into_values().collect();
    let functions: Vec<FunctionCoverage> = functions
        .into_iter()
        .map(|(entry, acc)| {
            let first = acc.symbols.first().cloned().unwrap_or_default();
            FunctionCoverage {
                name: names.get(&first).cloned().unwrap_or(first),
                symbols: acc.symbols,
                entry,
                hits: acc.hits,
                instantiations: acc.instantiations,
                executed_instantiations: acc.executed,
            }
        })
        .collect();

    let totals = CoverageTotals {
        lines: Counts::tally(lines.iter().map(|l| l.covered)),
        regions: Counts::tally(regions.iter().map(|r| r.hits > 0)),
        functions: Counts::tally(functions.iter().map(|f| f.hits > 0)),
    };

    FileCoverage {
        path: path.to_path_buf(),
        lines,
        regions,
        functions,
        totals,
    }
}

/// Line hits of a single instantiation
///
/// A line takes the highest count among regions starting on it; otherwise
/// the count of the innermost region enclosing it.
fn instantiation_lines(record: &MergedFunction) -> BTreeMap<u32, u64> {
    let counted: Vec<(RegionSpan, u64)> = record.region_counts().collect();

    let mut starts: BTreeMap<u32, u64> = BTreeMap::new();
    for (span, hits) in &counted {
        let slot = starts.entry(span.line_start).or_insert(0);
        *slot = (*slot).max(*hits);
    }

    let mut lines = BTreeMap::new();
    for (span, _) in &counted {
        for line in span.lines() {
            if lines.contains_key(&line) {
                continue;
            }
            let hits = starts.get(&line).copied().unwrap_or_else(|| {
                counted
                    .iter()
                    .filter(|(s, _)| s.contains_line(line))
                    .min_by_key(|(s, _)| s.nesting_key())
                    .map_or(0, |(_, hits)| *hits)
            });
            lines.insert(line, hits);
        }
    }
    lines
}
