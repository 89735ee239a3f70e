//! Raw profile snapshots
//!
//! Each instrumented test process writes exactly one snapshot at exit, named
//! from the shared [`SnapshotPattern`]. Snapshots are immutable once written
//! and are read once by the merger.

use crate::result::{CovError, CovResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::path::{Path, PathBuf};

/// Placeholder in a snapshot name pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    /// `%p`: process id
    Pid,
    /// `%m`: module signature
    Module,
    /// `%h`: host name
    Host,
}

impl Placeholder {
    const fn regex(self) -> &'static str {
        match self {
            Self::Pid => "[0-9]+",
            Self::Module => "[0-9A-Za-z_]+",
            Self::Host => r"[^/\\]+",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Placeholder(Placeholder),
}

/// Parsed snapshot naming pattern
///
/// Placeholders are only allowed in the file name: `%p` (required), `%m`,
/// `%h` and `%%` for a literal percent sign.
#[derive(Debug, Clone)]
pub struct SnapshotPattern {
    raw: String,
    directory: PathBuf,
    tokens: Vec<Token>,
    matcher: Regex,
}

impl SnapshotPattern {
    /// Parse a pattern such as `target/coverage/raw/cov-%p-%m.json`
    pub fn parse(pattern: &str) -> CovResult<Self> {
        let path = Path::new(pattern);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CovError::config(format!("snapshot pattern `{pattern}` has no file name")))?;
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if directory.to_string_lossy().contains('%') {
            return Err(CovError::config(format!(
                "snapshot pattern `{pattern}`: placeholders are only supported in the file name"
            )));
        }

        let tokens = tokenize(file_name)
            .map_err(|msg| CovError::config(format!("snapshot pattern `{pattern}`: {msg}")))?;
        if !tokens.contains(&Token::Placeholder(Placeholder::Pid)) {
            return Err(CovError::config(format!(
                "snapshot pattern `{pattern}` must contain the process placeholder %p"
            )));
        }

        let mut expr = String::from("^");
        for token in &tokens {
            match token {
                Token::Literal(text) => expr.push_str(&regex::escape(text)),
                Token::Placeholder(p) => expr.push_str(p.regex()),
            }
        }
        expr.push('$');
        let matcher = Regex::new(&expr).map_err(|e| CovError::config(e.to_string()))?;

        Ok(Self {
            raw: pattern.to_string(),
            directory,
            tokens,
            matcher,
        })
    }

    /// The pattern as configured
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Directory snapshots are written to
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Literal file-name text shared by every snapshot of the run
    #[must_use]
    pub fn run_prefix(&self) -> String {
        let mut prefix = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => prefix.push_str(text),
                Token::Placeholder(_) => break,
            }
        }
        prefix
    }

    /// Whether a file name belongs to this run
    #[must_use]
    pub fn matches(&self, file_name: &str) -> bool {
        self.matcher.is_match(file_name)
    }

    /// Concrete snapshot path for one process
    #[must_use]
    pub fn expand(&self, pid: u32, module: &str, host: &str) -> PathBuf {
        let mut name = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => name.push_str(text),
                Token::Placeholder(Placeholder::Pid) => name.push_str(&pid.to_string()),
                Token::Placeholder(Placeholder::Module) => name.push_str(module),
                Token::Placeholder(Placeholder::Host) => name.push_str(host),
            }
        }
        self.directory.join(name)
    }

    /// Pattern resolved against `base` when relative
    ///
    /// Test processes run from their own package directories, so the value
    /// handed to them must be absolute.
    #[must_use]
    pub fn absolute(&self, base: &Path) -> String {
        let path = Path::new(&self.raw);
        if path.is_absolute() {
            self.raw.clone()
        } else {
            base.join(path).to_string_lossy().into_owned()
        }
    }

    /// Every snapshot of the run, sorted by path
    ///
    /// A missing directory means no test wrote a snapshot.
    pub fn find(&self) -> CovResult<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CovError::merge(format!(
                    "cannot list snapshot directory {}: {e}",
                    self.directory.display()
                )))
            }
        };

        let mut found: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| self.matches(n))
            })
            .collect();
        found.sort();
        Ok(found)
    }

    /// Delete every snapshot left by an earlier run
    ///
    /// Call before the tests execute; `find` cannot tell old dumps from new
    /// ones when the same binaries run again.
    pub fn clear(&self) -> CovResult<usize> {
        let stale = self.find()?;
        for path in &stale {
            std::fs::remove_file(path)?;
            tracing::debug!(snapshot = %path.display(), "removed stale snapshot");
        }
        Ok(stale.len())
    }
}

fn tokenize(file_name: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = file_name.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        let placeholder = match chars.next() {
            Some('%') => {
                literal.push('%');
                continue;
            }
            Some('p') => Placeholder::Pid,
            Some('m') => Placeholder::Module,
            Some('h') => Placeholder::Host,
            Some(other) => return Err(format!("unknown placeholder %{other}")),
            None => return Err("dangling % at end of pattern".to_string()),
        };
        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut literal)));
        }
        tokens.push(Token::Placeholder(placeholder));
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

/// Highest line number a region may reference
pub const MAX_SOURCE_LINE: u32 = 1_000_000;

/// Source span of an instrumented region (1-based, inclusive lines)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionSpan {
    /// First line
    pub line_start: u32,
    /// First column
    pub col_start: u32,
    /// Last line
    pub line_end: u32,
    /// Last column
    pub col_end: u32,
}

impl RegionSpan {
    /// Create a span
    #[must_use]
    pub const fn new(line_start: u32, col_start: u32, line_end: u32, col_end: u32) -> Self {
        Self {
            line_start,
            col_start,
            line_end,
            col_end,
        }
    }

    /// Whether the span covers `line`
    #[must_use]
    pub const fn contains_line(&self, line: u32) -> bool {
        self.line_start <= line && line <= self.line_end
    }

    /// Lines covered by the span
    pub fn lines(&self) -> std::ops::RangeInclusive<u32> {
        self.line_start..=self.line_end
    }

    /// Ordering key where smaller means more deeply nested
    #[must_use]
    pub fn nesting_key(&self) -> (u32, Reverse<(u32, u32)>) {
        (
            self.line_end - self.line_start,
            Reverse((self.line_start, self.col_start)),
        )
    }

    const fn is_well_formed(&self) -> bool {
        self.line_start >= 1
            && self.line_end <= MAX_SOURCE_LINE
            && (self.line_start < self.line_end
                || (self.line_start == self.line_end && self.col_start <= self.col_end))
    }
}

impl std::fmt::Display for RegionSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.line_start, self.col_start, self.line_end, self.col_end
        )
    }
}

/// Execution count of one region in one process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCounter {
    /// First line
    pub line_start: u32,
    /// First column
    pub col_start: u32,
    /// Last line
    pub line_end: u32,
    /// Last column
    pub col_end: u32,
    /// Times the region executed
    pub count: u64,
}

impl RegionCounter {
    /// Create a counter for `span`
    #[must_use]
    pub const fn new(span: RegionSpan, count: u64) -> Self {
        Self {
            line_start: span.line_start,
            col_start: span.col_start,
            line_end: span.line_end,
            col_end: span.col_end,
            count,
        }
    }

    /// Span of the region
    #[must_use]
    pub const fn span(&self) -> RegionSpan {
        RegionSpan::new(self.line_start, self.col_start, self.line_end, self.col_end)
    }
}

/// Counters of one function instantiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCounters {
    /// Raw (mangled) linker symbol
    pub name: String,
    /// Structural hash of the function body
    pub hash: u64,
    /// Source file the function lives in
    pub file: PathBuf,
    /// Regions; the first one is the function entry
    pub regions: Vec<RegionCounter>,
}

/// Counter dump of one test process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSnapshot {
    /// Test binary that produced the dump
    pub object: PathBuf,
    /// Process id, when recorded
    #[serde(default)]
    pub pid: Option<u32>,
    /// Per-function counters
    #[serde(default)]
    pub functions: Vec<FunctionCounters>,
}

impl RawSnapshot {
    /// Create an empty snapshot for `object`
    #[must_use]
    pub fn new(object: impl Into<PathBuf>) -> Self {
        Self {
            object: object.into(),
            pid: None,
            functions: Vec::new(),
        }
    }

    /// Set the process id
    #[must_use]
    pub const fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Add a function's counters
    #[must_use]
    pub fn with_function(mut self, function: FunctionCounters) -> Self {
        self.functions.push(function);
        self
    }

    /// Write the snapshot as JSON
    pub fn write_to(&self, path: &Path) -> CovResult<()> {
        let json = serde_json::to_vec(self).map_err(|e| CovError::merge(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check structural sanity of the dump
    pub fn validate(&self) -> CovResult<()> {
        for function in &self.functions {
            if function.regions.is_empty() {
                return Err(CovError::merge(format!(
                    "function `{}` has no regions",
                    function.name
                )));
            }
            if let Some(bad) = function.regions.iter().find(|r| !r.span().is_well_formed()) {
                return Err(CovError::merge(format!(
                    "function `{}` has malformed region {}",
                    function.name,
                    bad.span()
                )));
            }
        }
        Ok(())
    }
}

/// Decodes snapshot files
pub trait SnapshotReader {
    /// Read one snapshot
    ///
    /// Unreadable or undecodable files are merge failures.
    fn read(&self, path: &Path) -> CovResult<RawSnapshot>;
}

/// Reader for JSON counter dumps
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSnapshotReader;

impl SnapshotReader for JsonSnapshotReader {
    fn read(&self, path: &Path) -> CovResult<RawSnapshot> {
        let bytes = std::fs::read(path).map_err(|e| {
            CovError::merge(format!("cannot read snapshot {}: {e}", path.display()))
        })?;
        let snapshot: RawSnapshot = serde_json::from_slice(&bytes).map_err(|e| {
            CovError::merge(format!("corrupt snapshot {}: {e}", path.display()))
        })?;
        snapshot.validate().map_err(|e| {
            CovError::merge(format!("corrupt snapshot {}: {e}", path.display()))
        })?;
        Ok(snapshot)
    }
}
