//! Artifact discovery from a build-event stream
//!
//! The stream is the newline-delimited JSON emitted by
//! `cargo test --no-run --message-format=json`. Only test-profile artifacts
//! are kept, and platform debug-symbol bundles are dropped.

use crate::result::{CovError, CovResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One record of the build-event stream
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum BuildEvent {
    /// A compiled artifact
    CompilerArtifact(ArtifactEvent),
    /// A compiler diagnostic
    CompilerMessage(MessageEvent),
    /// End of the build
    BuildFinished(FinishedEvent),
    /// Any record we do not act on (build scripts, etc.)
    #[serde(other)]
    Other,
}

/// `compiler-artifact` record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactEvent {
    /// Build profile the artifact was compiled with
    pub profile: ArtifactProfile,
    /// Every output file of the artifact
    #[serde(default)]
    pub filenames: Vec<PathBuf>,
    /// Runnable binary, when the artifact has one
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Target the artifact belongs to
    #[serde(default)]
    pub target: Option<ArtifactTarget>,
}

/// Profile of a compiled artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ArtifactProfile {
    /// Whether this is a test build
    #[serde(default)]
    pub test: bool,
}

/// Target metadata of a compiled artifact
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactTarget {
    /// Target name
    pub name: String,
}

/// `compiler-message` record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageEvent {
    /// The diagnostic
    pub message: Diagnostic,
}

/// Compiler diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Diagnostic {
    /// `error`, `warning`, `note`, ...
    pub level: String,
    /// Pre-rendered human text
    #[serde(default)]
    pub rendered: Option<String>,
    /// Short message
    #[serde(default)]
    pub message: Option<String>,
}

impl Diagnostic {
    fn is_error(&self) -> bool {
        self.level == "error" || self.level.starts_with("error:")
    }

    fn text(&self) -> &str {
        self.message
            .as_deref()
            .or(self.rendered.as_deref())
            .unwrap_or("compile error")
    }
}

/// `build-finished` record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FinishedEvent {
    /// Whether the whole build succeeded
    pub success: bool,
}

/// Kind of a build output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Runnable binary (`.exe` or no extension)
    Executable,
    /// Platform debug-symbol bundle (`.dSYM`, `.pdb`, `.dwp`)
    DebugSymbols,
    /// Library output
    Library,
    /// Anything else
    Other,
}

impl ArtifactKind {
    /// Classify an output path
    #[must_use]
    pub fn classify(path: &Path) -> Self {
        let in_dsym = path.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|s| s.ends_with(".dSYM"))
        });
        if in_dsym {
            return Self::DebugSymbols;
        }
        match path.extension().and_then(|e| e.to_str()) {
            None | Some("exe") => Self::Executable,
            Some("pdb" | "dwp") => Self::DebugSymbols,
            Some("rlib" | "rmeta" | "so" | "dylib" | "dll" | "a" | "lib") => Self::Library,
            Some(_) => Self::Other,
        }
    }

    /// Whether artifacts of this kind can be coverage objects
    #[must_use]
    pub const fn is_object(self) -> bool {
        matches!(self, Self::Executable | Self::Other)
    }
}

/// One output file of the build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
    /// Output path
    pub path: PathBuf,
    /// Classified kind
    pub kind: ArtifactKind,
    /// Whether it was produced by a test-profile compilation
    pub is_test_profile: bool,
}

/// Discovered test binaries of one run
///
/// Computed once and shared by every downstream stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    paths: Vec<PathBuf>,
}

impl ArtifactSet {
    /// Build a set, dropping duplicates and keeping first-seen order
    #[must_use]
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut seen = HashSet::new();
        let paths = paths
            .into_iter()
            .filter(|p| seen.insert(p.clone()))
            .collect();
        Self { paths }
    }

    /// Number of binaries
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no binary was discovered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Binary paths in discovery order
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Iterate binary paths
    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.paths.iter()
    }

    /// Whether `path` is one of the discovered binaries
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// Fail with a discovery mismatch when nothing was discovered
    pub fn require_non_empty(&self) -> CovResult<()> {
        if self.is_empty() {
            return Err(CovError::discovery(
                "no test binaries found in the build-event stream",
            ));
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ArtifactSet {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

/// Parse newline-delimited build events
///
/// Blank lines are skipped. A line that is not a JSON record is a build
/// failure: a damaged stream cannot vouch for a complete binary set.
pub fn parse_build_events(stream: &str) -> CovResult<Vec<BuildEvent>> {
    stream
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| {
                CovError::build(format!("malformed build event on line {}: {e}", idx + 1))
            })
        })
        .collect()
}

/// Every output file of the stream with its classification
#[must_use]
pub fn build_artifacts(events: &[BuildEvent]) -> Vec<BuildArtifact> {
    events
        .iter()
        .filter_map(|event| match event {
            BuildEvent::CompilerArtifact(artifact) => Some(artifact),
            _ => None,
        })
        .flat_map(|artifact| {
            artifact
                .filenames
                .iter()
                .chain(&artifact.executable)
                .map(|path| BuildArtifact {
                    path: path.clone(),
                    kind: ArtifactKind::classify(path),
                    is_test_profile: artifact.profile.test,
                })
        })
        .collect()
}

/// Discover the test binaries of a build
///
/// Any compile error in the stream is fatal. An empty result is returned as
/// an empty set; callers decide that it is a discovery failure.
pub fn discover(events: &[BuildEvent]) -> CovResult<ArtifactSet> {
    let errors: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            BuildEvent::CompilerMessage(msg) if msg.message.is_error() => Some(msg.message.text()),
            _ => None,
        })
        .collect();
    if let Some(first) = errors.first() {
        return Err(CovError::build(format!(
            "{} compile error(s), first: {first}",
            errors.len()
        )));
    }
    if events
        .iter()
        .any(|e| matches!(e, BuildEvent::BuildFinished(FinishedEvent { success: false })))
    {
        return Err(CovError::build("build finished unsuccessfully"));
    }

    let set = ArtifactSet::new(
        build_artifacts(events)
            .into_iter()
            .filter(|a| a.is_test_profile && a.kind.is_object())
            .map(|a| a.path),
    );
    tracing::debug!(binaries = set.len(), "discovered test binaries");
    Ok(set)
}

/// Parse a stream and discover its test binaries
pub fn discover_from_stream(stream: &str) -> CovResult<ArtifactSet> {
    discover(&parse_build_events(stream)?)
}
