//! Pipeline orchestration
//!
//! compile → discover → merge → render summary → render annotated → persist.
//! The first failing stage aborts the run; nothing reaches the output
//! destination unless every earlier stage succeeded.

use crate::artifact::{discover, parse_build_events, ArtifactSet, BuildEvent};
use crate::build::{BuildDriver, CargoBuild};
use crate::config::PipelineConfig;
use crate::demangle::{self, Demangler};
use crate::merge::{MergedIndex, ProfileMerger};
use crate::render::{reconcile, AnnotatedReport, PathFilter, RenderContext, SummaryReport};
use crate::result::{CovError, CovResult, Stage};
use crate::snapshot::{JsonSnapshotReader, SnapshotReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Receives stage notifications during [`Pipeline::run`]
pub trait PipelineObserver {
    /// A stage is about to start
    fn stage_started(&self, _stage: Stage) {}

    /// A stage completed; `detail` is a short human-readable result
    fn stage_finished(&self, _stage: Stage, _detail: &str) {}

    /// A stage failed and the run is aborting
    fn stage_failed(&self, _stage: Stage, _error: &CovError) {}
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Test binaries discovered for the run
    pub artifacts: Arc<ArtifactSet>,
    /// Number of snapshot files merged
    pub snapshot_count: usize,
    /// Number of function records in the merged index
    pub record_count: usize,
    /// Rendered summary
    pub summary: SummaryReport,
    /// Merged index file
    pub index_path: PathBuf,
    /// Published annotated report
    pub report_path: PathBuf,
    /// Published machine-readable summary
    pub summary_path: PathBuf,
}

/// The coverage pipeline
pub struct Pipeline {
    config: PipelineConfig,
    driver: Box<dyn BuildDriver>,
    reader: Box<dyn SnapshotReader>,
    demangler: Option<Box<dyn Demangler>>,
    observer: Option<Box<dyn PipelineObserver>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pipeline compiling with cargo and reading JSON snapshots
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            driver: Box::new(CargoBuild::new()),
            reader: Box::new(JsonSnapshotReader),
            demangler: None,
            observer: None,
        }
    }

    /// Replace the compile step
    #[must_use]
    pub fn with_driver(mut self, driver: impl BuildDriver + 'static) -> Self {
        self.driver = Box::new(driver);
        self
    }

    /// Replace the snapshot decoder
    #[must_use]
    pub fn with_reader(mut self, reader: impl SnapshotReader + 'static) -> Self {
        self.reader = Box::new(reader);
        self
    }

    /// Use a specific demangler instead of the configured one
    #[must_use]
    pub fn with_demangler(mut self, demangler: impl Demangler + 'static) -> Self {
        self.demangler = Some(Box::new(demangler));
        self
    }

    /// Receive stage notifications
    #[must_use]
    pub fn with_observer(mut self, observer: impl PipelineObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Configuration of this pipeline
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage in order
    pub fn run(&self) -> CovResult<PipelineOutcome> {
        self.config.validate()?;
        let filter = PathFilter::from_regex(self.config.exclusion_regex()?);
        let configured;
        let demangler: &dyn Demangler = match &self.demangler {
            Some(demangler) => &**demangler,
            None => {
                configured = demangle::from_config(self.config.demangler_command.as_deref())?;
                &*configured
            }
        };

        let events = self.stage(Stage::Compile, || self.compile())?;
        let artifacts = self.stage(Stage::Discover, || discover_artifacts(&events))?;

        let (index, snapshot_count) = self.stage(Stage::Merge, || self.merge(&artifacts))?;
        let index_path = self.config.merged_index_path();

        let ctx = RenderContext::new(&index, &artifacts, &filter, demangler);
        let summary = self.stage(Stage::RenderSummary, || {
            let summary = SummaryReport::render(&ctx)?;
            summary.write_json(&self.config.staged_summary_path())?;
            Ok(summary)
        })?;
        self.stage(Stage::RenderAnnotated, || {
            let annotated = AnnotatedReport::render(&ctx)?;
            reconcile(&summary, &annotated)?;
            annotated.write_html(&self.config.staged_report_path(), &self.config.title)
        })?;

        let (report_path, summary_path) = self.stage(Stage::Persist, || self.persist())?;

        Ok(PipelineOutcome {
            artifacts,
            snapshot_count,
            record_count: index.len(),
            summary,
            index_path,
            report_path,
            summary_path,
        })
    }

    fn stage<T>(&self, stage: Stage, work: impl FnOnce() -> CovResult<T>) -> CovResult<T> {
        let _span = tracing::info_span!("stage", stage = stage.name()).entered();
        if let Some(observer) = &self.observer {
            observer.stage_started(stage);
        }
        tracing::debug!("stage started");

        match work().map_err(|e| e.in_stage(stage)) {
            Ok(value) => {
                if let Some(observer) = &self.observer {
                    observer.stage_finished(stage, "done");
                }
                Ok(value)
            }
            Err(e) => {
                let failed = e.stage().unwrap_or(stage);
                tracing::error!(stage = failed.name(), error = %e, "stage failed");
                if let Some(observer) = &self.observer {
                    observer.stage_failed(failed, &e);
                }
                Err(e)
            }
        }
    }

    fn compile(&self) -> CovResult<Vec<BuildEvent>> {
        if !self.config.instrumentation_enabled {
            return Err(CovError::build(
                "instrumentation is disabled; binaries would not emit coverage snapshots",
            ));
        }
        let stream = self.driver.build(&self.config)?;
        let events = parse_build_events(&stream)?;
        tracing::info!(events = events.len(), "build finished");
        Ok(events)
    }

    fn merge(&self, artifacts: &ArtifactSet) -> CovResult<(MergedIndex, usize)> {
        let pattern = self.config.snapshot_pattern()?;
        let snapshots = pattern.find()?;
        let merger = ProfileMerger::new(artifacts, &*self.reader);
        let index = merger.merge(&snapshots)?;
        index.write_to(&self.config.merged_index_path())?;
        tracing::info!(
            snapshots = snapshots.len(),
            records = index.len(),
            objects = index.objects().len(),
            "merged snapshots"
        );
        Ok((index, snapshots.len()))
    }

    /// Publish the staged summary, then the staged report
    ///
    /// The report goes last; if it cannot be moved the summary is taken back
    /// so a failed run leaves nothing published.
    fn persist(&self) -> CovResult<(PathBuf, PathBuf)> {
        let destination = &self.config.output_destination;
        std::fs::create_dir_all(destination).map_err(|e| {
            CovError::persist(format!("cannot create {}: {e}", destination.display()))
        })?;

        let summary_path = self.config.published_summary_path();
        relocate(&self.config.staged_summary_path(), &summary_path)?;

        let published = self.config.published_report_path();
        if let Err(e) = relocate(&self.config.staged_report_path(), &published) {
            if let Err(cleanup) = std::fs::remove_file(&summary_path) {
                tracing::warn!(
                    summary = %summary_path.display(),
                    error = %cleanup,
                    "cannot withdraw published summary"
                );
            }
            return Err(e);
        }
        tracing::info!(report = %published.display(), "published annotated report");
        Ok((published, summary_path))
    }
}

fn discover_artifacts(events: &[BuildEvent]) -> CovResult<Arc<ArtifactSet>> {
    let artifacts = discover(events)?;
    artifacts.require_non_empty()?;
    tracing::info!(objects = artifacts.len(), "discovered test binaries");
    Ok(Arc::new(artifacts))
}

/// Move a file, copying when a rename is not possible (e.g. across devices)
fn relocate(from: &Path, to: &Path) -> CovResult<()> {
    if from == to {
        return Ok(());
    }
    if let Err(rename_error) = std::fs::rename(from, to) {
        tracing::debug!(error = %rename_error, "rename failed, copying instead");
        std::fs::copy(from, to).map_err(|e| {
            CovError::persist(format!(
                "cannot move {} to {}: {e}",
                from.display(),
                to.display()
            ))
        })?;
        std::fs::remove_file(from).map_err(|e| {
            CovError::persist(format!("cannot remove staged {}: {e}", from.display()))
        })?;
    }
    Ok(())
}
