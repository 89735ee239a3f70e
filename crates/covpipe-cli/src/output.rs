//! Output formatting and progress reporting

use covpipe::{CovError, PipelineObserver, Stage};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Progress reporter for pipeline stages
///
/// Status lines go to stderr so stdout carries only the summary.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    term: Term,
    spinner: Arc<Mutex<Option<ProgressBar>>>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            spinner: Arc::new(Mutex::new(None)),
            use_color,
            quiet,
        }
    }

    /// Start a spinner for a running step
    pub fn start_spinner(&self, message: &str) {
        if self.quiet || !self.term.is_term() {
            return;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(previous) = slot.replace(pb) {
                previous.finish_and_clear();
            }
        }
    }

    /// Stop the spinner, if any
    pub fn finish(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(pb) = slot.take() {
                pb.finish_and_clear();
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "PASS".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }
}

impl PipelineObserver for ProgressReporter {
    fn stage_started(&self, stage: Stage) {
        self.start_spinner(&format!("{stage}..."));
    }

    fn stage_finished(&self, stage: Stage, detail: &str) {
        self.finish();
        self.success(&format!("{stage}: {detail}"));
    }

    fn stage_failed(&self, stage: Stage, _error: &CovError) {
        self.finish();
        self.failure(&format!("{stage}"));
    }
}
