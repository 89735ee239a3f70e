//! Structured logging setup
//!
//! `RUST_LOG` wins when set; otherwise the filter follows `-q`/`-v`/`-vv`.
//! Logs go to stderr.

use crate::config::Verbosity;
use tracing_subscriber::EnvFilter;

/// Filter for a verbosity level, honoring `RUST_LOG`
#[must_use]
pub fn filter_for(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.log_directive()))
}

/// Install the global subscriber
///
/// A second call is a no-op.
pub fn init(verbosity: Verbosity) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(verbosity))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
