//! Command handlers - extracted from main.rs for testability

pub mod clean;
pub mod config;
pub mod discover;
pub mod merge;
pub mod report;
pub mod run;

// Re-export handlers for convenient access
pub use clean::execute_clean;
pub use config::execute_config;
pub use discover::execute_discover;
pub use merge::execute_merge;
pub use report::execute_report;
pub use run::execute_run;
