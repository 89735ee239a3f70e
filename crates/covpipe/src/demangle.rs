//! Symbol demangling for the annotated report

use crate::result::{CovError, CovResult, ReportKind};
use std::io::Write;
use std::process::{Command, Stdio};

/// Maps raw linker symbols to readable names
pub trait Demangler {
    /// Demangle a batch of symbols, returning one name per input, in order
    fn demangle(&self, symbols: &[String]) -> CovResult<Vec<String>>;
}

/// In-process Rust demangler
///
/// Handles legacy (`_ZN…E`) and v0 (`_R…`) symbols and drops the trailing
/// hash. Anything it does not recognize is passed through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustDemangler;

impl Demangler for RustDemangler {
    fn demangle(&self, symbols: &[String]) -> CovResult<Vec<String>> {
        Ok(symbols
            .iter()
            .map(|symbol| match rustc_demangle::try_demangle(symbol) {
                Ok(demangled) => format!("{demangled:#}"),
                Err(_) => symbol.clone(),
            })
            .collect())
    }
}

/// Demangler backed by an external filter program such as `rustfilt`
///
/// Symbols are written one per line to the program's stdin; it must answer
/// with exactly one line per symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalDemangler {
    program: String,
    args: Vec<String>,
}

impl ExternalDemangler {
    /// Create from a whitespace-separated command line
    pub fn from_command(command: &str) -> CovResult<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| CovError::config("demangler command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Program name
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Demangler for ExternalDemangler {
    fn demangle(&self, symbols: &[String]) -> CovResult<Vec<String>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                let reason = if e.kind() == std::io::ErrorKind::NotFound {
                    "not found".to_string()
                } else {
                    e.to_string()
                };
                CovError::render(
                    ReportKind::Annotated,
                    format!("symbol demangler `{}` {reason}", self.program),
                )
            })?;

        // The filter may block on a full stdout pipe; write from a thread.
        let input = symbols.join("\n") + "\n";
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || stdin.write_all(input.as_bytes()))
        });

        let output = child.wait_with_output().map_err(|e| {
            CovError::render(ReportKind::Annotated, format!("waiting for `{}`: {e}", self.program))
        })?;
        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| {
                    CovError::render(ReportKind::Annotated, format!("writer for `{}` panicked", self.program))
                })?
                .map_err(|e| {
                    CovError::render(ReportKind::Annotated, format!("writing to `{}`: {e}", self.program))
                })?;
        }
        if !output.status.success() {
            return Err(CovError::render(
                ReportKind::Annotated,
                format!(
                    "symbol demangler `{}` exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let names: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect();
        if names.len() != symbols.len() {
            return Err(CovError::render(
                ReportKind::Annotated,
                format!(
                    "symbol demangler `{}` returned {} names for {} symbols",
                    self.program,
                    names.len(),
                    symbols.len()
                ),
            ));
        }
        Ok(names)
    }
}

/// Build the demangler a configuration asks for
pub fn from_config(command: Option<&str>) -> CovResult<Box<dyn Demangler>> {
    match command {
        Some(command) => Ok(Box::new(ExternalDemangler::from_command(command)?)),
        None => Ok(Box::new(RustDemangler)),
    }
}
