//! Report files written after a run.

pub mod junit;
pub mod run_result;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::info;

use crate::emit::junit::emit_run_junit;
use crate::emit::run_result::{emit_run_json, emit_run_yaml};
use crate::runner::report::to_report;
use crate::runner::result::Outcome;
use crate::runner::summary::RunSummary;

/// Output format of a report file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Junit,
    Json,
    Yaml,
}

impl ReportFormat {
    /// Infer the format from a file extension. Unknown extensions are JUnit.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => Self::Json,
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Junit,
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "junit" | "xml" => Ok(Self::Junit),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(format!(
                "unknown format '{other}' (expected: junit, json, yaml)"
            )),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Junit => write!(f, "junit"),
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}

/// Where and how to write a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTarget {
    pub path: PathBuf,
    pub format: ReportFormat,
}

impl ReportTarget {
    /// A target whose format follows the path's extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = ReportFormat::from_path(&path);
        Self { path, format }
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }
}

/// Render a run in the given format.
///
/// # Errors
///
/// Returns [`ReportError`] if serialization fails.
pub fn render(format: ReportFormat, root: &Outcome, summary: &RunSummary) -> Result<String, ReportError> {
    match format {
        ReportFormat::Junit => Ok(emit_run_junit(root)),
        ReportFormat::Json => emit_run_json(&to_report(root, summary)),
        ReportFormat::Yaml => emit_run_yaml(&to_report(root, summary)),
    }
}

/// Write the run's report to `target`. Does nothing when `target` is `None`.
///
/// # Errors
///
/// Returns [`ReportError`] if rendering or writing the file fails.
pub fn write_report(
    root: &Outcome,
    summary: &RunSummary,
    target: Option<&ReportTarget>,
) -> Result<(), ReportError> {
    let Some(target) = target else {
        return Ok(());
    };

    let rendered = render(target.format, root, summary)?;
    std::fs::write(&target.path, rendered).map_err(|e| ReportError {
        kind: ReportErrorKind::Write,
        message: format!("failed to write {}: {e}", target.path.display()),
        detail: None,
    })?;
    info!(path = %target.path.display(), format = %target.format, "report written");
    Ok(())
}

/// Error producing a report.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ReportError {
    pub kind: ReportErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

/// Classification of report errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportErrorKind {
    #[error("serialization failed")]
    Serialize,
    #[error("write failed")]
    Write,
}
