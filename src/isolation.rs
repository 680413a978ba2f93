//! Per-binary isolated execution.
//!
//! The supervisor re-runs this executable once per test binary with
//! `--isolated` appended. Each child starts in the binary's directory with
//! the binary's own configuration, so tests see the same environment they
//! would see when the binary is run directly.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{self, CONFIG_ENV};

/// Flag marking a child process that should run its binary in-process.
pub const ISOLATED_FLAG: &str = "--isolated";

/// Everything needed to start one isolated child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Absolute path of the test binary.
    pub binary: PathBuf,
    /// Directory the child starts in.
    pub working_dir: PathBuf,
    /// Config file exported through `PARATEST_CONFIG`, if any.
    pub config: Option<PathBuf>,
    /// Full argument list for the child.
    pub args: Vec<OsString>,
}

/// Launches one isolated child per test binary.
#[derive(Debug, Clone)]
pub struct IsolationLauncher {
    exe: PathBuf,
}

impl IsolationLauncher {
    /// A launcher that re-runs `exe`.
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    /// A launcher that re-runs the current executable.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] if the current executable cannot be located.
    pub fn current() -> Result<Self, LaunchError> {
        let exe = std::env::current_exe().map_err(|e| LaunchError {
            kind: LaunchErrorKind::ExecutableNotFound,
            message: format!("cannot locate current executable: {e}"),
            detail: None,
        })?;
        Ok(Self::new(exe))
    }

    /// Plan the child for `binary`.
    ///
    /// `forwarded` holds the options shared by every child. The report path,
    /// when given, must already be specific to this binary. Paths are made
    /// absolute because the child starts elsewhere.
    pub fn plan(
        &self,
        binary: &Path,
        forwarded: &[OsString],
        report: Option<&Path>,
        config_override: Option<&Path>,
    ) -> LaunchPlan {
        let binary = absolute(binary);
        let working_dir = binary
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let config = config::locate(&binary, config_override.map(absolute).as_deref());

        let mut args = forwarded.to_vec();
        if let Some(report) = report {
            args.push("--xml".into());
            args.push(absolute(report).into_os_string());
        }
        args.push(ISOLATED_FLAG.into());
        args.push(binary.clone().into_os_string());

        LaunchPlan {
            binary,
            working_dir,
            config,
            args,
        }
    }

    /// Run the child to completion with inherited stdio. Returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError`] if the child cannot be started or is killed
    /// by a signal.
    pub fn launch(&self, plan: &LaunchPlan) -> Result<i32, LaunchError> {
        let mut cmd = Command::new(&self.exe);
        cmd.args(&plan.args).current_dir(&plan.working_dir);
        match &plan.config {
            Some(path) => cmd.env(CONFIG_ENV, path),
            None => cmd.env_remove(CONFIG_ENV),
        };

        info!(
            binary = %plan.binary.display(),
            dir = %plan.working_dir.display(),
            "starting isolated run"
        );
        let status = cmd.status().map_err(|e| LaunchError {
            kind: LaunchErrorKind::SpawnFailed,
            message: format!("failed to start {}: {e}", self.exe.display()),
            detail: Some(plan.binary.display().to_string()),
        })?;

        let code = status.code().ok_or_else(|| LaunchError {
            kind: LaunchErrorKind::Terminated,
            message: format!("isolated run terminated: {status}"),
            detail: Some(plan.binary.display().to_string()),
        })?;
        if code != 0 {
            warn!(binary = %plan.binary.display(), code, "isolated run exited non-zero");
        }
        Ok(code)
    }
}

/// Report path for one binary.
///
/// When several binaries share one report path each gets its own file,
/// `<stem>-<binary stem>.<ext>`, next to the requested one.
pub fn report_path_for(report: &Path, binary: &Path, shared: bool) -> PathBuf {
    if !shared {
        return report.to_path_buf();
    }
    let stem = report
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_owned());
    let binary_stem = binary
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{stem}-{binary_stem}");
    if let Some(ext) = report.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    report.with_file_name(name)
}

/// `path` resolved against the current directory.
pub fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Error starting an isolated run.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct LaunchError {
    pub kind: LaunchErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

/// Classification of launch errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchErrorKind {
    #[error("executable not found")]
    ExecutableNotFound,
    #[error("spawn failed")]
    SpawnFailed,
    #[error("terminated")]
    Terminated,
}
