//! Project configuration for a test binary.
//!
//! A binary's configuration lives next to it as `<binary>.paratest.yaml`.
//! When that file is absent the file named by `PARATEST_CONFIG` is used,
//! and when neither exists every field takes its default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::runner::node::RunState;

/// Environment variable naming a config file to use when none sits next to the binary.
pub const CONFIG_ENV: &str = "PARATEST_CONFIG";

/// Environment variable overriding the worker count from config.
pub const WORKERS_ENV: &str = "PARATEST_WORKERS";

/// Suffix appended to a binary's file name to find its config file.
pub const CONFIG_SUFFIX: &str = "paratest.yaml";

/// Per-binary settings read from YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Worker count for the concurrent phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Fixtures allowed to run concurrently with each other.
    #[serde(default)]
    pub parallelizable: Vec<Pattern>,
    /// Nodes that only run when selected by name.
    #[serde(default)]
    pub explicit: Vec<Pattern>,
    /// Nodes that never run.
    #[serde(default)]
    pub ignored: Vec<Pattern>,
}

impl ProjectConfig {
    /// Parse a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed YAML, unknown keys, or a zero
    /// worker count.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        // An empty file is a valid, empty config.
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(input).map_err(|e| ConfigError {
            kind: ConfigErrorKind::Parse,
            message: e.to_string(),
            detail: None,
        })?;
        if config.workers == Some(0) {
            return Err(ConfigError {
                kind: ConfigErrorKind::InvalidValue,
                message: "workers must be at least 1".into(),
                detail: None,
            });
        }
        Ok(config)
    }

    /// Read and parse a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|e| ConfigError {
            kind: ConfigErrorKind::Read,
            message: format!("failed to read {}: {e}", path.display()),
            detail: None,
        })?;
        Self::parse(&input).map_err(|e| ConfigError {
            detail: Some(path.display().to_string()),
            ..e
        })
    }

    /// Load the config that applies to `binary`, along with where it came from.
    ///
    /// `fallback` stands in for `PARATEST_CONFIG` when given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a located file cannot be read or parsed.
    pub fn for_binary(
        binary: &Path,
        fallback: Option<&Path>,
    ) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        match locate(binary, fallback.or(env_path.as_deref())) {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                Ok((Self::load(&path)?, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    /// Whether the fixture named `path` may run on the worker pool.
    pub fn is_parallelizable(&self, path: &str) -> bool {
        self.parallelizable.iter().any(|p| p.matches(path))
    }

    /// Run-state the config assigns to `path`. Ignored wins over explicit.
    pub fn run_state(&self, path: &str) -> RunState {
        if self.ignored.iter().any(|p| p.matches(path)) {
            RunState::Ignored
        } else if self.explicit.iter().any(|p| p.matches(path)) {
            RunState::Explicit
        } else {
            RunState::Normal
        }
    }
}

/// Config file path for `binary`: the sibling file, else `env_path`.
pub fn locate(binary: &Path, env_path: Option<&Path>) -> Option<PathBuf> {
    let sibling = sibling_config_path(binary);
    if sibling.is_file() {
        return Some(sibling);
    }
    env_path.filter(|p| p.is_file()).map(Path::to_path_buf)
}

/// `<binary>.paratest.yaml` in the binary's directory.
pub fn sibling_config_path(binary: &Path) -> PathBuf {
    let mut name = binary
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(CONFIG_SUFFIX);
    binary.with_file_name(name)
}

/// Pick the worker count: CLI flag, then `PARATEST_WORKERS`, then config,
/// then `fallback`. Never less than one.
///
/// # Errors
///
/// Returns [`ConfigError`] when the flag is zero or the environment value is
/// not a positive integer.
pub fn resolve_workers(
    cli: Option<usize>,
    env: Option<&str>,
    config: &ProjectConfig,
    fallback: usize,
) -> Result<usize, ConfigError> {
    if let Some(n) = cli {
        if n == 0 {
            return Err(ConfigError {
                kind: ConfigErrorKind::InvalidValue,
                message: "--workers must be a positive integer, got 0".into(),
                detail: None,
            });
        }
        return Ok(n);
    }
    if let Some(raw) = env {
        return match raw.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError {
                kind: ConfigErrorKind::InvalidValue,
                message: format!("{WORKERS_ENV} must be a positive integer, got '{raw}'"),
                detail: None,
            }),
        };
    }
    Ok(config.workers.unwrap_or(fallback).max(1))
}

/// A fixture or test path pattern.
///
/// `*` matches everything, `a::b::*` matches `a::b` and everything below it,
/// anything else must match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(pub String);

impl Pattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.0 == "*" {
            return true;
        }
        match self.0.strip_suffix("::*") {
            Some(prefix) => {
                path == prefix
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with("::"))
            }
            None => self.0 == path,
        }
    }
}

/// Error loading configuration.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

/// Classification of config errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigErrorKind {
    #[error("config read failed")]
    Read,
    #[error("config parse failed")]
    Parse,
    #[error("invalid config value")]
    InvalidValue,
}
