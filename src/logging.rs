//! Logging setup.
//!
//! Diagnostics go to stderr through `tracing`. Progress characters and the
//! final summary are printed directly and never pass through here.

use std::fmt;
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log level configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!(
                "unknown log level '{other}' (expected: trace, debug, info, warn, error)"
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Filter directive for `level`, unless `RUST_LOG` supplies one.
pub fn filter_directive(level: LogLevel, rust_log: Option<&str>) -> String {
    match rust_log {
        Some(directive) if !directive.trim().is_empty() => directive.to_owned(),
        _ => format!("paratest={}", level.to_tracing_level()),
    }
}

/// Install the stderr subscriber. A second call is a no-op.
pub fn init(level: LogLevel) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = EnvFilter::new(filter_directive(level, rust_log.as_deref()));

    // Fails only when a global subscriber is already set.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}
