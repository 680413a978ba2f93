use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::error;

use crate::config::{self, CONFIG_ENV, ProjectConfig, WORKERS_ENV};
use crate::emit::{ReportFormat, ReportTarget, write_report};
use crate::isolation::{IsolationLauncher, absolute, report_path_for};
use crate::logging::LogLevel;
use crate::runner::backend::{EventSink, NullSink};
use crate::runner::backends::libtest::{LibtestDiscovery, LibtestEngine};
use crate::runner::display::{ProgressSink, format_run_header};
use crate::runner::executor::{ParallelRunner, RunConfig, binary_name};
use crate::runner::pool::default_worker_count;

/// Every test passed.
pub const EXIT_OK: i32 = 0;
/// At least one test failed or errored.
pub const EXIT_FAILURES: i32 = 1;
/// The run could not be carried out.
pub const EXIT_FATAL: i32 = 2;

/// Options for the run command.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub binaries: Vec<PathBuf>,
    pub xml: Option<PathBuf>,
    pub format: Option<ReportFormat>,
    pub workers: Option<usize>,
    pub config: Option<PathBuf>,
    pub exclude: Option<String>,
    pub log_level: LogLevel,
    pub progress: bool,
    pub isolated: bool,
}

impl RunOptions {
    /// Options every isolated child receives, ahead of its own report path
    /// and binary. The config path travels through the environment instead.
    pub fn forwarded_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(format) = self.format {
            args.push("--format".into());
            args.push(format.to_string().into());
        }
        if let Some(workers) = self.workers {
            args.push("--workers".into());
            args.push(workers.to_string().into());
        }
        if let Some(exclude) = &self.exclude {
            args.push("--exclude".into());
            args.push(exclude.into());
        }
        args.push("--log-level".into());
        args.push(self.log_level.to_string().into());
        if !self.progress {
            args.push("--no-progress".into());
        }
        args
    }

    fn report_target(&self, path: PathBuf) -> ReportTarget {
        let target = ReportTarget::new(path);
        match self.format {
            Some(format) => target.with_format(format),
            None => target,
        }
    }
}

/// Run the command and return the process exit code.
pub fn run(options: &RunOptions) -> i32 {
    if !options.isolated {
        return run_supervisor(options);
    }

    let result = match options.binaries.as_slice() {
        [binary] => run_isolated(binary, options),
        _ => Err("--isolated takes exactly one test binary".to_owned()),
    };

    match result {
        Ok(true) => EXIT_OK,
        Ok(false) => EXIT_FAILURES,
        Err(e) => {
            eprintln!("error: {e}");
            EXIT_FATAL
        }
    }
}

/// Run one binary in-process: discover, schedule, summarize, report.
///
/// Returns `Ok(true)` if every executed test passed, `Ok(false)` if any
/// failed or errored.
///
/// # Errors
///
/// Returns an error string if configuration, discovery, or report writing fails.
pub fn run_isolated(binary: &Path, options: &RunOptions) -> Result<bool, String> {
    let start = Instant::now();

    let (project, _) = ProjectConfig::for_binary(binary, options.config.as_deref())
        .map_err(|e| e.to_string())?;
    let env_workers = std::env::var(WORKERS_ENV).ok();
    let worker_count = config::resolve_workers(
        options.workers,
        env_workers.as_deref(),
        &project,
        default_worker_count(),
    )
    .map_err(|e| e.to_string())?;

    println!("{}", format_run_header(&binary_name(binary), worker_count));

    let config = RunConfig {
        worker_count,
        excluded_fixture: options.exclude.clone(),
        ..RunConfig::new(binary)
    };
    let discovery = LibtestDiscovery::new(project);
    let engine = LibtestEngine::new(binary);
    let sink: Box<dyn EventSink> = if options.progress {
        Box::new(ProgressSink::stdout())
    } else {
        Box::new(NullSink)
    };

    let result = ParallelRunner::new(config, &discovery, &engine)
        .run(sink.as_ref())
        .map_err(|e| {
            for failure in &e.failures {
                eprintln!("{}", failure.message);
            }
            e.to_string()
        })?;

    print!("{}", result.report);

    let target = options.xml.clone().map(|p| options.report_target(absolute(&p)));
    write_report(&result.root, &result.summary, target.as_ref()).map_err(|e| e.to_string())?;

    println!("Completed tests in: {:?}", start.elapsed());
    Ok(result.summary.success())
}

/// Launch one isolated child per binary and combine their exit codes.
///
/// Every binary is attempted even when an earlier one fails; the worst
/// exit code wins.
pub fn run_supervisor(options: &RunOptions) -> i32 {
    let launcher = match IsolationLauncher::current() {
        Ok(launcher) => launcher,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_FATAL;
        }
    };

    let forwarded = options.forwarded_args();
    let shared = options.binaries.len() > 1;
    let report = options.xml.as_deref().map(absolute);
    let config_override = options
        .config
        .clone()
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    let mut worst = EXIT_OK;
    for binary in &options.binaries {
        let report = report
            .as_deref()
            .map(|r| report_path_for(r, binary, shared));
        let plan = launcher.plan(binary, &forwarded, report.as_deref(), config_override.as_deref());
        let code = match launcher.launch(&plan) {
            Ok(code) => child_exit_code(code),
            Err(e) => {
                error!("{e}");
                eprintln!("error: {e}");
                EXIT_FATAL
            }
        };
        worst = worst.max(code);
    }
    worst
}

/// Normalize a child's exit code to one of ours.
pub fn child_exit_code(code: i32) -> i32 {
    match code {
        EXIT_OK => EXIT_OK,
        EXIT_FAILURES => EXIT_FAILURES,
        _ => EXIT_FATAL,
    }
}
