use std::path::PathBuf;

use clap::Parser;

use paratest::cli::commands::{self, RunOptions};
use paratest::emit::ReportFormat;
use paratest::logging::{self, LogLevel};

#[derive(Parser)]
#[command(
    name = "paratest",
    about = "Run libtest binaries with fixtures spread across a worker pool",
    version
)]
struct Cli {
    /// Test binaries to run
    #[arg(required = true)]
    binaries: Vec<PathBuf>,

    /// Write a report file (format from the extension unless --format is given)
    #[arg(long, value_name = "PATH")]
    xml: Option<PathBuf>,

    /// Report format: junit, json, yaml
    #[arg(long)]
    format: Option<ReportFormat>,

    /// Worker threads for parallelizable fixtures (default: 2 x CPUs)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Config file used when none sits next to a binary
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Fixture that must never run
    #[arg(long, value_name = "FIXTURE")]
    exclude: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, default_value = "warn")]
    log_level: LogLevel,

    /// Do not print progress characters
    #[arg(long)]
    no_progress: bool,

    /// Run the single given binary in this process
    #[arg(long, hide = true)]
    isolated: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_level);

    let options = RunOptions {
        binaries: cli.binaries,
        xml: cli.xml,
        format: cli.format,
        workers: cli.workers,
        config: cli.config,
        exclude: cli.exclude,
        log_level: cli.log_level,
        progress: !cli.no_progress,
        isolated: cli.isolated,
    };

    std::process::exit(commands::run(&options));
}
