use std::path::Path;
use std::process::Command;

use crate::runner::backend::{CaseDescriptor, DiscoveryError, DiscoveryErrorKind, LoadFailure, TypeDescriptor};

/// One entry of a `--list --format terse` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedTest {
    pub full_name: String,
    pub ignored: bool,
}

/// Run the binary's listing twice (all tests, then ignored only) and merge.
///
/// # Errors
///
/// Returns [`DiscoveryError`] when the binary cannot be spawned, exits
/// unsuccessfully, or prints lines that are not test entries.
pub fn list_tests(binary: &Path) -> Result<Vec<ListedTest>, DiscoveryError> {
    let all = run_listing(binary, false)?;
    let ignored = run_listing(binary, true)?;
    Ok(all
        .into_iter()
        .map(|full_name| ListedTest {
            ignored: ignored.contains(&full_name),
            full_name,
        })
        .collect())
}

fn run_listing(binary: &Path, ignored: bool) -> Result<Vec<String>, DiscoveryError> {
    let mut cmd = Command::new(binary);
    cmd.args(["--list", "--format", "terse"]);
    if ignored {
        cmd.arg("--ignored");
    }

    let output = cmd.output().map_err(|e| DiscoveryError {
        kind: DiscoveryErrorKind::BinaryNotLoadable,
        message: format!("failed to run {}: {e}", binary.display()),
        failures: vec![LoadFailure {
            message: e.to_string(),
            trace: None,
            loader_log: Some(loader_log(binary)),
        }],
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(DiscoveryError {
            kind: DiscoveryErrorKind::TypeLoadFailed,
            message: format!("{} --list exited with {}", binary.display(), output.status),
            failures: vec![LoadFailure {
                message: format!("listing exited with {}", output.status),
                trace: (!stderr.trim().is_empty()).then_some(stderr),
                loader_log: None,
            }],
        });
    }

    parse_listing(&String::from_utf8_lossy(&output.stdout))
}

/// Where the loader looked, for file-not-found diagnostics.
fn loader_log(binary: &Path) -> String {
    let cwd = std::env::current_dir()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|_| "<unknown>".to_owned());
    format!(
        "binary: {}\nexists: {}\nworking directory: {cwd}",
        binary.display(),
        binary.exists()
    )
}

/// Parse a terse listing into test names. Benchmarks are skipped.
///
/// # Errors
///
/// Returns [`DiscoveryError`] with one [`LoadFailure`] per unparseable line.
pub fn parse_listing(stdout: &str) -> Result<Vec<String>, DiscoveryError> {
    let mut names = Vec::new();
    let mut failures = Vec::new();

    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(name) = trimmed.strip_suffix(": test") {
            names.push(name.to_owned());
        } else if trimmed.ends_with(": bench") {
            continue;
        } else {
            failures.push(LoadFailure {
                message: format!("unrecognized listing line: {trimmed}"),
                trace: None,
                loader_log: None,
            });
        }
    }

    if failures.is_empty() {
        Ok(names)
    } else {
        Err(DiscoveryError {
            kind: DiscoveryErrorKind::TypeLoadFailed,
            message: format!("{} listing lines could not be parsed", failures.len()),
            failures,
        })
    }
}

/// Group tests into one type per module path, in first-seen order.
///
/// Tests at the crate root group under `root_name`.
pub fn group_by_module(tests: &[ListedTest], root_name: &str) -> Vec<TypeDescriptor> {
    let mut types: Vec<TypeDescriptor> = Vec::new();

    for test in tests {
        let module = test
            .full_name
            .rsplit_once("::")
            .map_or(root_name, |(module, _)| module);
        let case = CaseDescriptor {
            full_name: test.full_name.clone(),
            ignored: test.ignored,
        };
        match types.iter_mut().find(|t| t.name == module) {
            Some(ty) => ty.cases.push(case),
            None => types.push(TypeDescriptor {
                name: module.to_owned(),
                cases: vec![case],
            }),
        }
    }

    types
}
