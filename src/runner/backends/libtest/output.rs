/// Result status of one test as printed by a libtest binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStatus {
    Ok,
    Failed,
    Ignored,
}

/// A parsed result for a single test in libtest output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseReport {
    /// Full test path, e.g. "codec::frames::decodes_header".
    pub name: String,
    pub status: CaseStatus,
    /// Panic message, if the test failed with one.
    pub message: Option<String>,
    /// The test's failure section: captured output and panic report.
    pub section: String,
}

/// Parse libtest's human-readable output into per-test results.
///
/// Handles the result lines:
/// ```text
/// test codec::decodes ... ok
/// test codec::rejects ... FAILED
/// test codec::panics - should panic ... ok
/// test codec::slow ... ignored, takes a minute
/// ```
/// and the `---- name stdout ----` failure sections that follow them.
pub fn parse_output(stdout: &str) -> Vec<CaseReport> {
    let mut reports: Vec<CaseReport> = stdout.lines().filter_map(parse_result_line).collect();

    for (name, section, message) in extract_failure_sections(stdout) {
        if let Some(report) = reports.iter_mut().find(|r| r.name == name) {
            report.section = section;
            report.message = message;
        }
    }

    reports
}

/// The report for `name`, if its result line was printed.
pub fn find_case<'a>(reports: &'a [CaseReport], name: &str) -> Option<&'a CaseReport> {
    reports.iter().find(|r| r.name == name)
}

fn parse_result_line(line: &str) -> Option<CaseReport> {
    let rest = line.trim().strip_prefix("test ")?;
    let (name, verdict) = rest.split_once(" ... ")?;
    let status = if verdict == "ok" {
        CaseStatus::Ok
    } else if verdict == "FAILED" {
        CaseStatus::Failed
    } else if verdict.starts_with("ignored") {
        CaseStatus::Ignored
    } else {
        return None;
    };
    let name = name.strip_suffix(" - should panic").unwrap_or(name);
    Some(CaseReport {
        name: name.to_owned(),
        status,
        message: None,
        section: String::new(),
    })
}

/// Extract `(name, section text, panic message)` for every failure section.
///
/// A section looks like:
/// ```text
/// ---- codec::rejects stdout ----
/// <captured output>
/// thread 'codec::rejects' panicked at src/codec.rs:42:5:
/// assertion failed: frame.is_none()
/// ```
fn extract_failure_sections(stdout: &str) -> Vec<(String, String, Option<String>)> {
    let mut sections = Vec::new();
    let lines: Vec<&str> = stdout.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let Some(name) = section_header(lines[i]) else {
            i += 1;
            continue;
        };

        let mut text = String::new();
        let mut message = None;
        i += 1;
        while i < lines.len() {
            let line = lines[i];
            let trimmed = line.trim();
            if section_header(line).is_some() || trimmed.starts_with("failures:") {
                break;
            }
            if message.is_none() && line.contains("panicked at") {
                message = panic_message(line, lines.get(i + 1..).unwrap_or_default());
            }
            text.push_str(line);
            text.push('\n');
            i += 1;
        }

        sections.push((name.to_owned(), text.trim_end().to_owned(), message));
    }

    sections
}

fn section_header(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("---- ")
        .and_then(|s| s.strip_suffix(" stdout ----"))
}

/// Extract the panic message from a panic report.
///
/// Handles both forms:
/// - `thread 'name' panicked at 'message', file:line:col`
/// - `thread 'name' panicked at file:line:col:` with the message on the
///   following lines, up to a blank line or a `note:` line
fn panic_message(line: &str, following: &[&str]) -> Option<String> {
    let start = line.find("panicked at ")?;
    let after = &line[start + "panicked at ".len()..];

    if let Some(quoted) = after.strip_prefix('\'') {
        if let Some(end) = quoted.rfind("', ") {
            return Some(quoted[..end].to_owned());
        }
    }

    if after.trim_end().ends_with(':') {
        let message: Vec<&str> = following
            .iter()
            .take_while(|l| !l.trim().is_empty() && !l.starts_with("note:"))
            .copied()
            .collect();
        if !message.is_empty() {
            return Some(message.join("\n"));
        }
    }

    let trimmed = after.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
