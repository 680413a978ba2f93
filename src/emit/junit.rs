use std::fmt::Write;

use crate::runner::result::{Outcome, OutcomeStatus};

/// Per-suite tallies written as JUnit attributes.
#[derive(Debug, Default)]
struct Tally {
    tests: usize,
    failures: usize,
    errors: usize,
    skipped: usize,
}

impl Tally {
    fn of<'a>(leaves: impl IntoIterator<Item = &'a Outcome>) -> Self {
        let mut tally = Self::default();
        for leaf in leaves {
            tally.tests += 1;
            match leaf.status {
                OutcomeStatus::Failure => tally.failures += 1,
                OutcomeStatus::Error => tally.errors += 1,
                OutcomeStatus::Skipped => tally.skipped += 1,
                OutcomeStatus::Success => {}
            }
        }
        tally
    }

    fn attrs(&self) -> String {
        format!(
            r#"tests="{}" failures="{}" errors="{}" skipped="{}""#,
            self.tests, self.failures, self.errors, self.skipped
        )
    }
}

/// Emit test run results as JUnit XML.
///
/// One `<testsuite>` per top-level fixture and one `<testcase>` per leaf
/// below it. A fixture that is itself a leaf becomes a single test case.
pub fn emit_run_junit(root: &Outcome) -> String {
    let mut out = String::new();
    let name = xml_escape(&root.name);
    let total = Tally::of(leaves(root));

    // Writing to a String cannot fail.
    let _ = writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(
        out,
        r#"<testsuites name="{name}" {} time="{:.3}">"#,
        total.attrs(),
        root.duration.as_secs_f64()
    );

    for fixture in &root.children {
        let fixture_leaves = leaves(fixture);
        let _ = writeln!(
            out,
            r#"  <testsuite name="{}" {} time="{:.3}">"#,
            xml_escape(&fixture.name),
            Tally::of(fixture_leaves.iter().copied()).attrs(),
            fixture.duration.as_secs_f64()
        );
        for leaf in fixture_leaves {
            write_case(&mut out, &fixture.name, leaf);
        }
        let _ = writeln!(out, "  </testsuite>");
    }

    let _ = writeln!(out, "</testsuites>");
    out
}

fn leaves(outcome: &Outcome) -> Vec<&Outcome> {
    outcome.flatten().into_iter().filter(|o| o.is_leaf()).collect()
}

fn write_case(out: &mut String, classname: &str, leaf: &Outcome) {
    let _ = writeln!(
        out,
        r#"    <testcase name="{}" classname="{}" time="{:.3}">"#,
        xml_escape(&leaf.name),
        xml_escape(classname),
        leaf.duration.as_secs_f64()
    );

    let message = xml_escape(leaf.message.as_deref().unwrap_or_default());
    match leaf.status {
        OutcomeStatus::Failure | OutcomeStatus::Error => {
            let tag = if leaf.status == OutcomeStatus::Failure {
                "failure"
            } else {
                "error"
            };
            match &leaf.trace {
                Some(trace) => {
                    let _ = writeln!(
                        out,
                        r#"      <{tag} message="{message}">{}</{tag}>"#,
                        xml_escape(trace)
                    );
                }
                None => {
                    let _ = writeln!(out, r#"      <{tag} message="{message}"/>"#);
                }
            }
        }
        OutcomeStatus::Skipped => {
            let _ = writeln!(out, r#"      <skipped message="{message}"/>"#);
        }
        OutcomeStatus::Success => {}
    }

    if !leaf.stdout.is_empty() && leaf.status.is_failure_or_error() {
        let _ = writeln!(out, "      <system-out>{}</system-out>", xml_escape(&leaf.stdout));
    }

    let _ = writeln!(out, "    </testcase>");
}

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
