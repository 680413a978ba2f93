use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Per-thread execution state for the fixture currently running.
///
/// Execution engines read it while running cases; the scheduler installs a
/// fresh one on the running thread before every fixture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecContext {
    /// Directory test processes are started from (`None` = inherit).
    pub working_dir: Option<PathBuf>,
    /// Extra environment for test processes.
    pub env: HashMap<String, String>,
    /// Fixture being executed on this thread.
    pub fixture: Option<String>,
}

impl ExecContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(working_dir.into()),
            ..Self::default()
        }
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

thread_local! {
    static CURRENT: RefCell<ExecContext> = RefCell::new(ExecContext::default());
}

/// Restores the previously installed context when dropped.
#[must_use = "the context is restored as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: Option<ExecContext>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            CURRENT.with(|cell| *cell.borrow_mut() = previous);
        }
    }
}

/// Save the current thread's context and install `context` in its place.
pub fn save(context: ExecContext) -> ContextGuard {
    let previous = CURRENT.with(|cell| cell.replace(context));
    ContextGuard {
        previous: Some(previous),
    }
}

/// Clone of the context installed on the current thread.
pub fn current() -> ExecContext {
    CURRENT.with(|cell| cell.borrow().clone())
}

/// Record which fixture the current thread is executing.
pub fn set_fixture(name: &str) {
    CURRENT.with(|cell| cell.borrow_mut().fixture = Some(name.to_owned()));
}
