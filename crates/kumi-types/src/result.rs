//! ExecutionResult and BatchResult, the outcome of running a command across
//! packages.
//!
//! Every package handed to the executor gets exactly one `ExecutionResult`,
//! whether its command ran, failed, timed out, or never started.

use serde::Serialize;

/// Exit code reported when no process exit status exists: the unit was
/// cancelled, timed out, or could not be spawned.
pub const CANCELLED_EXIT_CODE: i32 = -1;

/// Outcome category of one package command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// The command exited with status 0.
    Success,
    /// Non-zero exit, timeout, or spawn failure.
    Failure,
    /// The command was never started because the run was cancelled.
    Cancelled,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Failure => write!(f, "failure"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The result of running one command in one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Package the command ran in.
    pub package_name: String,
    /// Outcome category.
    pub status: ExecutionStatus,
    /// Process exit code, or [`CANCELLED_EXIT_CODE`].
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error (or the error/timeout message).
    pub stderr: String,
    /// Wall-clock duration in milliseconds. Zero for cancelled units.
    pub duration_ms: u64,
    /// The command string that was (or would have been) run.
    pub command: String,
}

impl ExecutionResult {
    /// A successful run.
    pub fn success(
        package_name: impl Into<String>,
        command: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            status: ExecutionStatus::Success,
            exit_code: 0,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration_ms,
            command: command.into(),
        }
    }

    /// A failed run with an error message in place of stderr.
    pub fn failure(
        package_name: impl Into<String>,
        command: impl Into<String>,
        exit_code: i32,
        err: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            status: ExecutionStatus::Failure,
            exit_code,
            stdout: String::new(),
            stderr: err.into(),
            duration_ms,
            command: command.into(),
        }
    }

    /// A unit that never started.
    pub fn cancelled(package_name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            status: ExecutionStatus::Cancelled,
            exit_code: CANCELLED_EXIT_CODE,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
            command: command.into(),
        }
    }

    /// Build a result from a finished process. Status follows the exit code.
    pub fn from_exit(
        package_name: impl Into<String>,
        command: impl Into<String>,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        let status = if exit_code == 0 {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failure
        };
        Self {
            package_name: package_name.into(),
            status,
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration_ms,
            command: command.into(),
        }
    }

    /// True if the command succeeded.
    pub fn ok(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// True if the command ran (or tried to) and failed.
    pub fn failed(&self) -> bool {
        self.status == ExecutionStatus::Failure
    }

    /// True if the unit was cancelled before starting.
    pub fn is_cancelled(&self) -> bool {
        self.status == ExecutionStatus::Cancelled
    }
}

/// Results of one executor invocation, in a deterministic order: input order
/// for flat runs, layer order then input order for batched runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub results: Vec<ExecutionResult>,
}

impl BatchResult {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self { results }
    }

    /// Number of successful results.
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.ok()).count()
    }

    /// Number of failed results (cancelled units are not failures).
    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| r.failed()).count()
    }

    /// Number of cancelled results.
    pub fn cancelled_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_cancelled()).count()
    }

    /// True when every result succeeded. Cancelled units count against this,
    /// so a fail-fast run is never "all success". Empty batches are.
    pub fn all_success(&self) -> bool {
        self.results.iter().all(ExecutionResult::ok)
    }

    /// True when at least one result failed.
    pub fn any_failure(&self) -> bool {
        self.results.iter().any(ExecutionResult::failed)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExecutionResult> {
        self.results.iter()
    }

    /// Look up the result for a package.
    pub fn get(&self, package_name: &str) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.package_name == package_name)
    }
}

impl FromIterator<ExecutionResult> for BatchResult {
    fn from_iter<I: IntoIterator<Item = ExecutionResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

impl Extend<ExecutionResult> for BatchResult {
    fn extend<I: IntoIterator<Item = ExecutionResult>>(&mut self, iter: I) {
        self.results.extend(iter);
    }
}

impl IntoIterator for BatchResult {
    type Item = ExecutionResult;
    type IntoIter = std::vec::IntoIter<ExecutionResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a BatchResult {
    type Item = &'a ExecutionResult;
    type IntoIter = std::slice::Iter<'a, ExecutionResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
