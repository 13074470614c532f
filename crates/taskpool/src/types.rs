//! Core types for task execution

use crate::error::TaskError;
use std::time::Duration;

/// How tasks are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Every task on its own thread, fail-fast on the first failure
    #[default]
    Parallel,
    /// One task at a time, in order
    Serial,
}

/// What [`crate::run`] does when a task fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Return the first failure's error after all results are recorded
    #[default]
    Raise,
    /// Return results only; failures are visible in the result statuses
    Collect,
}

/// Options for a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: ExecutionMode,
    pub on_failure: FailurePolicy,
    /// How long the engine waits for a result before re-checking its units
    pub poll_interval: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            on_failure: FailurePolicy::Raise,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl RunOptions {
    pub fn serial() -> Self {
        Self {
            mode: ExecutionMode::Serial,
            ..Self::default()
        }
    }

    pub fn collect(mut self) -> Self {
        self.on_failure = FailurePolicy::Collect;
        self
    }
}

/// Terminal state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Operation returned and the validator (if any) accepted the output
    Succeeded,
    /// Operation or validator failed
    Failed,
    /// Stopped or never started because another task failed
    Killed,
}

/// Outcome of one task
#[derive(Debug, Clone)]
pub struct TaskResult<A, O> {
    pub description: String,
    pub status: TaskStatus,
    /// Set only when `status` is `Succeeded`
    pub output: Option<O>,
    /// Set when `status` is `Failed` or `Killed`
    pub error: Option<TaskError>,
    /// Arguments the task was started with
    pub arguments: A,
}

impl<A, O> TaskResult<A, O> {
    pub(crate) fn succeeded(description: String, arguments: A, output: O) -> Self {
        Self {
            description,
            status: TaskStatus::Succeeded,
            output: Some(output),
            error: None,
            arguments,
        }
    }

    /// A failed or killed result, depending on whether the error is a
    /// cancellation.
    pub(crate) fn from_error(description: String, arguments: A, error: TaskError) -> Self {
        let status = if error.is_cancellation() {
            TaskStatus::Killed
        } else {
            TaskStatus::Failed
        };
        Self {
            description,
            status,
            output: None,
            error: Some(error),
            arguments,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }
}

/// Summary of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub killed: usize,
}

impl RunSummary {
    pub fn from_results<A, O>(results: &[TaskResult<A, O>]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result.status {
                TaskStatus::Succeeded => summary.succeeded += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Killed => summary.killed += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.killed == 0
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.killed
    }
}

/// Output from a supervised command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code, `None` if terminated by a signal
    pub code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
