//! Task context and provider traits
//!
//! A [`TaskContext`] is handed to every operation. It is the only link
//! between a running task and the engine: tasks can observe cancellation
//! and start subprocesses the engine knows how to stop.

use crate::error::TaskError;
use crate::process::{self, ChildRegistry};
use crate::types::{CommandOutput, TaskStatus};
use anyhow::Result;
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity of cancellable waits inside tasks
pub(crate) const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Shared flag raised once any task fails
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-task view of the engine
#[derive(Debug, Clone)]
pub struct TaskContext {
    index: usize,
    cancel: CancelToken,
    children: Arc<ChildRegistry>,
}

impl TaskContext {
    pub(crate) fn new(index: usize, cancel: CancelToken, children: Arc<ChildRegistry>) -> Self {
        Self {
            index,
            cancel,
            children,
        }
    }

    /// A context not attached to any run (for calling operations directly)
    pub fn detached() -> Self {
        Self::new(0, CancelToken::new(), Arc::new(ChildRegistry::default()))
    }

    /// Position of this task in the run
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Error out if the run has been cancelled
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(TaskError::Killed.into());
        }
        Ok(())
    }

    /// Sleep, returning early with [`TaskError::Killed`] on cancellation
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.check_cancelled()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(CANCEL_POLL.min(deadline - now));
        }
    }

    /// Run a command as a supervised subprocess and capture its output.
    ///
    /// The engine kills the subprocess (and, on unix, its process group)
    /// if another task fails while it is running.
    pub fn run_command(&self, command: Command) -> Result<CommandOutput> {
        self.check_cancelled()?;
        process::run_supervised(command, &self.cancel, &self.children)
    }
}

/// Progress callback for a run
///
/// Called from the coordinating thread only, never from task threads.
pub trait ProgressCallback {
    /// Called when a task is handed to its unit of execution
    fn on_task_start(&mut self, index: usize, description: &str);

    /// Called when a task reaches a terminal state
    fn on_task_complete(&mut self, index: usize, description: &str, status: TaskStatus);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_task_start(&mut self, _index: usize, _description: &str) {}
    fn on_task_complete(&mut self, _index: usize, _description: &str, _status: TaskStatus) {}
}
