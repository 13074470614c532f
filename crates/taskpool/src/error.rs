//! Error types for task execution.
//!
//! Task errors are plain values (cloneable, no live handles) so they can
//! cross the boundary between a task's unit of execution and the engine,
//! and be stored in results and re-raised afterwards.

use thiserror::Error;

/// Why a single task did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The operation returned an error
    #[error("{0}")]
    Operation(String),

    /// The validator rejected the operation's output
    #[error("output rejected by validator")]
    Validation,

    /// The validator itself raised
    #[error("validator raised: {0}")]
    ValidatorFailed(String),

    /// The operation panicked
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The engine could not start a unit of execution for the task
    #[error("failed to start task: {0}")]
    Spawn(String),

    /// The unit of execution ended without reporting a result
    #[error("task exited without reporting a result")]
    Lost,

    /// Stopped because a sibling task failed
    #[error("killed: another task failed")]
    Killed,

    /// Never started because an earlier task failed (serial mode)
    #[error("cancelled: prior task failed")]
    Cancelled,
}

impl TaskError {
    /// Whether this error was synthesized by the engine in response to
    /// another task's failure, rather than being a failure of its own.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Killed | Self::Cancelled)
    }
}

/// Errors returned by [`crate::run`] when failures are re-raised.
#[derive(Debug, Error)]
pub enum Error {
    /// The first task that failed, with its own error
    #[error("task {index} ({description}) failed: {source}")]
    TaskFailed {
        /// Position of the task in the input
        index: usize,
        /// Task description
        description: String,
        /// The task's own error
        #[source]
        source: TaskError,
    },
}

impl Error {
    /// The underlying task error
    pub fn task_error(&self) -> &TaskError {
        match self {
            Self::TaskFailed { source, .. } => source,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
