//! # Taskpool
//!
//! Fail-fast execution of a small batch of independent tasks.
//!
//! Each [`Task`] carries an opaque operation, the arguments it runs on and
//! an optional validator. [`run`] executes a batch and returns one
//! [`TaskResult`] per task, in input order, no matter which finished first.
//!
//! ## Failure semantics
//!
//! - A task fails if its operation errors or panics, or if its validator
//!   rejects the output or errors itself.
//! - In parallel mode the first failure stops the run: no new task starts,
//!   running tasks are told to stop and their supervised subprocesses are
//!   killed, and the engine returns without waiting for them.
//! - In serial mode every task after the first failure is marked killed
//!   with a [`TaskError::Cancelled`] reason and never runs.
//! - With [`FailurePolicy::Raise`] the first failure's own error is
//!   returned; synthesized cancellations are never reported in its place.
//!
//! ## Example
//!
//! ```ignore
//! use taskpool::{RunOptions, Task, run};
//!
//! let tasks = vec![
//!     Task::new("build from", "old", |ctx, rev| compile(ctx, rev)),
//!     Task::new("build to", "new", |ctx, rev| compile(ctx, rev)),
//! ];
//! let results = run(tasks, &RunOptions::default())?;
//! ```
//!
//! Tasks that shell out should use [`TaskContext::run_command`] so the
//! engine can kill the subprocess when a sibling fails.

pub mod context;
pub mod error;
pub mod executor;
pub mod process;
pub mod task;
pub mod types;

// Re-export main types at crate root
pub use context::{CancelToken, NoProgress, ProgressCallback, TaskContext};
pub use error::{Error, Result, TaskError};
pub use executor::{Outcome, Scheduler, SerialScheduler, ThreadScheduler, run, run_with_progress};
pub use process::ChildRegistry;
pub use task::Task;
pub use types::{
    CommandOutput, ExecutionMode, FailurePolicy, RunOptions, RunSummary, TaskResult, TaskStatus,
};
