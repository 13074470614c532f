//! Units of work
//!
//! A [`Task`] bundles an opaque operation with the arguments it runs on and
//! an optional validator that gets the last word on whether the output is
//! acceptable. Arguments are owned values: nothing live is assumed to
//! survive the trip to the task's unit of execution.
//!
//! Threads cannot be killed from outside. When a run is cancelled, only work
//! that checks its [`TaskContext`] (`check_cancelled`, `sleep`) or runs
//! through [`TaskContext::run_command`] actually stops. Anything else keeps
//! running after its task has been recorded `Killed`, and its result is
//! discarded.

use crate::context::TaskContext;
use anyhow::Result;
use std::fmt;
use std::sync::Arc;

type Operation<A, O> = dyn Fn(&TaskContext, &A) -> Result<O> + Send + Sync;
type Validator<O> = dyn Fn(&O) -> Result<bool> + Send + Sync;

/// A unit of work for the engine
pub struct Task<A, O> {
    pub(crate) description: String,
    pub(crate) arguments: A,
    pub(crate) operation: Arc<Operation<A, O>>,
    pub(crate) validator: Option<Arc<Validator<O>>>,
}

impl<A, O> Task<A, O> {
    /// Create a task from an operation and its arguments
    pub fn new<F>(description: impl Into<String>, arguments: A, operation: F) -> Self
    where
        F: Fn(&TaskContext, &A) -> Result<O> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            arguments,
            operation: Arc::new(operation),
            validator: None,
        }
    }

    /// Attach a validator. Returning `Ok(false)` or an error fails the task
    /// even though the operation itself succeeded.
    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&O) -> Result<bool> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }
}

impl<A: fmt::Debug, O> fmt::Debug for Task<A, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("description", &self.description)
            .field("arguments", &self.arguments)
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}
