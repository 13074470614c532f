//! Execution engine - runs tasks with fail-fast cancellation
//!
//! Two backends share one contract ([`Scheduler`]): [`ThreadScheduler`]
//! gives every task its own thread and reports back over a channel;
//! [`SerialScheduler`] runs tasks one after another. Either way the
//! result at index `i` belongs to the task at index `i`.

use crate::context::{CancelToken, NoProgress, ProgressCallback, TaskContext};
use crate::error::{Error, Result, TaskError};
use crate::process::ChildRegistry;
use crate::task::Task;
use crate::types::{ExecutionMode, FailurePolicy, RunOptions, TaskResult, TaskStatus};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Results of a run plus which task failed first, if any
#[derive(Debug)]
pub struct Outcome<A, O> {
    pub results: Vec<TaskResult<A, O>>,
    /// Index of the failure that stopped the run
    pub first_failure: Option<usize>,
}

/// A scheduling backend
pub trait Scheduler {
    fn execute<A, O, P>(&self, tasks: Vec<Task<A, O>>, progress: &mut P) -> Outcome<A, O>
    where
        A: Clone + Send + 'static,
        O: Send + 'static,
        P: ProgressCallback;
}

/// Run tasks with the given options
///
/// With [`FailurePolicy::Raise`] the first failure's own error is returned
/// after every result has been recorded; with [`FailurePolicy::Collect`]
/// the results are always returned.
pub fn run<A, O>(tasks: Vec<Task<A, O>>, opts: &RunOptions) -> Result<Vec<TaskResult<A, O>>>
where
    A: Clone + Send + 'static,
    O: Send + 'static,
{
    run_with_progress(tasks, opts, &mut NoProgress)
}

/// Run tasks, reporting progress to a callback
pub fn run_with_progress<A, O, P>(
    tasks: Vec<Task<A, O>>,
    opts: &RunOptions,
    progress: &mut P,
) -> Result<Vec<TaskResult<A, O>>>
where
    A: Clone + Send + 'static,
    O: Send + 'static,
    P: ProgressCallback,
{
    let outcome = match opts.mode {
        ExecutionMode::Parallel => {
            ThreadScheduler::new(opts.poll_interval).execute(tasks, progress)
        }
        ExecutionMode::Serial => SerialScheduler.execute(tasks, progress),
    };

    if opts.on_failure == FailurePolicy::Raise
        && let Some(index) = outcome.first_failure
    {
        let failed = &outcome.results[index];
        return Err(Error::TaskFailed {
            index,
            description: failed.description.clone(),
            source: failed.error.clone().unwrap_or(TaskError::Lost),
        });
    }

    Ok(outcome.results)
}

/// Run the operation and validator of one task, containing panics.
fn execute_one<A, O>(task: &Task<A, O>, ctx: &TaskContext) -> std::result::Result<O, TaskError> {
    let output = match panic::catch_unwind(AssertUnwindSafe(|| {
        (task.operation)(ctx, &task.arguments)
    })) {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(match e.downcast_ref::<TaskError>() {
                Some(task_error) => task_error.clone(),
                None => TaskError::Operation(format!("{e:#}")),
            });
        }
        Err(payload) => return Err(TaskError::Panicked(panic_message(payload.as_ref()))),
    };

    if let Some(validator) = &task.validator {
        match panic::catch_unwind(AssertUnwindSafe(|| validator(&output))) {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => return Err(TaskError::Validation),
            Ok(Err(e)) => return Err(TaskError::ValidatorFailed(format!("{e:#}"))),
            Err(payload) => {
                return Err(TaskError::ValidatorFailed(panic_message(payload.as_ref())));
            }
        }
    }

    Ok(output)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn to_result<A, O>(
    description: String,
    arguments: A,
    result: std::result::Result<O, TaskError>,
) -> TaskResult<A, O> {
    match result {
        Ok(output) => TaskResult::succeeded(description, arguments, output),
        Err(error) => TaskResult::from_error(description, arguments, error),
    }
}

/// One thread per task, fail-fast
#[derive(Debug, Clone)]
pub struct ThreadScheduler {
    poll_interval: Duration,
}

impl ThreadScheduler {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new(RunOptions::default().poll_interval)
    }
}

type Message<O> = (usize, std::result::Result<O, TaskError>);

/// Per-run bookkeeping for the thread backend
struct Run<'p, A, O, P> {
    meta: Vec<(String, A)>,
    done: Vec<Option<TaskResult<A, O>>>,
    handles: Vec<Option<JoinHandle<()>>>,
    first_failure: Option<usize>,
    progress: &'p mut P,
}

impl<A: Clone, O, P: ProgressCallback> Run<'_, A, O, P> {
    /// Record a task's result; the first genuine failure stops the run
    fn record(&mut self, index: usize, result: std::result::Result<O, TaskError>) {
        if self.done[index].is_some() {
            return;
        }
        let (description, arguments) = self.meta[index].clone();
        let result = to_result(description, arguments, result);
        log::debug!("Task {} ({}) finished: {:?}", index, result.description, result.status);
        self.progress
            .on_task_complete(index, &result.description, result.status);
        if result.status == TaskStatus::Failed && self.first_failure.is_none() {
            self.first_failure = Some(index);
        }
        self.done[index] = Some(result);
    }

    fn awaiting(&self) -> bool {
        self.handles
            .iter()
            .zip(&self.done)
            .any(|(handle, done)| handle.is_some() && done.is_none())
    }

    fn drain(&mut self, rx: &Receiver<Message<O>>) {
        while let Ok((index, result)) = rx.try_recv() {
            self.record(index, result);
        }
    }

    /// Units that ended without reporting are failures
    fn reap_lost(&mut self, rx: &Receiver<Message<O>>) {
        let finished: Vec<usize> = self
            .handles
            .iter()
            .enumerate()
            .filter(|(i, h)| {
                self.done[*i].is_none() && h.as_ref().is_some_and(JoinHandle::is_finished)
            })
            .map(|(i, _)| i)
            .collect();
        // A unit sends before it exits, so its message is already queued
        self.drain(rx);
        for index in finished {
            self.record(index, Err(TaskError::Lost));
        }
    }

    fn into_outcome(self) -> Outcome<A, O> {
        let Self {
            meta,
            done,
            first_failure,
            progress,
            ..
        } = self;
        let results = meta
            .into_iter()
            .zip(done)
            .enumerate()
            .map(|(index, ((description, arguments), done))| {
                done.unwrap_or_else(|| {
                    progress.on_task_complete(index, &description, TaskStatus::Killed);
                    TaskResult::from_error(description, arguments, TaskError::Killed)
                })
            })
            .collect();
        Outcome {
            results,
            first_failure,
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn execute<A, O, P>(&self, tasks: Vec<Task<A, O>>, progress: &mut P) -> Outcome<A, O>
    where
        A: Clone + Send + 'static,
        O: Send + 'static,
        P: ProgressCallback,
    {
        let count = tasks.len();
        let mut run = Run {
            meta: tasks
                .iter()
                .map(|t| (t.description.clone(), t.arguments.clone()))
                .collect(),
            done: (0..count).map(|_| None).collect(),
            handles: (0..count).map(|_| None).collect(),
            first_failure: None,
            progress,
        };

        let (tx, rx) = mpsc::channel::<Message<O>>();
        let cancel = CancelToken::new();
        let children = Arc::new(ChildRegistry::default());

        for (index, task) in tasks.into_iter().enumerate() {
            // No new task starts once one has failed
            run.drain(&rx);
            if run.first_failure.is_some() {
                break;
            }

            let ctx = TaskContext::new(index, cancel.clone(), Arc::clone(&children));
            let tx = tx.clone();
            run.progress.on_task_start(index, &task.description);
            let spawned = thread::Builder::new()
                .name(format!("task-{index}"))
                .spawn(move || {
                    let result = execute_one(&task, &ctx);
                    // The engine may already have returned; nobody to tell
                    let _ = tx.send((index, result));
                });

            match spawned {
                Ok(handle) => run.handles[index] = Some(handle),
                Err(e) => run.record(index, Err(TaskError::Spawn(e.to_string()))),
            }
        }
        drop(tx);

        while run.first_failure.is_none() && run.awaiting() {
            match rx.recv_timeout(self.poll_interval) {
                Ok((index, result)) => run.record(index, result),
                Err(RecvTimeoutError::Timeout) => run.reap_lost(&rx),
                Err(RecvTimeoutError::Disconnected) => {
                    for index in 0..count {
                        if run.handles[index].is_some() {
                            run.record(index, Err(TaskError::Lost));
                        }
                    }
                }
            }
        }

        if let Some(failed) = run.first_failure {
            cancel.cancel();
            let killed = children.kill_all();
            log::debug!(
                "Task {} failed; cancelled run and killed {} subprocesses",
                failed,
                killed
            );
            // Keep whatever already completed
            run.drain(&rx);
        }

        // Unfinished threads are detached, never joined
        run.into_outcome()
    }
}

/// One task at a time, in order
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialScheduler;

impl Scheduler for SerialScheduler {
    fn execute<A, O, P>(&self, tasks: Vec<Task<A, O>>, progress: &mut P) -> Outcome<A, O>
    where
        A: Clone + Send + 'static,
        O: Send + 'static,
        P: ProgressCallback,
    {
        let cancel = CancelToken::new();
        let children = Arc::new(ChildRegistry::default());
        let mut results = Vec::with_capacity(tasks.len());
        let mut first_failure = None;

        for (index, task) in tasks.into_iter().enumerate() {
            let result = if first_failure.is_some() {
                TaskResult::from_error(task.description, task.arguments, TaskError::Cancelled)
            } else {
                progress.on_task_start(index, &task.description);
                let ctx = TaskContext::new(index, cancel.clone(), Arc::clone(&children));
                let outcome = execute_one(&task, &ctx);
                to_result(task.description, task.arguments, outcome)
            };

            if result.status == TaskStatus::Failed {
                first_failure = Some(index);
            }
            progress.on_task_complete(index, &result.description, result.status);
            results.push(result);
        }

        Outcome {
            results,
            first_failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    fn collect_opts(mode: ExecutionMode) -> RunOptions {
        RunOptions {
            mode,
            on_failure: FailurePolicy::Collect,
            poll_interval: Duration::from_millis(10),
        }
    }

    fn ok_task(n: u32) -> Task<u32, u32> {
        Task::new(format!("double {n}"), n, |_, n| Ok(n * 2))
    }

    fn failing_task() -> Task<u32, u32> {
        Task::new("fail", 0, |_, _| anyhow::bail!("boom"))
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<(usize, Option<TaskStatus>)>,
    }

    impl ProgressCallback for Recorder {
        fn on_task_start(&mut self, index: usize, _description: &str) {
            self.events.push((index, None));
        }

        fn on_task_complete(&mut self, index: usize, _description: &str, status: TaskStatus) {
            self.events.push((index, Some(status)));
        }
    }

    #[test]
    fn test_parallel_all_succeed_in_input_order() {
        let tasks: Vec<Task<u64, u64>> = (0..8u64)
            .map(|i| {
                Task::new(format!("t{i}"), i, |ctx, i| {
                    // Later tasks finish first
                    ctx.sleep(Duration::from_millis(80 - i * 10))?;
                    Ok(i * 10)
                })
            })
            .collect();
        let results = run(tasks, &collect_opts(ExecutionMode::Parallel)).unwrap();
        assert_eq!(results.len(), 8);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.status, TaskStatus::Succeeded);
            assert_eq!(result.output, Some(i as u64 * 10));
            assert_eq!(result.arguments, i as u64);
            assert!(result.error.is_none());
        }
    }

    #[test]
    fn test_parallel_fail_fast_stops_checking_worker() {
        let side_effect = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&side_effect);

        let tasks: Vec<Task<u32, u32>> = vec![
            ok_task(1),
            Task::new("fail", 2, |ctx, _| {
                // Let the first task report before failing
                ctx.sleep(Duration::from_millis(50))?;
                anyhow::bail!("compile error")
            }),
            Task::new("worker", 3, move |ctx, _| {
                // Chunked work that checks for cancellation between steps
                for _ in 0..30 {
                    thread::sleep(Duration::from_millis(10));
                    ctx.check_cancelled()?;
                }
                flag.store(true, Ordering::SeqCst);
                Ok(0)
            }),
        ];

        let started = Instant::now();
        let results = run(tasks, &collect_opts(ExecutionMode::Parallel)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));

        assert_eq!(results[0].status, TaskStatus::Succeeded);
        assert_eq!(results[0].output, Some(2));
        assert_eq!(results[1].status, TaskStatus::Failed);
        assert_eq!(
            results[1].error,
            Some(TaskError::Operation("compile error".into()))
        );
        assert_eq!(results[2].status, TaskStatus::Killed);
        assert_eq!(results[2].error, Some(TaskError::Killed));
        // Outlive the worker's full 300ms of work
        thread::sleep(Duration::from_millis(500));
        assert!(!side_effect.load(Ordering::SeqCst));
    }

    #[test]
    fn test_parallel_cancellation_reaches_cooperative_task() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let tasks: Vec<Task<u32, u32>> = vec![
            Task::new("slow", 0, move |ctx, _| {
                ctx.sleep(Duration::from_secs(60))?;
                flag.store(true, Ordering::SeqCst);
                Ok(0)
            }),
            Task::new("fail", 1, |ctx, _| {
                ctx.sleep(Duration::from_millis(50))?;
                anyhow::bail!("late failure")
            }),
        ];
        let results = run(tasks, &collect_opts(ExecutionMode::Parallel)).unwrap();
        assert_eq!(results[0].status, TaskStatus::Killed);
        assert_eq!(results[1].status, TaskStatus::Failed);
        thread::sleep(Duration::from_millis(100));
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[cfg(unix)]
    #[test]
    fn test_parallel_kills_subprocess_of_running_task() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("written");
        let script = format!("sleep 1; touch {}", marker.display());

        let tasks: Vec<Task<String, bool>> = vec![
            Task::new("shell", script, |ctx, script| {
                let mut cmd = std::process::Command::new("sh");
                cmd.args(["-c", script]);
                Ok(ctx.run_command(cmd)?.success)
            }),
            Task::new("fail", String::new(), |ctx, _| {
                ctx.sleep(Duration::from_millis(200))?;
                anyhow::bail!("nope")
            }),
        ];

        let started = Instant::now();
        let results = run(tasks, &collect_opts(ExecutionMode::Parallel)).unwrap();
        assert!(started.elapsed() < Duration::from_millis(900));
        assert_eq!(results[0].status, TaskStatus::Killed);

        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists());
    }

    #[test]
    fn test_validator_false_is_failure() {
        let task = ok_task(2).with_validator(|_| Ok(false));
        let results = run(vec![task], &collect_opts(ExecutionMode::Parallel)).unwrap();
        assert_eq!(results[0].status, TaskStatus::Failed);
        assert_eq!(results[0].error, Some(TaskError::Validation));
        assert!(results[0].output.is_none());
    }

    #[test]
    fn test_raising_validator_is_failure() {
        let task = ok_task(2).with_validator(|_| anyhow::bail!("bad catalog"));
        let results = run(vec![task], &collect_opts(ExecutionMode::Serial)).unwrap();
        assert_eq!(results[0].status, TaskStatus::Failed);
        assert_eq!(
            results[0].error,
            Some(TaskError::ValidatorFailed("bad catalog".into()))
        );
    }

    #[test]
    fn test_validator_sees_output() {
        let task = ok_task(21).with_validator(|out| Ok(*out == 42));
        let results = run(vec![task], &collect_opts(ExecutionMode::Parallel)).unwrap();
        assert!(results[0].is_success());
    }

    #[test]
    fn test_panic_is_contained() {
        let tasks: Vec<Task<u32, u32>> = vec![
            Task::new("panics", 0, |_, _| panic!("kaboom")),
            ok_task(1),
        ];
        let results = run(tasks, &collect_opts(ExecutionMode::Serial)).unwrap();
        assert_eq!(
            results[0].error,
            Some(TaskError::Panicked("kaboom".into()))
        );
        assert_eq!(results[1].error, Some(TaskError::Cancelled));
    }

    #[test]
    fn test_serial_cancels_remaining() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let tasks: Vec<Task<u32, u32>> = vec![
            ok_task(1),
            failing_task(),
            Task::new("never", 3, move |_, n| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(*n)
            }),
        ];
        let mut recorder = Recorder::default();
        let results =
            run_with_progress(tasks, &collect_opts(ExecutionMode::Serial), &mut recorder).unwrap();

        assert_eq!(results[0].status, TaskStatus::Succeeded);
        assert_eq!(results[1].status, TaskStatus::Failed);
        assert_eq!(results[2].status, TaskStatus::Killed);
        assert_eq!(results[2].error, Some(TaskError::Cancelled));
        assert_eq!(results[2].arguments, 3);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        // The cancelled task never started
        assert!(!recorder.events.contains(&(2, None)));
        assert!(recorder.events.contains(&(2, Some(TaskStatus::Killed))));
    }

    #[test]
    fn test_serial_runs_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let tasks: Vec<Task<u32, ()>> = (0..4)
            .map(|i| {
                let order = Arc::clone(&order);
                Task::new(format!("t{i}"), i, move |_, i| {
                    order.lock().unwrap().push(*i);
                    Ok(())
                })
            })
            .collect();
        run(tasks, &collect_opts(ExecutionMode::Serial)).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_raise_policy_returns_first_failure() {
        for mode in [ExecutionMode::Parallel, ExecutionMode::Serial] {
            let opts = RunOptions {
                mode,
                ..RunOptions::default()
            };
            let err = run(vec![ok_task(1), failing_task()], &opts).unwrap_err();
            match err {
                Error::TaskFailed {
                    index,
                    description,
                    source,
                } => {
                    assert_eq!(index, 1);
                    assert_eq!(description, "fail");
                    assert_eq!(source, TaskError::Operation("boom".into()));
                    assert!(!source.is_cancellation());
                }
            }
        }
    }

    #[test]
    fn test_raise_policy_ok_without_failures() {
        let results = run(vec![ok_task(1), ok_task(2)], &RunOptions::default()).unwrap();
        assert!(results.iter().all(TaskResult::is_success));
    }

    #[test]
    fn test_empty_run() {
        let results: Vec<TaskResult<u32, u32>> =
            run(Vec::new(), &RunOptions::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_error_chain_preserved() {
        let task: Task<u32, u32> = Task::new("ctx", 0, |_, _| {
            Err(anyhow::anyhow!("root cause")).map_err(|e| e.context("while building"))
        });
        let results = run(vec![task], &collect_opts(ExecutionMode::Parallel)).unwrap();
        assert_eq!(
            results[0].error,
            Some(TaskError::Operation("while building: root cause".into()))
        );
    }
}
