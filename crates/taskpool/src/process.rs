//! Supervised subprocesses
//!
//! Tasks that shell out get OS-level isolation for free; the engine only
//! needs to be able to stop them. Every child started through
//! [`crate::TaskContext::run_command`] is registered here so a failing
//! sibling can kill it. On unix the child leads its own process group and
//! the whole group is signalled, so grandchildren die with it.

use crate::context::{CANCEL_POLL, CancelToken};
use crate::error::TaskError;
use crate::types::CommandOutput;
use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Children started by the tasks of one run
#[derive(Debug, Default)]
pub struct ChildRegistry {
    children: Mutex<Vec<Arc<Mutex<Child>>>>,
}

impl ChildRegistry {
    fn register(&self, child: Child) -> Arc<Mutex<Child>> {
        let child = Arc::new(Mutex::new(child));
        lock(&self.children).push(Arc::clone(&child));
        child
    }

    /// Kill every registered child that is still running.
    ///
    /// Returns how many children were signalled.
    pub fn kill_all(&self) -> usize {
        let children = lock(&self.children).clone();
        children
            .iter()
            .filter(|child| terminate(&mut lock(child)))
            .count()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Kill a child unless it has already exited. Returns true if signalled.
fn terminate(child: &mut Child) -> bool {
    // Holding the lock means the owning task cannot reap the child under
    // us, so an unexited child's pid is still ours to signal.
    if let Ok(Some(_)) = child.try_wait() {
        return false;
    }

    #[cfg(unix)]
    {
        let pgid = child.id() as libc::pid_t;
        // SAFETY: kill(2) has no memory-safety preconditions; the target is
        // the process group created for this unreaped child.
        let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
        if rc != 0 {
            log::debug!(
                "Signalling process group {} failed: {}",
                pgid,
                std::io::Error::last_os_error()
            );
        }
    }

    if let Err(e) = child.kill() {
        log::warn!("Could not kill pid {} (already exited?): {}", child.id(), e);
    }
    true
}

fn spawn_reader<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf) {
            log::debug!("Reading subprocess output failed: {}", e);
        }
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Run `command` to completion, killing it if `cancel` is raised.
pub(crate) fn run_supervised(
    mut command: Command,
    cancel: &CancelToken,
    registry: &ChildRegistry,
) -> Result<CommandOutput> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let program = command.get_program().to_string_lossy().to_string();
    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to execute: {program}"))?;
    log::debug!("Started {} (pid {})", program, child.id());

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);
    let child = registry.register(child);

    let status = loop {
        {
            let mut guard = lock(&child);
            if let Some(status) = guard
                .try_wait()
                .with_context(|| format!("Failed to wait for {program}"))?
            {
                break status;
            }
            if cancel.is_cancelled() {
                terminate(&mut guard);
            }
        }
        thread::sleep(CANCEL_POLL);
    };

    let stdout = collect(stdout);
    let stderr = collect(stderr);

    if cancel.is_cancelled() && !status.success() {
        return Err(TaskError::Killed.into());
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        code: status.code(),
        success: status.success(),
    })
}
