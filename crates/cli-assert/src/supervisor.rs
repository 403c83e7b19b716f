//! The live process: waiting, killing, and scope-exit cleanup.

use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::process::Child;
use tracing::{debug, warn};

use crate::config::AutoClose;
use crate::consumer::StreamConsumer;
use crate::error::{PidError, WaitTimeout};
use crate::exit_code::ExitCodeAssert;
use crate::pool::WorkerPool;
use crate::producer::InputProducer;
use crate::result::{CommandResult, Evaluation};

/// Poll granularity of `wait_with_timeout`.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A started command: the child process plus its workers.
///
/// Exactly one handle exists per spawn. Dropping the handle applies the
/// configured auto-close policy to a child that is still running.
#[derive(Debug)]
pub struct ProcessHandle {
    pub(crate) child: Child,
    pub(crate) pid: Option<u32>,
    pub(crate) started: Instant,
    pub(crate) command: String,
    pub(crate) stdout: StreamConsumer,
    pub(crate) stderr: Option<StreamConsumer>,
    pub(crate) producer: Option<InputProducer>,
    pub(crate) exit_assert: Option<ExitCodeAssert>,
    pub(crate) auto_close: AutoClose,
    pub(crate) closed: bool,
    pub(crate) waited: bool,
    /// Keeps a per-command pool alive for as long as its workers run.
    pub(crate) _pool: WorkerPool,
}

impl ProcessHandle {
    /// The canonical one-line rendering of the command.
    pub fn command_string(&self) -> &str {
        &self.command
    }

    /// The child's OS process id.
    pub fn pid(&self) -> Result<u32, PidError> {
        self.pid.ok_or(PidError::Unsupported)
    }

    /// Direct children of the child process, best-effort.
    pub fn children(&self) -> Vec<u32> {
        match self.pid {
            Some(pid) => process_tree(pid, false),
            None => Vec::new(),
        }
    }

    /// All descendants of the child process, best-effort.
    pub fn descendants(&self) -> Vec<u32> {
        match self.pid {
            Some(pid) => process_tree(pid, true),
            None => Vec::new(),
        }
    }

    /// Block until the child exits, join all workers, record the exit code
    /// and return the final result.
    pub async fn wait(&mut self) -> std::io::Result<CommandResult> {
        if self.waited {
            return Err(std::io::Error::other("command already waited on"));
        }
        let status = self.child.wait().await?;
        self.finish(status).await
    }

    /// Like [`wait`](Self::wait), but poll the child every
    /// `min(remaining, 100ms)`. On expiry the result carries exit code −1
    /// and a timeout sentinel; the workers are left running and the child
    /// alive (scope exit will clean both up).
    pub async fn wait_with_timeout(
        &mut self,
        timeout: Duration,
    ) -> std::io::Result<CommandResult> {
        if self.waited {
            return Err(std::io::Error::other("command already waited on"));
        }
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return self.finish(status).await;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(command = %self.command, ?timeout, "wait timed out");
                return Ok(CommandResult::new(
                    self.command.clone(),
                    -1,
                    self.started.elapsed(),
                    self.stdout.bytes_read(),
                    self.stderr.as_ref().map(StreamConsumer::bytes_read).unwrap_or(0),
                    Some(WaitTimeout::new(&self.command, timeout)),
                    Evaluation {
                        stdout: None,
                        stderr: None,
                        producer_failures: Vec::new(),
                        exit: self.exit_assert.take().unwrap_or_default(),
                    },
                ));
            }
            tokio::time::sleep(remaining.min(WAIT_POLL_INTERVAL)).await;
        }
    }

    async fn finish(&mut self, status: std::process::ExitStatus) -> std::io::Result<CommandResult> {
        self.waited = true;
        self.closed = true;
        let exit_code = exit_code_of(status);
        let stdout_outcome = self.stdout.join().await;
        let stderr_outcome = match self.stderr.as_mut() {
            Some(consumer) => consumer.join().await,
            None => None,
        };
        let producer_failures = match self.producer.as_mut() {
            Some(producer) => producer.join().await,
            None => Vec::new(),
        };
        let mut exit_assert = self.exit_assert.take().unwrap_or_default();
        exit_assert.record(exit_code);
        debug!(
            command = %self.command,
            exit_code,
            stdout_lines = stdout_outcome.as_ref().map(|o| o.total_lines()),
            stderr_lines = stderr_outcome.as_ref().map(|o| o.total_lines()),
            "command finished"
        );
        Ok(CommandResult::new(
            self.command.clone(),
            exit_code,
            self.started.elapsed(),
            self.stdout.bytes_read(),
            self.stderr.as_ref().map(StreamConsumer::bytes_read).unwrap_or(0),
            None,
            Evaluation {
                stdout: stdout_outcome,
                stderr: stderr_outcome,
                producer_failures,
                exit: exit_assert,
            },
        ))
    }

    /// Cancel the workers (stdout, stderr, stdin, in that order) and destroy
    /// the process. Idempotent; never raises.
    pub fn kill(&mut self, forcibly: bool, with_descendants: bool) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stdout.cancel();
        if let Some(consumer) = self.stderr.as_mut() {
            consumer.cancel();
        }
        if let Some(producer) = self.producer.as_mut() {
            producer.cancel();
        }
        let descendants = if with_descendants {
            self.pid.map(|pid| process_tree(pid, true)).unwrap_or_default()
        } else {
            Vec::new()
        };
        kill_child(&mut self.child, self.pid, forcibly);
        if !descendants.is_empty() {
            kill_processes(&descendants, forcibly);
        }
    }

    /// Apply the configured auto-close policy: kill, then reap (bounded by
    /// the auto-close timeout when one is set).
    pub async fn close(&mut self) {
        if self.waited {
            return;
        }
        let forcibly = self.auto_close.forcibly;
        let with_descendants = self.auto_close.with_descendants;
        let timeout = self.auto_close.timeout;
        self.kill(forcibly, with_descendants);
        let reaped = match timeout {
            Some(timeout) => self.wait_with_timeout(timeout).await,
            None => self.wait().await,
        };
        if let Err(error) = reaped {
            warn!(command = %self.command, %error, "failed reaping the child on close");
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.waited {
            return;
        }
        // Synchronous best-effort: cancel workers and signal the process
        // tree; kill_on_drop force-kills and reaps whatever is left.
        debug!(command = %self.command, "scope exit with a live child");
        self.kill(self.auto_close.forcibly, self.auto_close.with_descendants);
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

fn kill_child(child: &mut Child, pid: Option<u32>, forcibly: bool) {
    if forcibly {
        if let Err(error) = child.start_kill() {
            debug!(%error, "force-kill failed (child probably already gone)");
        }
        return;
    }
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            // SAFETY: kill() with SIGTERM is async-signal-safe.
            let rc = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
            if rc != 0 {
                debug!(pid, "SIGTERM failed (child probably already gone)");
            }
            return;
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        warn!("graceful termination is not supported on this platform; killing forcibly");
    }
    if let Err(error) = child.start_kill() {
        debug!(%error, "kill failed (child probably already gone)");
    }
}

/// Signal each of `pids`, best-effort. Logs and stops if the host cannot
/// signal processes this way.
fn kill_processes(pids: &[u32], forcibly: bool) {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);
    let signal = if forcibly {
        sysinfo::Signal::Kill
    } else {
        sysinfo::Signal::Term
    };
    for pid in pids {
        let Some(process) = sys.process(Pid::from_u32(*pid)) else {
            continue;
        };
        match process.kill_with(signal) {
            Some(true) => {}
            Some(false) => debug!(pid, "descendant already gone"),
            None => {
                warn!("descendant signalling is not supported on this host; killing the direct child only");
                return;
            }
        }
    }
}

/// Enumerate children (or the whole descendant tree) of `root`.
fn process_tree(root: u32, recursive: bool) -> Vec<u32> {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);
    let mut result = Vec::new();
    let mut frontier = vec![Pid::from_u32(root)];
    while let Some(parent) = frontier.pop() {
        for (pid, process) in sys.processes() {
            if process.parent() == Some(parent) {
                result.push(pid.as_u32());
                if recursive {
                    frontier.push(*pid);
                }
            }
        }
    }
    result
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
