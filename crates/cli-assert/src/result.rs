//! The final, joined state of one command execution.

use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use crate::collector::{Collector, StreamTag};
use crate::consumer::ConsumerOutcome;
use crate::error::{AssertError, WaitTimeout};
use crate::exit_code::ExitCodeAssert;

/// Post-join assertion state, evaluated once by `assert_success()`.
pub(crate) struct Evaluation {
    pub stdout: Option<ConsumerOutcome>,
    pub stderr: Option<ConsumerOutcome>,
    pub producer_failures: Vec<String>,
    pub exit: ExitCodeAssert,
}

/// Everything known about a finished (or timed-out) execution.
///
/// `assert_success()` runs the composed assertion exactly once and is
/// idempotent; `assert_timeout()` checks the timeout sentinel.
#[derive(serde::Serialize)]
pub struct CommandResult {
    command: String,
    exit_code: i32,
    duration: Duration,
    stdout_bytes: u64,
    stderr_bytes: u64,
    timeout: Option<WaitTimeout>,
    #[serde(skip)]
    evaluation: Mutex<Option<Evaluation>>,
    #[serde(skip)]
    verdict: OnceLock<Option<String>>,
}

impl CommandResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        command: String,
        exit_code: i32,
        duration: Duration,
        stdout_bytes: u64,
        stderr_bytes: u64,
        timeout: Option<WaitTimeout>,
        evaluation: Evaluation,
    ) -> Self {
        Self {
            command,
            exit_code,
            duration,
            stdout_bytes,
            stderr_bytes,
            timeout,
            evaluation: Mutex::new(Some(evaluation)),
            verdict: OnceLock::new(),
        }
    }

    /// The canonical one-line rendering of the executed command.
    pub fn command_string(&self) -> &str {
        &self.command
    }

    /// The child's exit code, or −1 if the wait timed out.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Wall-clock time from spawn to wait-return.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Raw bytes drained from the child's stdout.
    pub fn stdout_byte_count(&self) -> u64 {
        self.stdout_bytes
    }

    /// Raw bytes drained from the child's stderr.
    pub fn stderr_byte_count(&self) -> u64 {
        self.stderr_bytes
    }

    pub fn timed_out(&self) -> bool {
        self.timeout.is_some()
    }

    pub fn timeout_error(&self) -> Option<&WaitTimeout> {
        self.timeout.as_ref()
    }

    /// Run the composed assertion: stdout, stderr, stdin, exit code, plus
    /// the timeout sentinel. Returns the aggregated report on failure.
    /// Re-calling produces the same outcome without re-evaluating.
    pub fn assert_success(&self) -> Result<&Self, AssertError> {
        let verdict = self.verdict.get_or_init(|| self.evaluate());
        match verdict {
            None => Ok(self),
            Some(report) => Err(AssertError::Failed {
                report: report.clone(),
            }),
        }
    }

    /// Succeeds iff the execution timed out.
    pub fn assert_timeout(&self) -> Result<&Self, AssertError> {
        if self.timeout.is_some() {
            Ok(self)
        } else {
            Err(AssertError::NotTimedOut {
                exit_code: self.exit_code,
            })
        }
    }

    fn evaluate(&self) -> Option<String> {
        let mut collector = Collector::new();
        let evaluation = self
            .evaluation
            .lock()
            .expect("evaluation lock poisoned")
            .take();
        if let Some(evaluation) = evaluation {
            if let Some(stdout) = evaluation.stdout {
                stdout.evaluate(StreamTag::Stdout, self.stdout_bytes, &mut collector);
            }
            if let Some(stderr) = evaluation.stderr {
                stderr.evaluate(StreamTag::Stderr, self.stderr_bytes, &mut collector);
            }
            for failure in evaluation.producer_failures {
                collector.failure(None, failure);
            }
            evaluation.exit.evaluate(&mut collector);
        }
        if let Some(timeout) = &self.timeout {
            collector.exception(None, timeout.to_string());
        }
        collector.render(&self.command)
    }
}

impl std::fmt::Debug for CommandResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandResult")
            .field("command", &self.command)
            .field("exit_code", &self.exit_code)
            .field("duration", &self.duration)
            .field("stdout_bytes", &self.stdout_bytes)
            .field("stderr_bytes", &self.stderr_bytes)
            .field("timed_out", &self.timeout.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "result_tests.rs"]
mod tests;
