//! `start()`: resolve the configuration, spawn the child and wire the
//! workers; plus the one-call conveniences.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::cmdline::CmdLine;
use crate::collector::StreamTag;
use crate::config::{CmdAssert, PoolChoice};
use crate::consumer::StreamConsumer;
use crate::error::{Error, StartError};
use crate::exit_code::ExitCodeAssert;
use crate::pool::{WorkerPool, next_start_index};
use crate::producer::InputProducer;
use crate::result::CommandResult;
use crate::supervisor::ProcessHandle;

impl CmdAssert {
    /// Spawn the child and start its workers.
    ///
    /// Deferred configuration errors surface here, before anything is
    /// spawned.
    pub async fn start(self) -> Result<ProcessHandle, StartError> {
        let CmdAssert {
            exe,
            args,
            env,
            cwd,
            merge_stderr,
            stdin,
            mut stdout,
            mut stderr,
            exit,
            auto_close,
            pool,
            error,
        } = self;

        if let Some(error) = error {
            return Err(error);
        }
        if let Some(error) = stdout.error.take() {
            return Err(error);
        }
        if let Some(error) = stderr.error.take() {
            return Err(error);
        }
        if merge_stderr && stderr.touched {
            return Err(StartError::StderrExpectationsWhileMerged);
        }
        #[cfg(not(unix))]
        if merge_stderr {
            return Err(StartError::MergeUnsupported);
        }

        let resolved = exe.resolve()?;
        let command = CmdLine {
            cwd: cwd.as_deref(),
            env: &env,
            exe: &resolved,
            args: &args,
            merge_stderr,
            stdout_redirect: stdout.redirect_path(),
            stderr_redirect: stderr.redirect_path(),
        }
        .render();

        let index = next_start_index();
        let pool = match pool {
            PoolChoice::Shared => WorkerPool::shared(),
            PoolChoice::Local(config) => WorkerPool::local(config).map_err(StartError::Pool)?,
            PoolChoice::External(handle) => WorkerPool::external(handle),
        };

        let mut cmd = Command::new(&resolved);
        cmd.args(&args).kill_on_drop(true).stdout(Stdio::piped());
        for (name, value) in &env {
            cmd.env(name, value);
        }
        if let Some(dir) = &cwd {
            cmd.current_dir(dir);
        }
        cmd.stderr(if merge_stderr {
            Stdio::null()
        } else {
            Stdio::piped()
        });
        let stdin_writer = if stdin.is_some() {
            let (reader, writer) = os_pipe::pipe().map_err(StartError::StdinPipe)?;
            cmd.stdin(Stdio::from(reader));
            Some(writer)
        } else {
            cmd.stdin(Stdio::null());
            None
        };

        // Own process group; optionally wire fd 2 onto the stdout pipe.
        // SAFETY: setsid() and dup2() are async-signal-safe, pre-exec only.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(move || {
                libc::setsid();
                if merge_stderr && libc::dup2(1, 2) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        debug!(%command, "spawning");
        let mut child = cmd.spawn().map_err(|source| StartError::Spawn {
            command: command.clone(),
            source,
        })?;
        let pid = child.id();
        let started = Instant::now();

        let stdout_source = child.stdout.take().ok_or_else(|| StartError::Spawn {
            command: command.clone(),
            source: std::io::Error::other("stdout pipe unavailable"),
        })?;
        let stdout_consumer = StreamConsumer::start(
            &pool,
            stdout_source,
            stdout.into_consumer_config(StreamTag::Stdout, format!("cli-assert-io-{index}-stdout")),
        );

        let stderr_consumer = if merge_stderr {
            None
        } else {
            let stderr_source = child.stderr.take().ok_or_else(|| StartError::Spawn {
                command: command.clone(),
                source: std::io::Error::other("stderr pipe unavailable"),
            })?;
            Some(StreamConsumer::start(
                &pool,
                stderr_source,
                stderr.into_consumer_config(
                    StreamTag::Stderr,
                    format!("cli-assert-io-{index}-stderr"),
                ),
            ))
        };

        let producer = match (stdin, stdin_writer) {
            (Some(source), Some(writer)) => Some(InputProducer::start(
                &pool,
                writer,
                source,
                format!("cli-assert-io-{index}-stdin"),
            )),
            _ => None,
        };

        Ok(ProcessHandle {
            child,
            pid,
            started,
            command,
            stdout: stdout_consumer,
            stderr: stderr_consumer,
            producer,
            exit_assert: Some(ExitCodeAssert::new(exit)),
            auto_close,
            closed: false,
            waited: false,
            _pool: pool,
        })
    }

    /// Start, wait and assert success in one call.
    pub async fn execute(self) -> Result<CommandResult, Error> {
        let mut handle = self.start().await?;
        let result = handle.wait().await?;
        result.assert_success()?;
        Ok(result)
    }

    /// Start and wait with a command-level timeout. The result is returned
    /// unasserted: follow up with `assert_success()` or `assert_timeout()`.
    pub async fn execute_with_timeout(
        self,
        timeout: Duration,
    ) -> Result<CommandResult, Error> {
        let mut handle = self.start().await?;
        Ok(handle.wait_with_timeout(timeout).await?)
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
