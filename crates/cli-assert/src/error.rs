//! Error types surfaced by the engine.

use std::time::Duration;

/// Errors that abort `start()` before or at spawn.
#[derive(thiserror::Error, Debug)]
pub enum StartError {
    #[error("executable not specified")]
    ExecutableNotSpecified,

    #[error("executable '{name}' not found on PATH")]
    ExecutableNotFound {
        name: String,
        #[source]
        source: which::Error,
    },

    #[error("cannot resolve the host executable")]
    CurrentExe(#[source] std::io::Error),

    #[error("stdin source already configured")]
    StdinAlreadyConfigured,

    #[error("cannot set stderr expectations while redirecting stderr to stdout")]
    StderrExpectationsWhileMerged,

    #[error("redirecting stderr to stdout is not supported on this platform")]
    MergeUnsupported,

    #[error("invalid pattern '{pattern}'")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown charset '{0}'")]
    UnknownCharset(String),

    #[error("failed to create worker pool")]
    Pool(#[source] std::io::Error),

    #[error("failed to open stdin pipe")]
    StdinPipe(#[source] std::io::Error),

    #[error("failed to spawn: {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Aggregated assertion verdict, thrown by `assert_success()` and
/// `assert_timeout()`.
#[derive(thiserror::Error, Debug)]
pub enum AssertError {
    /// The full report rendered by the failure collector.
    #[error("{report}")]
    Failed { report: String },

    #[error("Expected the command to time out but it completed with exit code {exit_code}")]
    NotTimedOut { exit_code: i32 },
}

/// Failure payload carried by a completed-as-failed line awaiter.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct AwaitFailure(pub(crate) String);

/// Errors returned by [`AwaitHandle::wait`](crate::AwaitHandle::wait).
#[derive(thiserror::Error, Debug)]
pub enum AwaitError {
    #[error("Awaiting {description} has not finished within {ms} ms")]
    Timeout { description: String, ms: u128 },

    #[error("Exception thrown when awaiting {description}")]
    Failed {
        description: String,
        #[source]
        source: AwaitFailure,
    },

    #[error("the stream ended before {description} matched")]
    StreamClosed { description: String },
}

/// Errors from configuring the process-wide worker pool.
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    #[error("pool already created")]
    AlreadyCreated,
}

/// `pid()` on a host that did not report one.
#[derive(thiserror::Error, Debug)]
pub enum PidError {
    #[error("PID is not available for this process")]
    Unsupported,
}

/// The sentinel attached to a result when `wait_with_timeout` expires.
#[derive(thiserror::Error, Debug, Clone, serde::Serialize)]
#[error("Command has not finished within {ms} ms: {command}")]
pub struct WaitTimeout {
    pub(crate) command: String,
    pub(crate) ms: u128,
}

impl WaitTimeout {
    pub(crate) fn new(command: &str, timeout: Duration) -> Self {
        Self {
            command: command.to_string(),
            ms: timeout.as_millis(),
        }
    }
}

/// Umbrella error for the one-call conveniences `execute()` and
/// `execute_with_timeout()`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Assert(#[from] AssertError),

    #[error("failed waiting for the child process")]
    Wait(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_executable_not_specified() {
        assert_eq!(
            StartError::ExecutableNotSpecified.to_string(),
            "executable not specified"
        );
    }

    #[test]
    fn test_display_stderr_conflict() {
        assert_eq!(
            StartError::StderrExpectationsWhileMerged.to_string(),
            "cannot set stderr expectations while redirecting stderr to stdout"
        );
    }

    #[test]
    fn test_display_await_timeout() {
        let err = AwaitError::Timeout {
            description: "line matching \"ready\"".into(),
            ms: 250,
        };
        assert_eq!(
            err.to_string(),
            "Awaiting line matching \"ready\" has not finished within 250 ms"
        );
    }

    #[test]
    fn test_display_await_failed_carries_cause() {
        let err = AwaitError::Failed {
            description: "port line".into(),
            source: AwaitFailure("invalid digit found in string".into()),
        };
        assert_eq!(err.to_string(), "Exception thrown when awaiting port line");
        let cause = std::error::Error::source(&err).expect("source");
        assert_eq!(cause.to_string(), "invalid digit found in string");
    }

    #[test]
    fn test_display_pool_already_created() {
        assert_eq!(PoolError::AlreadyCreated.to_string(), "pool already created");
    }

    #[test]
    fn test_display_wait_timeout() {
        let t = WaitTimeout::new("/bin/sleep 5", Duration::from_millis(200));
        assert_eq!(
            t.to_string(),
            "Command has not finished within 200 ms: /bin/sleep 5"
        );
    }

    #[test]
    fn test_errors_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StartError>();
        assert_send_sync::<AssertError>();
        assert_send_sync::<AwaitError>();
    }
}
