//! Fluent assertions and orchestration for end-to-end testing of
//! command-line programs.
//!
//! Describe a command (executable, arguments, environment, working
//! directory, stdin source, stream expectations), start it, optionally
//! interact with it while it runs, and collect a single aggregated verdict
//! covering exit code, byte counts, line-level predicates and any worker
//! errors.
//!
//! ```no_run
//! use cli_assert::CmdAssert;
//!
//! # async fn demo() -> Result<(), cli_assert::Error> {
//! CmdAssert::command("echo", ["Hello Joe"])
//!     .stdout(|s| s.has_lines(["Hello Joe"]).has_line_count(1))
//!     .execute()
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Interactive runs return a [`ProcessHandle`]; line awaiters turn "the
//! first line matching …" into a typed value:
//!
//! ```no_run
//! use std::time::Duration;
//! use cli_assert::{CmdAssert, line_matching};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (cmd, port) = CmdAssert::command("server", ["--ephemeral"])
//!     .stdout_awaits(line_matching(r"listening on port: (\d+)").try_map(|s| s.parse::<u16>()));
//! let mut handle = cmd.start().await?;
//! let port = port.wait(Duration::from_secs(10)).await?;
//! // … talk to the server on `port` …
//! handle.kill(false, true);
//! handle.wait().await?;
//! # Ok(())
//! # }
//! ```

mod awaiter;
mod capture;
mod cmdline;
mod collector;
mod config;
mod consumer;
mod engine;
mod error;
mod exit_code;
mod line_assert;
mod pool;
mod producer;
mod result;
mod stream_expect;
mod supervisor;

pub use awaiter::{Awaited, AwaitHandle, line_matching, line_that};
pub use capture::CapturePolicy;
pub use collector::{Collector, StreamTag};
pub use config::CmdAssert;
pub use error::{
    AssertError, AwaitError, AwaitFailure, Error, PidError, PoolError, StartError, WaitTimeout,
};
pub use line_assert::LineAssert;
pub use pool::{PoolConfig, WorkerPool, configure_shared_pool};
pub use producer::{StdinSink, is_sink_cancelled};
pub use result::CommandResult;
pub use stream_expect::StreamExpect;
pub use supervisor::ProcessHandle;
