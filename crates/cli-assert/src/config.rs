//! The fluent command configuration consumed by `start()`.

use std::path::PathBuf;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::error::StartError;
use crate::exit_code::ExitCodeExpect;
use crate::pool::PoolConfig;
use crate::producer::{StdinSink, StdinSource};
use crate::stream_expect::StreamExpect;

/// How the executable is found at `start()`.
#[derive(Debug, Clone)]
pub(crate) enum ExeResolver {
    Unset,
    Path(PathBuf),
    Lookup(String),
    CurrentExe,
}

impl ExeResolver {
    pub(crate) fn resolve(&self) -> Result<PathBuf, StartError> {
        match self {
            ExeResolver::Unset => Err(StartError::ExecutableNotSpecified),
            ExeResolver::Path(path) => Ok(path.clone()),
            ExeResolver::Lookup(name) => which::which(name).map_err(|source| {
                StartError::ExecutableNotFound {
                    name: name.clone(),
                    source,
                }
            }),
            ExeResolver::CurrentExe => std::env::current_exe().map_err(StartError::CurrentExe),
        }
    }
}

/// What happens to a still-running child when its handle goes out of scope.
#[derive(Debug, Clone)]
pub(crate) struct AutoClose {
    pub forcibly: bool,
    pub with_descendants: bool,
    pub timeout: Option<Duration>,
}

impl Default for AutoClose {
    fn default() -> Self {
        Self {
            forcibly: false,
            with_descendants: true,
            timeout: None,
        }
    }
}

/// Where the command's workers run.
#[derive(Debug, Clone, Default)]
pub(crate) enum PoolChoice {
    #[default]
    Shared,
    Local(PoolConfig),
    External(Handle),
}

/// Immutable configuration of one command under test.
///
/// Every builder method takes and returns the value; the configuration is
/// consumed by [`start()`](CmdAssert::start). Configuration mistakes
/// (conflicting stdin sources, bad patterns, stderr expectations on a merged
/// stderr) are deferred and reported by `start()`.
pub struct CmdAssert {
    pub(crate) exe: ExeResolver,
    pub(crate) args: Vec<String>,
    pub(crate) env: Vec<(String, String)>,
    pub(crate) cwd: Option<PathBuf>,
    pub(crate) merge_stderr: bool,
    pub(crate) stdin: Option<StdinSource>,
    pub(crate) stdout: StreamExpect,
    pub(crate) stderr: StreamExpect,
    pub(crate) exit: ExitCodeExpect,
    pub(crate) auto_close: AutoClose,
    pub(crate) pool: PoolChoice,
    pub(crate) error: Option<StartError>,
}

impl CmdAssert {
    fn new(exe: ExeResolver) -> Self {
        Self {
            exe,
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            merge_stderr: false,
            stdin: None,
            stdout: StreamExpect::default(),
            stderr: StreamExpect::default(),
            exit: ExitCodeExpect::default(),
            auto_close: AutoClose::default(),
            pool: PoolChoice::default(),
            error: None,
        }
    }

    /// A command named by `exe` (looked up on PATH unless it contains a path
    /// separator) with initial arguments.
    pub fn command(
        exe: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let exe = exe.into();
        let resolver = if exe.contains(std::path::MAIN_SEPARATOR) {
            ExeResolver::Path(PathBuf::from(&exe))
        } else {
            ExeResolver::Lookup(exe)
        };
        Self::new(resolver).args(args)
    }

    /// A command run from an explicit executable path.
    pub fn executable(path: impl Into<PathBuf>) -> Self {
        Self::new(ExeResolver::Path(path.into()))
    }

    /// Re-run the currently running executable (useful for self-testing
    /// binaries that expose helper modes).
    pub fn current_exe() -> Self {
        Self::new(ExeResolver::CurrentExe)
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set one environment variable for the child. The overlay keeps
    /// insertion order; setting a name again updates it in place.
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.env.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.env.push((name, value)),
        }
        self
    }

    /// Merge several environment variables.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in vars {
            self = self.env(name, value);
        }
        self
    }

    /// Run the child in `dir`.
    pub fn cd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Merge the child's stderr into its stdout stream (`2>&1`). Attaching
    /// stderr expectations afterwards makes `start()` fail.
    pub fn stderr_to_stdout(mut self) -> Self {
        self.merge_stderr = true;
        self
    }

    fn set_stdin(mut self, source: StdinSource) -> Self {
        if self.stdin.is_some() {
            if self.error.is_none() {
                self.error = Some(StartError::StdinAlreadyConfigured);
            }
            return self;
        }
        self.stdin = Some(source);
        self
    }

    /// Feed the given text to the child's stdin, then close it.
    pub fn stdin_str(self, text: impl Into<String>) -> Self {
        self.set_stdin(StdinSource::Text(text.into().into_bytes()))
    }

    /// Stream the given file to the child's stdin.
    pub fn stdin_file(self, path: impl Into<PathBuf>) -> Self {
        self.set_stdin(StdinSource::File(path.into()))
    }

    /// Drive the child's stdin from a callback running on a worker thread.
    /// The sink is cancellable; see [`StdinSink`].
    pub fn stdin_with(
        self,
        callback: impl FnOnce(&mut StdinSink) -> std::io::Result<()> + Send + 'static,
    ) -> Self {
        self.set_stdin(StdinSource::Callback(Box::new(callback)))
    }

    /// Configure stdout expectations.
    pub fn stdout(mut self, f: impl FnOnce(StreamExpect) -> StreamExpect) -> Self {
        self.stdout = f(std::mem::take(&mut self.stdout));
        self
    }

    /// Configure stderr expectations.
    pub fn stderr(mut self, f: impl FnOnce(StreamExpect) -> StreamExpect) -> Self {
        self.stderr = f(std::mem::take(&mut self.stderr));
        self
    }

    /// Register a line awaiter on stdout; the handle completes with the
    /// first matching line once the command has started.
    pub fn stdout_awaits<T: Send + 'static>(
        mut self,
        awaited: crate::Awaited<T>,
    ) -> (Self, crate::AwaitHandle<T>) {
        let (stdout, handle) = std::mem::take(&mut self.stdout).awaits(awaited);
        self.stdout = stdout;
        (self, handle)
    }

    /// Register a line awaiter on stderr.
    pub fn stderr_awaits<T: Send + 'static>(
        mut self,
        awaited: crate::Awaited<T>,
    ) -> (Self, crate::AwaitHandle<T>) {
        let (stderr, handle) = std::mem::take(&mut self.stderr).awaits(awaited);
        self.stderr = stderr;
        (self, handle)
    }

    /// The child must exit with `code`. The default expectation is `0`.
    pub fn exit_code_is(mut self, code: i32) -> Self {
        self.exit = ExitCodeExpect::Is(code);
        self
    }

    /// The child must exit with one of `codes`.
    pub fn exit_code_is_any_of(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.exit = ExitCodeExpect::AnyOf(codes.into_iter().collect());
        self
    }

    /// The exit code must satisfy `predicate`; `template` may use
    /// `${actual}`.
    pub fn exit_code_satisfies(
        mut self,
        predicate: impl Fn(i32) -> bool + Send + 'static,
        template: impl Into<String>,
    ) -> Self {
        self.exit = ExitCodeExpect::Satisfies {
            predicate: Box::new(predicate),
            template: template.into(),
        };
        self
    }

    /// Scope-exit kill uses forced termination.
    pub fn auto_close_forcibly(mut self) -> Self {
        self.auto_close.forcibly = true;
        self
    }

    /// Scope-exit kill only targets the direct child.
    pub fn auto_close_without_descendants(mut self) -> Self {
        self.auto_close.with_descendants = false;
        self
    }

    /// Bound the scope-exit wait for the killed child.
    pub fn auto_close_timeout(mut self, timeout: Duration) -> Self {
        self.auto_close.timeout = Some(timeout);
        self
    }

    /// Run this command's workers on a pool created for it alone.
    pub fn local_pool(mut self, config: PoolConfig) -> Self {
        self.pool = PoolChoice::Local(config);
        self
    }

    /// Run this command's workers on a caller-owned runtime.
    pub fn worker_pool(mut self, handle: Handle) -> Self {
        self.pool = PoolChoice::External(handle);
        self
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
