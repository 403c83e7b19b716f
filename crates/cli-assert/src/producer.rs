//! Stdin producer: drives the child's input pipe from a worker thread.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::pool::WorkerPool;

/// Error kind observed on writes to a cancelled stdin sink.
#[derive(thiserror::Error, Debug)]
#[error("stdin sink cancelled")]
pub struct SinkCancelled;

fn cancelled_error() -> std::io::Error {
    std::io::Error::other(SinkCancelled)
}

/// True iff `error` is the cancellation error produced by a killed command's
/// stdin sink.
pub fn is_sink_cancelled(error: &std::io::Error) -> bool {
    error
        .get_ref()
        .map(|inner| inner.is::<SinkCancelled>())
        .unwrap_or(false)
}

#[derive(Debug)]
struct SinkShared {
    cancelled: AtomicBool,
    writer: Mutex<Option<os_pipe::PipeWriter>>,
}

impl SinkShared {
    /// Close the pipe, once. Safe to call from any thread.
    fn close(&self) {
        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
    }
}

/// The writable, cancellable byte sink handed to a stdin callback.
///
/// Once the owning command is killed, every `write`/`flush` fails with an
/// error for which [`is_sink_cancelled`] returns true. Closing twice is a
/// no-op.
pub struct StdinSink {
    shared: Arc<SinkShared>,
}

impl StdinSink {
    fn check_cancelled(&self) -> std::io::Result<()> {
        if self.shared.cancelled.load(Ordering::Relaxed) {
            Err(cancelled_error())
        } else {
            Ok(())
        }
    }

    /// Close the child's stdin, signalling EOF. Subsequent closes are no-ops.
    pub fn close(&mut self) {
        let mut writer = self
            .shared
            .writer
            .lock()
            .expect("stdin sink lock poisoned");
        writer.take();
    }
}

impl Write for StdinSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.check_cancelled()?;
        let mut writer = self
            .shared
            .writer
            .lock()
            .expect("stdin sink lock poisoned");
        match writer.as_mut() {
            Some(pipe) => pipe.write(buf),
            None => Err(cancelled_error()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.check_cancelled()?;
        let mut writer = self
            .shared
            .writer
            .lock()
            .expect("stdin sink lock poisoned");
        match writer.as_mut() {
            Some(pipe) => pipe.flush(),
            None => Err(cancelled_error()),
        }
    }
}

/// What feeds the child's stdin.
pub(crate) enum StdinSource {
    Text(Vec<u8>),
    File(PathBuf),
    Callback(Box<dyn FnOnce(&mut StdinSink) -> std::io::Result<()> + Send>),
}

impl StdinSource {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            StdinSource::Text(_) => "string",
            StdinSource::File(_) => "file",
            StdinSource::Callback(_) => "callback",
        }
    }
}

impl std::fmt::Debug for StdinSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// The worker feeding the child's stdin pipe.
#[derive(Debug)]
pub(crate) struct InputProducer {
    shared: Arc<SinkShared>,
    worker: Option<JoinHandle<Vec<String>>>,
}

impl InputProducer {
    pub(crate) fn start(
        pool: &WorkerPool,
        writer: os_pipe::PipeWriter,
        source: StdinSource,
        label: String,
    ) -> Self {
        let shared = Arc::new(SinkShared {
            cancelled: AtomicBool::new(false),
            writer: Mutex::new(Some(writer)),
        });
        let task_shared = shared.clone();
        let worker = pool.spawn_blocking(move || feed(task_shared, source, label));
        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Flag the sink cancelled and close the pipe best-effort.
    pub(crate) fn cancel(&mut self) {
        self.shared.cancelled.store(true, Ordering::Relaxed);
        self.shared.close();
    }

    /// Await the worker; returns the failures to report (tagged no-stream).
    pub(crate) async fn join(&mut self) -> Vec<String> {
        let Some(worker) = self.worker.take() else {
            return Vec::new();
        };
        match worker.await {
            Ok(failures) => failures,
            Err(join_error) if join_error.is_cancelled() => Vec::new(),
            Err(join_error) => vec![format!("stdin worker died: {join_error}")],
        }
    }
}

fn feed(shared: Arc<SinkShared>, source: StdinSource, label: String) -> Vec<String> {
    let kind = source.kind();
    let mut sink = StdinSink {
        shared: shared.clone(),
    };
    let result = match source {
        StdinSource::Text(bytes) => sink.write_all(&bytes).and_then(|_| sink.flush()),
        StdinSource::File(path) => std::fs::File::open(&path)
            .and_then(|mut file| copy_to_sink(&mut file, &mut sink)),
        StdinSource::Callback(callback) => callback(&mut sink),
    };
    sink.close();

    match result {
        Ok(()) => Vec::new(),
        Err(error) if is_sink_cancelled(&error) || shared.cancelled.load(Ordering::Relaxed) => {
            // Cancellation during shutdown is expected; never re-raised.
            tracing::debug!(%label, "stdin cancelled during shutdown");
            Vec::new()
        }
        Err(error)
            if error.kind() == std::io::ErrorKind::BrokenPipe && kind != "callback" =>
        {
            // The child stopped reading before the canned input was drained.
            tracing::debug!(%label, "child closed stdin early");
            Vec::new()
        }
        Err(error) => vec![format!("[{label}] stdin {kind} failed: {error}")],
    }
}

fn copy_to_sink(file: &mut std::fs::File, sink: &mut StdinSink) -> std::io::Result<()> {
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            return sink.flush();
        }
        sink.write_all(&buf[..n])?;
    }
}

#[cfg(test)]
#[path = "producer_tests.rs"]
mod tests;
