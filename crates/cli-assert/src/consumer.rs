//! Stream consumers: drain one output pipe of the child into a line stream
//! and fan each line out to capture, assertions, awaiters and redirects.

use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use encoding_rs::{Decoder, Encoding};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::awaiter::{AwaitProbe, panic_message};
use crate::capture::Capture;
use crate::collector::{Collector, StreamTag};
use crate::line_assert::{ByteCountAssert, LineAssert};
use crate::pool::WorkerPool;

const READ_BUF_SIZE: usize = 8192;

/// Where a stream is mirrored, line by line, while it is consumed.
pub(crate) enum RedirectSpec {
    /// Opened by the consumer at loop start, closed at loop exit.
    File(PathBuf),
    /// User-owned; written through, flushed, never closed.
    Sink(Arc<Mutex<dyn Write + Send>>),
}

impl std::fmt::Debug for RedirectSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedirectSpec::File(path) => f.debug_tuple("File").field(path).finish(),
            RedirectSpec::Sink(_) => f.write_str("Sink(..)"),
        }
    }
}

/// Everything a consumer worker needs, moved into the read loop at start.
pub(crate) struct ConsumerConfig {
    pub tag: StreamTag,
    pub label: String,
    pub encoding: &'static Encoding,
    pub assertions: Vec<Box<dyn LineAssert>>,
    pub byte_count: Option<ByteCountAssert>,
    pub probes: Vec<Box<dyn AwaitProbe>>,
    pub redirect: Option<RedirectSpec>,
    pub capture: Capture,
    /// `/dev/null` mode: count bytes, skip decoding and line fan-out.
    pub null_device: bool,
}

/// State returned by the read loop, evaluated after join.
pub(crate) struct ConsumerOutcome {
    assertions: Vec<Box<dyn LineAssert>>,
    byte_count: Option<ByteCountAssert>,
    capture: Capture,
    exceptions: Vec<String>,
}

impl ConsumerOutcome {
    pub(crate) fn evaluate(mut self, tag: StreamTag, bytes: u64, collector: &mut Collector) {
        for exception in self.exceptions.drain(..) {
            collector.exception(Some(tag), exception);
        }
        for assertion in self.assertions.iter_mut() {
            let result = catch_unwind(AssertUnwindSafe(|| {
                assertion.evaluate(Some(tag), &mut *collector);
            }));
            if let Err(panic) = result {
                collector.exception(
                    Some(tag),
                    format!("assertion panicked during evaluation: {}", panic_message(panic)),
                );
            }
        }
        if let Some(byte_count) = &self.byte_count {
            byte_count.evaluate(tag, bytes, collector);
        }
        collector.set_capture(tag, self.capture.render(tag));
    }

    pub(crate) fn total_lines(&self) -> u64 {
        self.capture.total_lines()
    }
}

/// A worker draining one pipe of the child.
pub(crate) struct StreamConsumer {
    tag: StreamTag,
    bytes: Arc<AtomicU64>,
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<ConsumerOutcome>>,
}

impl std::fmt::Debug for StreamConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConsumer")
            .field("tag", &self.tag)
            .field("bytes", &self.bytes)
            .field("cancelled", &self.cancelled)
            .field("worker", &self.worker.as_ref().map(|_| ".."))
            .finish()
    }
}

impl StreamConsumer {
    pub(crate) fn start<R>(pool: &WorkerPool, source: R, config: ConsumerConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tag = config.tag;
        let bytes = Arc::new(AtomicU64::new(0));
        let cancelled = Arc::new(AtomicBool::new(false));
        let worker = pool.spawn(run(source, config, bytes.clone(), cancelled.clone()));
        Self {
            tag,
            bytes,
            cancelled,
            worker: Some(worker),
        }
    }

    pub(crate) fn bytes_read(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Mark cancelled and abort the read loop. The byte counter stays valid.
    pub(crate) fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
        if let Some(worker) = &self.worker {
            worker.abort();
        }
    }

    /// Await the read loop. `None` when the worker was cancelled away.
    pub(crate) async fn join(&mut self) -> Option<ConsumerOutcome> {
        let worker = self.worker.take()?;
        match worker.await {
            Ok(outcome) => Some(outcome),
            Err(join_error) if join_error.is_cancelled() => None,
            Err(join_error) => {
                tracing::error!(stream = %self.tag, %join_error, "consumer worker died");
                None
            }
        }
    }
}

enum RedirectSink {
    File(std::fs::File),
    Shared(Arc<Mutex<dyn Write + Send>>),
}

impl RedirectSink {
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        match self {
            RedirectSink::File(file) => {
                file.write_all(line.as_bytes())?;
                file.write_all(b"\n")
            }
            RedirectSink::Shared(shared) => {
                let mut sink = shared.lock().expect("redirect sink lock poisoned");
                sink.write_all(line.as_bytes())?;
                sink.write_all(b"\n")
            }
        }
    }

    fn finish(self) {
        // File redirects close on drop; user-owned sinks are only flushed.
        if let RedirectSink::Shared(shared) = self {
            let _ = shared.lock().expect("redirect sink lock poisoned").flush();
        }
    }
}

async fn run<R>(
    mut source: R,
    config: ConsumerConfig,
    bytes: Arc<AtomicU64>,
    cancelled: Arc<AtomicBool>,
) -> ConsumerOutcome
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let ConsumerConfig {
        tag,
        label,
        encoding,
        mut assertions,
        byte_count,
        mut probes,
        redirect,
        mut capture,
        null_device,
    } = config;

    let mut exceptions = Vec::new();
    let mut sink = open_redirect(redirect, &label, &mut exceptions);
    let mut decoder = encoding.new_decoder();
    let mut pending = String::new();
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                bytes.fetch_add(n as u64, Ordering::Relaxed);
                if null_device {
                    continue;
                }
                decode(&mut decoder, &buf[..n], false, &mut pending);
                while let Some(terminator) = pending.find('\n') {
                    let end = match pending.as_bytes()[..terminator].last() {
                        Some(b'\r') => terminator - 1,
                        _ => terminator,
                    };
                    dispatch_line(
                        &pending[..end],
                        &label,
                        &mut capture,
                        &mut assertions,
                        &mut probes,
                        &mut sink,
                        &mut exceptions,
                    );
                    pending.drain(..=terminator);
                }
            }
            Err(error) => {
                if !cancelled.load(Ordering::Relaxed) {
                    exceptions.push(format!("[{label}] failed reading {tag}: {error}"));
                }
                break;
            }
        }
    }

    if !null_device {
        decode(&mut decoder, &[], true, &mut pending);
        // A trailing line without a terminator is still a line, unless empty.
        if !pending.is_empty() {
            dispatch_line(
                &pending,
                &label,
                &mut capture,
                &mut assertions,
                &mut probes,
                &mut sink,
                &mut exceptions,
            );
        }
    }
    if let Some(sink) = sink {
        sink.finish();
    }

    ConsumerOutcome {
        assertions,
        byte_count,
        capture,
        exceptions,
    }
}

fn open_redirect(
    redirect: Option<RedirectSpec>,
    label: &str,
    exceptions: &mut Vec<String>,
) -> Option<RedirectSink> {
    match redirect {
        None => None,
        Some(RedirectSpec::Sink(shared)) => Some(RedirectSink::Shared(shared)),
        Some(RedirectSpec::File(path)) => match std::fs::File::create(&path) {
            Ok(file) => Some(RedirectSink::File(file)),
            Err(error) => {
                exceptions.push(format!(
                    "[{label}] failed to open redirect file {}: {error}",
                    path.display()
                ));
                None
            }
        },
    }
}

fn decode(decoder: &mut Decoder, input: &[u8], last: bool, out: &mut String) {
    let needed = decoder
        .max_utf8_buffer_length(input.len())
        .unwrap_or(READ_BUF_SIZE * 4);
    out.reserve(needed);
    let (_result, _read, _had_errors) = decoder.decode_to_string(input, out, last);
}

#[allow(clippy::too_many_arguments)]
fn dispatch_line(
    line: &str,
    label: &str,
    capture: &mut Capture,
    assertions: &mut [Box<dyn LineAssert>],
    probes: &mut [Box<dyn AwaitProbe>],
    sink: &mut Option<RedirectSink>,
    exceptions: &mut Vec<String>,
) {
    capture.push(line);
    // Every assertion sees every line, even if an earlier one panicked.
    for assertion in assertions.iter_mut() {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| assertion.line(line))) {
            exceptions.push(format!(
                "[{label}] assertion panicked on line {line:?}: {}",
                panic_message(panic)
            ));
        }
    }
    for probe in probes.iter_mut() {
        probe.accept(line);
    }
    if let Some(active) = sink {
        if let Err(error) = active.write_line(line) {
            exceptions.push(format!("[{label}] failed writing redirect: {error}"));
            *sink = None;
        }
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
