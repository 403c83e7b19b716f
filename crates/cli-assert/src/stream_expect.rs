//! Per-stream expectations: assertions, capture policy, charset, redirects.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use encoding_rs::Encoding;
use regex::Regex;

use crate::awaiter::{AwaitHandle, AwaitProbe, Awaited};
use crate::capture::{Capture, CapturePolicy};
use crate::collector::StreamTag;
use crate::consumer::{ConsumerConfig, RedirectSpec};
use crate::error::StartError;
use crate::line_assert::{
    ByteCountAssert, HasLines, HasMatches, HasSubstrings, LacksLines, LacksMatches,
    LacksSubstrings, LineAssert, LineCountIs, LineCountSatisfies, LogLines, NoLines,
};

/// Expectations attached to one output stream of the command.
///
/// Built inside the `stdout(|s| …)` / `stderr(|s| …)` closures of
/// [`CmdAssert`](crate::CmdAssert); every method returns a new value.
/// Assertions run in registration order.
pub struct StreamExpect {
    pub(crate) encoding: &'static Encoding,
    pub(crate) assertions: Vec<Box<dyn LineAssert>>,
    pub(crate) byte_count: Option<ByteCountAssert>,
    pub(crate) probes: Vec<Box<dyn AwaitProbe>>,
    pub(crate) redirect: Option<RedirectSpec>,
    pub(crate) capture: CapturePolicy,
    pub(crate) null_device: bool,
    /// First deferred configuration error; surfaced by `start()`.
    pub(crate) error: Option<StartError>,
    /// Whether any expectation was registered; used to reject stderr
    /// expectations on a merged stderr.
    pub(crate) touched: bool,
}

impl Default for StreamExpect {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::UTF_8,
            assertions: Vec::new(),
            byte_count: None,
            probes: Vec::new(),
            redirect: None,
            capture: CapturePolicy::default(),
            null_device: false,
            error: None,
            touched: false,
        }
    }
}

fn into_strings(items: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    items.into_iter().map(Into::into).collect()
}

impl StreamExpect {
    fn push(mut self, assertion: impl LineAssert + 'static) -> Self {
        self.assertions.push(Box::new(assertion));
        self.touched = true;
        self
    }

    fn compile(
        &mut self,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Option<Vec<Regex>> {
        let mut compiled = Vec::new();
        for pattern in patterns {
            let pattern = pattern.into();
            match Regex::new(&pattern) {
                Ok(regex) => compiled.push(regex),
                Err(source) => {
                    self.defer_error(StartError::BadPattern { pattern, source });
                    return None;
                }
            }
        }
        Some(compiled)
    }

    fn defer_error(&mut self, error: StartError) {
        self.touched = true;
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Decode the stream with the named charset (default UTF-8).
    pub fn charset(mut self, label: &str) -> Self {
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) => self.encoding = encoding,
            None => self.defer_error(StartError::UnknownCharset(label.to_string())),
        }
        self
    }

    /// Decode the stream with a concrete [`Encoding`].
    pub fn charset_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Every given literal must appear as a whole line, in any order.
    pub fn has_lines(self, lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.push(HasLines::new(into_strings(lines)))
    }

    /// None of the given literals may appear as a whole line.
    pub fn does_not_have_lines(self, lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.push(LacksLines::new(into_strings(lines)))
    }

    /// Every given substring must appear in at least one line.
    pub fn has_lines_containing(
        self,
        substrings: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.push(HasSubstrings::new(into_strings(substrings), false))
    }

    /// No given substring may appear in any line.
    pub fn does_not_have_lines_containing(
        self,
        substrings: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.push(LacksSubstrings::new(into_strings(substrings), false))
    }

    pub fn has_lines_containing_ignore_case(
        self,
        substrings: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.push(HasSubstrings::new(into_strings(substrings), true))
    }

    pub fn does_not_have_lines_containing_ignore_case(
        self,
        substrings: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.push(LacksSubstrings::new(into_strings(substrings), true))
    }

    /// Each pattern must find a partial match in at least one line.
    pub fn has_lines_matching(
        mut self,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        match self.compile(patterns) {
            Some(compiled) => self.push(HasMatches::new(compiled)),
            None => self,
        }
    }

    /// No pattern may find a partial match in any line.
    pub fn does_not_have_lines_matching(
        mut self,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        match self.compile(patterns) {
            Some(compiled) => self.push(LacksMatches::new(compiled)),
            None => self,
        }
    }

    /// Pre-compiled variant of [`has_lines_matching`](Self::has_lines_matching).
    pub fn has_lines_matching_regex(self, patterns: impl IntoIterator<Item = Regex>) -> Self {
        self.push(HasMatches::new(patterns.into_iter().collect()))
    }

    /// Pre-compiled variant of
    /// [`does_not_have_lines_matching`](Self::does_not_have_lines_matching).
    pub fn does_not_have_lines_matching_regex(
        self,
        patterns: impl IntoIterator<Item = Regex>,
    ) -> Self {
        self.push(LacksMatches::new(patterns.into_iter().collect()))
    }

    /// Exactly `expected` lines must be observed.
    pub fn has_line_count(self, expected: u64) -> Self {
        self.push(LineCountIs::new(expected))
    }

    /// The final line count must satisfy `predicate`; `template` may use
    /// `${stream}` and `${actual}`.
    pub fn has_line_count_satisfying(
        self,
        predicate: impl FnMut(u64) -> bool + Send + 'static,
        template: impl Into<String>,
    ) -> Self {
        self.push(LineCountSatisfies::new(predicate, template.into()))
    }

    /// The stream must carry exactly `expected` raw bytes.
    pub fn has_byte_count(mut self, expected: u64) -> Self {
        self.byte_count = Some(ByteCountAssert::new(expected, None));
        self.touched = true;
        self
    }

    /// Like [`has_byte_count`](Self::has_byte_count) with a custom message
    /// template (`${stream}`, `${actual}`).
    pub fn has_byte_count_message(
        mut self,
        expected: u64,
        template: impl Into<String>,
    ) -> Self {
        self.byte_count = Some(ByteCountAssert::new(expected, Some(template.into())));
        self.touched = true;
        self
    }

    /// The stream must produce no lines at all.
    pub fn is_empty(self) -> Self {
        self.push(NoLines::new())
    }

    /// Attach an arbitrary stateful [`LineAssert`].
    pub fn lines_satisfy(self, assertion: impl LineAssert + 'static) -> Self {
        self.push(assertion)
    }

    /// Observe every line; never fails.
    pub fn log(self, consumer: impl FnMut(&str) + Send + 'static) -> Self {
        self.push(LogLines::new(consumer))
    }

    /// Mirror the stream, line by line, into a file created at loop start
    /// and closed when the stream ends.
    pub fn redirect_to_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.redirect = Some(RedirectSpec::File(path.into()));
        self.touched = true;
        self
    }

    /// Mirror the stream into a caller-owned sink. The sink is flushed but
    /// never closed by the consumer.
    pub fn redirect_to<W: Write + Send + 'static>(mut self, sink: Arc<Mutex<W>>) -> Self {
        self.redirect = Some(RedirectSpec::Sink(sink));
        self.touched = true;
        self
    }

    /// Keep the first `max_head_lines` and last `max_tail_lines` lines for
    /// failure reports.
    pub fn capture(mut self, max_head_lines: usize, max_tail_lines: usize) -> Self {
        self.capture = CapturePolicy::bounded(max_head_lines, max_tail_lines);
        self
    }

    /// Keep every line for failure reports.
    pub fn capture_all(mut self) -> Self {
        self.capture = CapturePolicy::all();
        self
    }

    /// Keep no lines.
    pub fn capture_none(mut self) -> Self {
        self.capture = CapturePolicy::none();
        self
    }

    /// Drain the stream without decoding it: bytes are counted, no lines are
    /// produced and no assertions may be attached.
    pub fn null(mut self) -> Self {
        self.null_device = true;
        self.touched = true;
        self
    }

    /// Complete `awaited` with the first matching line; the returned handle
    /// is waited on after `start`.
    pub fn awaits<T: Send + 'static>(mut self, mut awaited: Awaited<T>) -> (Self, AwaitHandle<T>) {
        if let Some(error) = awaited.error.take() {
            self.defer_error(error);
        }
        let (probe, handle) = awaited.into_probe();
        self.probes.push(probe);
        self.touched = true;
        (self, handle)
    }

    pub(crate) fn into_consumer_config(self, tag: StreamTag, label: String) -> ConsumerConfig {
        ConsumerConfig {
            tag,
            label,
            encoding: self.encoding,
            assertions: self.assertions,
            byte_count: self.byte_count,
            probes: self.probes,
            redirect: self.redirect,
            capture: Capture::new(self.capture),
            null_device: self.null_device,
        }
    }

    pub(crate) fn redirect_path(&self) -> Option<&std::path::Path> {
        match &self.redirect {
            Some(RedirectSpec::File(path)) => Some(path),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "stream_expect_tests.rs"]
mod tests;
