//! Stateful per-line assertions.
//!
//! An assertion observes every line of its stream during streaming via
//! [`LineAssert::line`] and is asked for its verdict exactly once after the
//! consumer has joined via [`LineAssert::evaluate`].

use regex::Regex;

use crate::collector::{Collector, StreamTag};

/// A stateful per-line predicate over one output stream.
///
/// Implement this to plug arbitrary streaming checks into a stream via
/// `lines_satisfy`. `line` is called once per line in delivery order;
/// `evaluate` runs once after the stream has been fully drained and reports
/// into the collector.
pub trait LineAssert: Send {
    fn line(&mut self, line: &str);
    fn evaluate(&mut self, tag: Option<StreamTag>, collector: &mut Collector);
}

fn stream_name(tag: Option<StreamTag>) -> &'static str {
    match tag {
        Some(StreamTag::Stdout) => "stdout",
        Some(StreamTag::Stderr) => "stderr",
        None => "output",
    }
}

/// Expand `${stream}` and `${actual}` in a user-supplied message template.
pub(crate) fn expand_template(template: &str, stream: &str, actual: &str) -> String {
    template
        .replace("${stream}", stream)
        .replace("${actual}", actual)
}

/// Wrap the `start..end` byte range of `line` in a `>>match<<` highlight.
pub(crate) fn highlight(line: &str, start: usize, end: usize) -> String {
    format!(
        "{}>>{}<<{}",
        &line[..start],
        &line[start..end],
        &line[end..]
    )
}

fn count_noun(n: u64) -> &'static str {
    if n == 1 { "line" } else { "lines" }
}

/// Every expected literal must appear as a whole line at least once.
pub(crate) struct HasLines {
    expected: Vec<String>,
    seen: Vec<bool>,
}

impl HasLines {
    pub(crate) fn new(expected: Vec<String>) -> Self {
        let seen = vec![false; expected.len()];
        Self { expected, seen }
    }
}

impl LineAssert for HasLines {
    fn line(&mut self, line: &str) {
        for (i, expected) in self.expected.iter().enumerate() {
            if !self.seen[i] && line == expected {
                self.seen[i] = true;
            }
        }
    }

    fn evaluate(&mut self, tag: Option<StreamTag>, collector: &mut Collector) {
        for (i, expected) in self.expected.iter().enumerate() {
            if !self.seen[i] {
                collector.failure(
                    tag,
                    format!("Expected line \"{expected}\" in {}", stream_name(tag)),
                );
            }
        }
    }
}

/// No banned literal may appear as a whole line.
pub(crate) struct LacksLines {
    banned: Vec<String>,
    offending: Vec<Vec<String>>,
}

impl LacksLines {
    pub(crate) fn new(banned: Vec<String>) -> Self {
        let offending = banned.iter().map(|_| Vec::new()).collect();
        Self { banned, offending }
    }
}

impl LineAssert for LacksLines {
    fn line(&mut self, line: &str) {
        for (i, banned) in self.banned.iter().enumerate() {
            if line == banned {
                self.offending[i].push(highlight(line, 0, line.len()));
            }
        }
    }

    fn evaluate(&mut self, tag: Option<StreamTag>, collector: &mut Collector) {
        for (i, banned) in self.banned.iter().enumerate() {
            if !self.offending[i].is_empty() {
                collector.failure(tag, offending_message(tag, banned, "line", &self.offending[i]));
            }
        }
    }
}

fn offending_message(
    tag: Option<StreamTag>,
    needle: &str,
    kind: &str,
    offending: &[String],
) -> String {
    let mut msg = format!(
        "Expected no {kind} \"{needle}\" in {} but found:",
        stream_name(tag)
    );
    for line in offending {
        msg.push_str("\n    ");
        msg.push_str(line);
    }
    msg
}

/// Every expected substring must appear in at least one line.
pub(crate) struct HasSubstrings {
    expected: Vec<String>,
    seen: Vec<bool>,
    ignore_case: bool,
}

impl HasSubstrings {
    pub(crate) fn new(expected: Vec<String>, ignore_case: bool) -> Self {
        let seen = vec![false; expected.len()];
        let expected = if ignore_case {
            expected.into_iter().map(|s| s.to_lowercase()).collect()
        } else {
            expected
        };
        Self {
            expected,
            seen,
            ignore_case,
        }
    }
}

impl LineAssert for HasSubstrings {
    fn line(&mut self, line: &str) {
        for (i, expected) in self.expected.iter().enumerate() {
            if self.seen[i] {
                continue;
            }
            let hit = if self.ignore_case {
                find_case_insensitive(line, expected).is_some()
            } else {
                line.contains(expected.as_str())
            };
            if hit {
                self.seen[i] = true;
            }
        }
    }

    fn evaluate(&mut self, tag: Option<StreamTag>, collector: &mut Collector) {
        for (i, expected) in self.expected.iter().enumerate() {
            if !self.seen[i] {
                let qualifier = if self.ignore_case {
                    " (ignoring case)"
                } else {
                    ""
                };
                collector.failure(
                    tag,
                    format!(
                        "Expected line containing \"{expected}\"{qualifier} in {}",
                        stream_name(tag)
                    ),
                );
            }
        }
    }
}

/// No banned substring may appear in any line.
pub(crate) struct LacksSubstrings {
    banned: Vec<String>,
    offending: Vec<Vec<String>>,
    ignore_case: bool,
}

impl LacksSubstrings {
    pub(crate) fn new(banned: Vec<String>, ignore_case: bool) -> Self {
        let offending = banned.iter().map(|_| Vec::new()).collect();
        let banned = if ignore_case {
            banned.into_iter().map(|s| s.to_lowercase()).collect()
        } else {
            banned
        };
        Self {
            banned,
            offending,
            ignore_case,
        }
    }
}

impl LineAssert for LacksSubstrings {
    fn line(&mut self, line: &str) {
        for (i, banned) in self.banned.iter().enumerate() {
            let span = if self.ignore_case {
                find_case_insensitive(line, banned)
            } else {
                line.find(banned.as_str()).map(|at| (at, at + banned.len()))
            };
            if let Some((start, end)) = span {
                self.offending[i].push(highlight(line, start, end));
            }
        }
    }

    fn evaluate(&mut self, tag: Option<StreamTag>, collector: &mut Collector) {
        for (i, banned) in self.banned.iter().enumerate() {
            if !self.offending[i].is_empty() {
                collector.failure(
                    tag,
                    offending_message(tag, banned, "line containing", &self.offending[i]),
                );
            }
        }
    }
}

/// Each pattern must find a partial match in at least one line.
pub(crate) struct HasMatches {
    patterns: Vec<Regex>,
    seen: Vec<bool>,
}

impl HasMatches {
    pub(crate) fn new(patterns: Vec<Regex>) -> Self {
        let seen = vec![false; patterns.len()];
        Self { patterns, seen }
    }
}

impl LineAssert for HasMatches {
    fn line(&mut self, line: &str) {
        for (i, pattern) in self.patterns.iter().enumerate() {
            if !self.seen[i] && pattern.is_match(line) {
                self.seen[i] = true;
            }
        }
    }

    fn evaluate(&mut self, tag: Option<StreamTag>, collector: &mut Collector) {
        for (i, pattern) in self.patterns.iter().enumerate() {
            if !self.seen[i] {
                collector.failure(
                    tag,
                    format!(
                        "Expected line matching \"{pattern}\" in {}",
                        stream_name(tag)
                    ),
                );
            }
        }
    }
}

/// No pattern may find a partial match in any line.
pub(crate) struct LacksMatches {
    patterns: Vec<Regex>,
    offending: Vec<Vec<String>>,
}

impl LacksMatches {
    pub(crate) fn new(patterns: Vec<Regex>) -> Self {
        let offending = patterns.iter().map(|_| Vec::new()).collect();
        Self {
            patterns,
            offending,
        }
    }
}

impl LineAssert for LacksMatches {
    fn line(&mut self, line: &str) {
        for (i, pattern) in self.patterns.iter().enumerate() {
            if let Some(found) = pattern.find(line) {
                self.offending[i].push(highlight(line, found.start(), found.end()));
            }
        }
    }

    fn evaluate(&mut self, tag: Option<StreamTag>, collector: &mut Collector) {
        for (i, pattern) in self.patterns.iter().enumerate() {
            if !self.offending[i].is_empty() {
                collector.failure(
                    tag,
                    offending_message(
                        tag,
                        pattern.as_str(),
                        "line matching",
                        &self.offending[i],
                    ),
                );
            }
        }
    }
}

/// Exactly `expected` lines must be observed.
pub(crate) struct LineCountIs {
    expected: u64,
    count: u64,
}

impl LineCountIs {
    pub(crate) fn new(expected: u64) -> Self {
        Self { expected, count: 0 }
    }
}

impl LineAssert for LineCountIs {
    fn line(&mut self, _line: &str) {
        self.count += 1;
    }

    fn evaluate(&mut self, tag: Option<StreamTag>, collector: &mut Collector) {
        if self.count != self.expected {
            collector.failure(
                tag,
                format!(
                    "Expected line count {} in {} but was {}",
                    self.expected,
                    stream_name(tag),
                    self.count
                ),
            );
        }
    }
}

/// A user predicate over the final line count.
pub(crate) struct LineCountSatisfies {
    predicate: Box<dyn FnMut(u64) -> bool + Send>,
    template: String,
    count: u64,
}

impl LineCountSatisfies {
    pub(crate) fn new(predicate: impl FnMut(u64) -> bool + Send + 'static, template: String) -> Self {
        Self {
            predicate: Box::new(predicate),
            template,
            count: 0,
        }
    }
}

impl LineAssert for LineCountSatisfies {
    fn line(&mut self, _line: &str) {
        self.count += 1;
    }

    fn evaluate(&mut self, tag: Option<StreamTag>, collector: &mut Collector) {
        if !(self.predicate)(self.count) {
            collector.failure(
                tag,
                expand_template(
                    &self.template,
                    stream_name(tag),
                    &self.count.to_string(),
                ),
            );
        }
    }
}

/// Zero lines must be observed (`is_empty`).
pub(crate) struct NoLines {
    count: u64,
}

impl NoLines {
    pub(crate) fn new() -> Self {
        Self { count: 0 }
    }
}

impl LineAssert for NoLines {
    fn line(&mut self, _line: &str) {
        self.count += 1;
    }

    fn evaluate(&mut self, tag: Option<StreamTag>, collector: &mut Collector) {
        if self.count > 0 {
            collector.failure(
                tag,
                format!(
                    "Expected no lines in {} but found {} {}",
                    stream_name(tag),
                    self.count,
                    count_noun(self.count)
                ),
            );
        }
    }
}

/// Side-effect-only line observer; always satisfied.
pub(crate) struct LogLines {
    consumer: Box<dyn FnMut(&str) + Send>,
}

impl LogLines {
    pub(crate) fn new(consumer: impl FnMut(&str) + Send + 'static) -> Self {
        Self {
            consumer: Box::new(consumer),
        }
    }
}

impl LineAssert for LogLines {
    fn line(&mut self, line: &str) {
        (self.consumer)(line);
    }

    fn evaluate(&mut self, _tag: Option<StreamTag>, _collector: &mut Collector) {}
}

/// Byte-count assertion, checked against the consumer's raw byte counter
/// after join. Not a [`LineAssert`]: it never sees lines.
pub(crate) struct ByteCountAssert {
    expected: u64,
    template: Option<String>,
}

impl ByteCountAssert {
    pub(crate) fn new(expected: u64, template: Option<String>) -> Self {
        Self { expected, template }
    }

    pub(crate) fn evaluate(&self, tag: StreamTag, actual: u64, collector: &mut Collector) {
        if actual == self.expected {
            return;
        }
        let message = match &self.template {
            Some(template) => expand_template(template, &tag.to_string(), &actual.to_string()),
            None => format!(
                "Expected byte count {} in {tag} but was {actual}",
                self.expected
            ),
        };
        collector.failure(Some(tag), message);
    }
}

/// Case-insensitive substring search; `needle` must already be lower-cased.
///
/// The returned span assumes the fold does not change the char count, which
/// holds for the common one-to-one case mappings.
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return Some((0, 0));
    }
    let needle_chars = needle.chars().count();
    for (start, _) in haystack.char_indices() {
        let candidate = &haystack[start..];
        let mut folded = candidate.chars().flat_map(char::to_lowercase);
        if needle.chars().all(|nc| folded.next() == Some(nc)) {
            let end = candidate
                .char_indices()
                .nth(needle_chars)
                .map(|(offset, _)| start + offset)
                .unwrap_or(haystack.len());
            return Some((start, end));
        }
    }
    None
}

#[cfg(test)]
#[path = "line_assert_tests.rs"]
mod tests;
