//! Bounded head/tail line buffer used to render failure context.

use std::collections::VecDeque;

use crate::collector::StreamTag;

/// How many lines of a stream to keep for failure reporting.
///
/// `head` fills first; once full, the last `tail` lines are kept in a ring.
/// `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePolicy {
    pub(crate) head: Option<usize>,
    pub(crate) tail: Option<usize>,
}

pub(crate) const DEFAULT_HEAD_LINES: usize = 100;
pub(crate) const DEFAULT_TAIL_LINES: usize = 100;

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            head: Some(DEFAULT_HEAD_LINES),
            tail: Some(DEFAULT_TAIL_LINES),
        }
    }
}

impl CapturePolicy {
    pub fn bounded(head: usize, tail: usize) -> Self {
        Self {
            head: Some(head),
            tail: Some(tail),
        }
    }

    pub fn all() -> Self {
        Self {
            head: None,
            tail: None,
        }
    }

    pub fn none() -> Self {
        Self::bounded(0, 0)
    }
}

#[derive(Debug)]
pub(crate) struct Capture {
    head_max: Option<usize>,
    tail_max: Option<usize>,
    head: Vec<String>,
    tail: VecDeque<String>,
    total: u64,
}

impl Capture {
    pub(crate) fn new(policy: CapturePolicy) -> Self {
        Self {
            head_max: policy.head,
            tail_max: policy.tail,
            head: Vec::new(),
            tail: VecDeque::new(),
            total: 0,
        }
    }

    pub(crate) fn push(&mut self, line: &str) {
        self.total += 1;
        match self.head_max {
            None => {
                self.head.push(line.to_string());
                return;
            }
            Some(max) if self.head.len() < max => {
                self.head.push(line.to_string());
                return;
            }
            Some(_) => {}
        }
        match self.tail_max {
            None => self.tail.push_back(line.to_string()),
            Some(0) => {}
            Some(max) => {
                if self.tail.len() == max {
                    self.tail.pop_front();
                }
                self.tail.push_back(line.to_string());
            }
        }
    }

    pub(crate) fn total_lines(&self) -> u64 {
        self.total
    }

    /// Render the capture block body: head, omitted marker, tail.
    ///
    /// Every rendered line is indented four spaces; the `<stream>:` header is
    /// the collector's business.
    pub(crate) fn render(&self, tag: StreamTag) -> String {
        if self.total == 0 {
            return "    <no output>".to_string();
        }
        let stored = self.head.len() as u64 + self.tail.len() as u64;
        if stored == 0 {
            return "    <no lines captured>".to_string();
        }
        let mut out = String::new();
        for line in &self.head {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
        let omitted = self.total - stored;
        if omitted > 0 {
            out.push_str(&format!(
                "    [{omitted} lines omitted; set {tag}().capture(max_head_lines, max_tail_lines) \
                 or {tag}().capture_all() to capture more lines]\n"
            ));
        }
        for line in &self.tail {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
        out.pop();
        out
    }
}

#[cfg(test)]
#[path = "capture_tests.rs"]
mod tests;
