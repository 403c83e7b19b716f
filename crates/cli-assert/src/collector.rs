//! Failure collector: per-stream buckets fused into one aggregated report.

use std::fmt;

/// Which output stream an entry belongs to. Entries with no stream (stdin
/// producer, exit code, timeout) live in the `None` bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamTag {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamTag::Stdout => f.write_str("stdout"),
            StreamTag::Stderr => f.write_str("stderr"),
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    exceptions: Vec<String>,
    failures: Vec<String>,
    capture: Option<String>,
}

impl Bucket {
    fn has_entries(&self) -> bool {
        !self.exceptions.is_empty() || !self.failures.is_empty()
    }
}

/// Ordered multi-bucket container from which the aggregated error text is
/// rendered. Buckets render in the order: no-stream, stdout, stderr.
#[derive(Debug, Default)]
pub struct Collector {
    none: Bucket,
    stdout: Bucket,
    stderr: Bucket,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket_mut(&mut self, tag: Option<StreamTag>) -> &mut Bucket {
        match tag {
            None => &mut self.none,
            Some(StreamTag::Stdout) => &mut self.stdout,
            Some(StreamTag::Stderr) => &mut self.stderr,
        }
    }

    /// Record an assertion failure.
    pub fn failure(&mut self, tag: Option<StreamTag>, message: impl Into<String>) {
        self.bucket_mut(tag).failures.push(message.into());
    }

    /// Record an exception raised by a worker or user callback.
    pub fn exception(&mut self, tag: Option<StreamTag>, message: impl Into<String>) {
        self.bucket_mut(tag).exceptions.push(message.into());
    }

    /// Attach the rendered capture block for a stream. It is emitted only if
    /// that stream's bucket ends up with at least one entry.
    pub fn set_capture(&mut self, tag: StreamTag, block: String) {
        self.bucket_mut(Some(tag)).capture = Some(block);
    }

    pub fn is_empty(&self) -> bool {
        !self.none.has_entries() && !self.stdout.has_entries() && !self.stderr.has_entries()
    }

    fn buckets(&self) -> [(&Bucket, Option<StreamTag>); 3] {
        [
            (&self.none, None),
            (&self.stdout, Some(StreamTag::Stdout)),
            (&self.stderr, Some(StreamTag::Stderr)),
        ]
    }

    /// Render the aggregated failure message for `command`.
    ///
    /// Returns `None` when nothing was collected.
    pub fn render(&self, command: &str) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let total_exceptions: usize = self.buckets().iter().map(|(b, _)| b.exceptions.len()).sum();
        let total_failures: usize = self.buckets().iter().map(|(b, _)| b.failures.len()).sum();

        let mut header_terms = Vec::new();
        if total_exceptions > 0 {
            header_terms.push(plural(total_exceptions, "exception", "exceptions"));
        }
        if total_failures > 0 {
            header_terms.push(plural(total_failures, "assertion failure", "assertion failures"));
        }

        let mut out = format!(
            "{} occurred while executing\n\n    {command}\n",
            header_terms.join(" and ")
        );

        let mut exception_seq = 0usize;
        let mut failure_seq = 0usize;
        for (bucket, tag) in self.buckets() {
            if !bucket.has_entries() {
                continue;
            }
            for message in &bucket.exceptions {
                exception_seq += 1;
                out.push_str(&format!(
                    "\nException {exception_seq}/{total_exceptions}: {message}"
                ));
            }
            for message in &bucket.failures {
                failure_seq += 1;
                out.push_str(&format!("\nFailure {failure_seq}/{total_failures}: {message}"));
            }
            if let (Some(tag), Some(block)) = (tag, bucket.capture.as_deref()) {
                out.push_str(&format!("\n{tag}:\n{block}"));
            }
        }
        Some(out)
    }
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

#[cfg(test)]
#[path = "collector_tests.rs"]
mod tests;
