//! Line awaiters: one-shot promises completed by the first matching line.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use regex::Regex;
use tokio::sync::oneshot;

use crate::error::{AwaitError, AwaitFailure, StartError};

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type Mapper<T> = Box<dyn FnMut(String) -> Result<T, BoxError> + Send>;

/// A predicate-plus-mapper waiting to be attached to a stream.
///
/// Build one with [`line_matching`] or [`line_that`], optionally refine the
/// extracted value with [`map`](Awaited::map) / [`try_map`](Awaited::try_map),
/// and attach it with `stdout_awaits` / `stderr_awaits` to obtain the
/// [`AwaitHandle`].
pub struct Awaited<T> {
    description: String,
    predicate: Box<dyn FnMut(&str) -> bool + Send>,
    mapper: Mapper<T>,
    pub(crate) error: Option<StartError>,
}

/// Await the first line in which `pattern` finds a partial match.
///
/// If the pattern has at least one capturing group, the default mapped value
/// is the text of group 1; otherwise it is the whole line.
pub fn line_matching(pattern: &str) -> Awaited<String> {
    let description = format!("line matching \"{pattern}\"");
    match Regex::new(pattern) {
        Ok(regex) => {
            let extract_group = regex.captures_len() > 1;
            let finder = regex.clone();
            Awaited {
                description,
                predicate: Box::new(move |line| finder.is_match(line)),
                mapper: Box::new(move |line| {
                    if extract_group {
                        if let Some(group) = regex.captures(&line).and_then(|c| c.get(1)) {
                            return Ok(group.as_str().to_string());
                        }
                    }
                    Ok(line)
                }),
                error: None,
            }
        }
        Err(source) => Awaited {
            description,
            predicate: Box::new(|_| false),
            mapper: Box::new(|line| Ok(line)),
            error: Some(StartError::BadPattern {
                pattern: pattern.to_string(),
                source,
            }),
        },
    }
}

/// Await the first line satisfying an arbitrary predicate.
pub fn line_that(
    description: impl Into<String>,
    predicate: impl FnMut(&str) -> bool + Send + 'static,
) -> Awaited<String> {
    Awaited {
        description: description.into(),
        predicate: Box::new(predicate),
        mapper: Box::new(|line| Ok(line)),
        error: None,
    }
}

impl<T: Send + 'static> Awaited<T> {
    /// Post-process the extracted value.
    pub fn map<U: Send + 'static>(
        self,
        mut f: impl FnMut(T) -> U + Send + 'static,
    ) -> Awaited<U> {
        let mut inner = self.mapper;
        Awaited {
            description: self.description,
            predicate: self.predicate,
            mapper: Box::new(move |line| inner(line).map(&mut f)),
            error: self.error,
        }
    }

    /// Post-process the extracted value with a fallible mapper; an `Err`
    /// completes the promise as failed.
    pub fn try_map<U: Send + 'static, E: Into<BoxError>>(
        self,
        mut f: impl FnMut(T) -> Result<U, E> + Send + 'static,
    ) -> Awaited<U> {
        let mut inner = self.mapper;
        Awaited {
            description: self.description,
            predicate: self.predicate,
            mapper: Box::new(move |line| inner(line).and_then(|v| f(v).map_err(Into::into))),
            error: self.error,
        }
    }

    /// Override the description used in timeout and failure messages.
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub(crate) fn into_probe(self) -> (Box<dyn AwaitProbe>, AwaitHandle<T>) {
        let (tx, rx) = oneshot::channel();
        let handle = AwaitHandle {
            description: self.description.clone(),
            rx,
        };
        let probe = Probe {
            description: self.description,
            predicate: self.predicate,
            mapper: self.mapper,
            tx: Some(tx),
        };
        (Box::new(probe), handle)
    }
}

/// The caller-held end of a line awaiter: a one-shot, first-match-wins
/// promise.
pub struct AwaitHandle<T> {
    description: String,
    rx: oneshot::Receiver<Result<T, AwaitFailure>>,
}

impl<T> AwaitHandle<T> {
    /// Block up to `timeout` for the first matching line.
    pub async fn wait(self, timeout: Duration) -> Result<T, AwaitError> {
        let description = self.description;
        match tokio::time::timeout(timeout, self.rx).await {
            Err(_) => Err(AwaitError::Timeout {
                description,
                ms: timeout.as_millis(),
            }),
            Ok(Err(_closed)) => Err(AwaitError::StreamClosed { description }),
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(source))) => Err(AwaitError::Failed {
                description,
                source,
            }),
        }
    }
}

/// The consumer-held end: observes each line until completed.
pub(crate) trait AwaitProbe: Send {
    fn accept(&mut self, line: &str);
}

struct Probe<T> {
    description: String,
    predicate: Box<dyn FnMut(&str) -> bool + Send>,
    mapper: Mapper<T>,
    tx: Option<oneshot::Sender<Result<T, AwaitFailure>>>,
}

impl<T: Send> AwaitProbe for Probe<T> {
    fn accept(&mut self, line: &str) {
        if self.tx.is_none() {
            return;
        }
        let matched = match catch_unwind(AssertUnwindSafe(|| (self.predicate)(line))) {
            Ok(matched) => matched,
            Err(panic) => {
                self.complete(Err(AwaitFailure(panic_message(panic))));
                return;
            }
        };
        if !matched {
            return;
        }
        let owned = line.to_string();
        match catch_unwind(AssertUnwindSafe(|| (self.mapper)(owned))) {
            Ok(Ok(value)) => self.complete(Ok(value)),
            Ok(Err(err)) => self.complete(Err(AwaitFailure(err.to_string()))),
            Err(panic) => self.complete(Err(AwaitFailure(panic_message(panic)))),
        }
    }
}

impl<T> Probe<T> {
    fn complete(&mut self, outcome: Result<T, AwaitFailure>) {
        if let Some(tx) = self.tx.take() {
            if tx.send(outcome).is_err() {
                tracing::debug!(
                    awaiter = %self.description,
                    "awaiter completed but the handle was dropped"
                );
            }
        }
    }
}

pub(crate) fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
#[path = "awaiter_tests.rs"]
mod tests;
