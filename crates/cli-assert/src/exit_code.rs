//! Exit-code assertion: recorded once after the child is reaped, evaluated
//! into the collector with the rest of the verdict.

use crate::collector::Collector;
use crate::line_assert::expand_template;

/// What the exit code must look like.
pub(crate) enum ExitCodeExpect {
    Is(i32),
    AnyOf(Vec<i32>),
    Satisfies {
        predicate: Box<dyn Fn(i32) -> bool + Send>,
        template: String,
    },
}

impl Default for ExitCodeExpect {
    fn default() -> Self {
        ExitCodeExpect::Is(0)
    }
}

impl std::fmt::Debug for ExitCodeExpect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCodeExpect::Is(code) => write!(f, "Is({code})"),
            ExitCodeExpect::AnyOf(codes) => write!(f, "AnyOf({codes:?})"),
            ExitCodeExpect::Satisfies { template, .. } => {
                write!(f, "Satisfies({template:?})")
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ExitCodeAssert {
    expect: ExitCodeExpect,
    recorded: Option<i32>,
}

impl ExitCodeAssert {
    pub(crate) fn new(expect: ExitCodeExpect) -> Self {
        Self {
            expect,
            recorded: None,
        }
    }

    /// Called exactly once, after a successful wait.
    pub(crate) fn record(&mut self, exit_code: i32) {
        debug_assert!(self.recorded.is_none(), "exit code recorded twice");
        self.recorded = Some(exit_code);
    }

    /// No-op when nothing was recorded (the timed-out path never records).
    pub(crate) fn evaluate(&self, collector: &mut Collector) {
        let Some(actual) = self.recorded else {
            return;
        };
        match &self.expect {
            ExitCodeExpect::Is(expected) => {
                if actual != *expected {
                    collector.failure(None, format!("Expected exit code {expected} but was {actual}"));
                }
            }
            ExitCodeExpect::AnyOf(expected) => {
                if !expected.contains(&actual) {
                    let list = expected
                        .iter()
                        .map(i32::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    collector.failure(
                        None,
                        format!("Expected any of exit codes {list} but was {actual}"),
                    );
                }
            }
            ExitCodeExpect::Satisfies {
                predicate,
                template,
            } => {
                if !predicate(actual) {
                    collector.failure(None, expand_template(template, "", &actual.to_string()));
                }
            }
        }
    }
}
