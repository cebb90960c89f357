//! Progress reporting for export and restore operations.
//!
//! The sink is advisory: a missing sink changes nothing about an operation's
//! behaviour or outcome. Within one operation the reported percentage never
//! goes down.

use serde::{Deserialize, Serialize};

/// Receives `(message, percent)` updates.
pub trait ProgressSink {
    fn report(&self, message: &str, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(&str, u8),
{
    fn report(&self, message: &str, percent: u8) {
        self(message, percent)
    }
}

/// Last reported state of an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub message: String,
    pub percent: u8,
}

/// Per-operation reporter enforcing the non-decreasing percentage.
pub struct ProgressReporter<'a> {
    sink: Option<&'a dyn ProgressSink>,
    percent: u8,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: Option<&'a dyn ProgressSink>) -> Self {
        Self { sink, percent: 0 }
    }

    pub fn silent() -> Self {
        Self::new(None)
    }

    /// Report a message at `percent`, clamped to `[last, 100]`.
    pub fn update(&mut self, message: impl AsRef<str>, percent: u8) {
        self.percent = self.percent.max(percent.min(100));
        self.emit(message.as_ref());
    }

    /// Report a message without moving the percentage.
    pub fn message(&mut self, message: impl AsRef<str>) {
        self.emit(message.as_ref());
    }

    /// Percentage for item `index` of `total` spread over `[base, base + span]`.
    pub fn step(base: u8, span: u8, index: usize, total: usize) -> u8 {
        if total == 0 {
            return base.saturating_add(span);
        }
        let offset = (index.min(total) * span as usize) / total;
        base.saturating_add(offset as u8)
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    fn emit(&self, message: &str) {
        tracing::debug!("[Progress] {}% - {}", self.percent, message);
        if let Some(sink) = self.sink {
            sink.report(message, self.percent);
        }
    }
}
