//! Leveled event sink.
//!
//! Components report membership changes, retries and failures through
//! [`EventSink`] rather than calling `tracing` directly, so the sink can be
//! swapped out (tests record events; production forwards to `tracing`).
//! Emission is fire-and-forget: implementations must not block or panic.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, level: Level, message: &str, detail: Value);

    fn info(&self, message: &str, detail: Value) {
        self.emit(Level::Info, message, detail);
    }

    fn warn(&self, message: &str, detail: Value) {
        self.emit(Level::Warn, message, detail);
    }

    fn error(&self, message: &str, detail: Value) {
        self.emit(Level::Error, message, detail);
    }
}

/// Forwards events to the process-wide `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, level: Level, message: &str, detail: Value) {
        match level {
            Level::Info => tracing::info!(target: "huddle::events", %detail, "{message}"),
            Level::Warn => tracing::warn!(target: "huddle::events", %detail, "{message}"),
            Level::Error => tracing::error!(target: "huddle::events", %detail, "{message}"),
        }
    }
}

/// Truncate to at most `max` characters on a char boundary, for log previews.
pub(crate) fn preview(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
