//! Optional diagnostic event sink.
//!
//! The adapter and storage methods report notable events through an
//! [`EventSink`] when one is attached. Nothing in the core requires a sink.

use log::{debug, warn};
use std::sync::Arc;

/// Shared handle to a sink, cloned into connections and storage methods.
pub type SharedSink = Arc<dyn EventSink>;

/// Severity of a diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Debug,
    Warning,
}

/// One diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub level: EventLevel,
    /// Stable event name, e.g. `statement_failed`.
    pub name: &'static str,
    pub provider: &'static str,
    pub detail: String,
}

impl DiagnosticEvent {
    pub fn debug(name: &'static str, provider: &'static str, detail: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Debug,
            name,
            provider,
            detail: detail.into(),
        }
    }

    pub fn warning(name: &'static str, provider: &'static str, detail: impl Into<String>) -> Self {
        Self {
            level: EventLevel::Warning,
            name,
            provider,
            detail: detail.into(),
        }
    }
}

/// Receiver of diagnostic events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &DiagnosticEvent);
}

/// Sink that forwards every event to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: &DiagnosticEvent) {
        match event.level {
            EventLevel::Debug => debug!(
                "event={} module=diagnostics status=ok provider={} detail={}",
                event.name, event.provider, event.detail
            ),
            EventLevel::Warning => warn!(
                "event={} module=diagnostics status=error provider={} detail={}",
                event.name, event.provider, event.detail
            ),
        }
    }
}

/// Records `event` when a sink is attached.
pub(crate) fn emit(sink: Option<&SharedSink>, event: DiagnosticEvent) {
    if let Some(sink) = sink {
        sink.record(&event);
    }
}
