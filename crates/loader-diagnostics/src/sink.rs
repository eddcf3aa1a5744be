//! Diagnostics sinks.
//!
//! A [`DiagnosticsSink`] is the capability through which a running
//! pipeline reports warnings and non-fatal errors. The sink is owned by
//! the embedding compiler; the pipeline only ever appends to it.

use std::sync::{Mutex, PoisonError};

use crate::diagnostic::{DiagnosticKind, DiagnosticMessage};

/// Receiver of diagnostics reported by pipeline stages.
///
/// Implementations must be `Send + Sync` since a sink is shared between
/// the pipeline context and asynchronous stage work.
pub trait DiagnosticsSink: Send + Sync {
    /// Record one diagnostic with a severity tag, a title and a message.
    fn record(&self, kind: DiagnosticKind, title: &str, message: &str);
}

/// Sink that keeps every diagnostic in memory, in report order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<DiagnosticMessage>>,
}

impl CollectingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn diagnostics(&self) -> Vec<DiagnosticMessage> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the recorded diagnostics of one kind.
    pub fn of_kind(&self, kind: DiagnosticKind) -> Vec<DiagnosticMessage> {
        self.diagnostics()
            .into_iter()
            .filter(|d| d.kind == kind)
            .collect()
    }

    /// Number of recorded diagnostics.
    pub fn len(&self) -> usize {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain all recorded diagnostics.
    pub fn take(&self) -> Vec<DiagnosticMessage> {
        std::mem::take(
            &mut *self
                .diagnostics
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }
}

impl DiagnosticsSink for CollectingSink {
    fn record(&self, kind: DiagnosticKind, title: &str, message: &str) {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DiagnosticMessage::new(kind, title, message));
    }
}

/// Sink that forwards every diagnostic to `tracing`.
///
/// Errors are emitted at `error` level, warnings at `warn`, everything
/// else at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create a new tracing sink.
    pub fn new() -> Self {
        Self
    }
}

impl DiagnosticsSink for TracingSink {
    fn record(&self, kind: DiagnosticKind, title: &str, message: &str) {
        let text = DiagnosticMessage::new(kind, title, message).to_text();
        match kind {
            DiagnosticKind::Error => tracing::error!(diagnostic.kind = kind.as_str(), "{}", text),
            DiagnosticKind::Warning => tracing::warn!(diagnostic.kind = kind.as_str(), "{}", text),
            DiagnosticKind::Info | DiagnosticKind::Note => {
                tracing::info!(diagnostic.kind = kind.as_str(), "{}", text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        assert!(sink.is_empty());

        sink.record(DiagnosticKind::Warning, "Module Warning", "first");
        sink.record(DiagnosticKind::Error, "Module Error", "second");
        sink.record(DiagnosticKind::Warning, "Module Warning", "third");

        let all = sink.diagnostics();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].message, "first");
        assert_eq!(all[1].message, "second");
        assert_eq!(all[2].message, "third");

        let warnings = sink.of_kind(DiagnosticKind::Warning);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_collecting_sink_take_drains() {
        let sink = CollectingSink::new();
        sink.record(DiagnosticKind::Error, "Module Error", "boom");
        let drained = sink.take();
        assert_eq!(drained.len(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_sinks_are_object_safe() {
        let sinks: Vec<Arc<dyn DiagnosticsSink>> =
            vec![Arc::new(CollectingSink::new()), Arc::new(TracingSink::new())];
        for sink in &sinks {
            sink.record(DiagnosticKind::Info, "Info", "hello");
        }
    }
}
