/*
 * runner/observer.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Loader run observer for tracing and progress reporting.
 */

//! Observer abstraction for loader run events.
//!
//! The [`LoaderObserver`] trait lets an embedder follow a run (stage
//! starts, completions, interceptions, failures) without the runner
//! depending on a specific observability backend.

use crate::error::LoaderError;

/// Direction a stage is visited in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Left-to-right pass over `pitch` functions
    Pitch,
    /// Right-to-left pass over `normal` functions
    Normal,
}

impl Phase {
    /// Convert to a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pitch => "pitch",
            Phase::Normal => "normal",
        }
    }
}

/// Event severity level for run events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    /// Very detailed information for debugging
    Trace,
    /// Debug-level information
    Debug,
    /// Informational messages
    Info,
    /// Warnings that don't prevent execution
    Warn,
}

impl EventLevel {
    /// Convert to a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Trace => "trace",
            EventLevel::Debug => "debug",
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
        }
    }
}

/// Observer for loader run events.
///
/// All methods have empty default implementations, allowing observers
/// to implement only the events they care about.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: a runner, and its observer, may
/// be shared by concurrent runs of different modules.
pub trait LoaderObserver: Send + Sync {
    /// Called when a stage function is about to run.
    ///
    /// # Arguments
    ///
    /// * `phase` - Which pass is running
    /// * `request` - Display form of the stage request
    /// * `index` - Zero-based index of the stage
    /// * `total` - Number of stages in the run
    fn on_stage_start(&self, _phase: Phase, _request: &str, _index: usize, _total: usize) {}

    /// Called when a stage function completed.
    fn on_stage_complete(&self, _phase: Phase, _request: &str, _index: usize, _total: usize) {}

    /// Called when a stage failed (loading or running).
    fn on_stage_error(&self, _phase: Phase, _request: &str, _index: usize, _error: &LoaderError) {}

    /// Called when a pitch result short-circuits the pipeline.
    fn on_intercept(&self, _request: &str, _index: usize) {}

    /// Called for arbitrary events during a run.
    fn on_event(&self, _message: &str, _level: EventLevel) {}

    /// Called when a run starts.
    ///
    /// # Arguments
    ///
    /// * `resource` - The module resource
    /// * `total_stages` - Number of stages in the run
    fn on_run_start(&self, _resource: &str, _total_stages: usize) {}

    /// Called when a run delivered a result.
    fn on_run_complete(&self, _resource: &str) {}

    /// Called when a run failed.
    fn on_run_error(&self, _resource: &str, _error: &LoaderError) {}
}

/// No-op observer implementation.
///
/// The default observer used when no other is specified.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl NoopObserver {
    /// Create a new no-op observer.
    pub fn new() -> Self {
        Self
    }
}

impl LoaderObserver for NoopObserver {}

/// Tracing observer that emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TracingObserver {
    /// Create a new tracing observer.
    pub fn new() -> Self {
        Self
    }
}

impl LoaderObserver for TracingObserver {
    fn on_stage_start(&self, phase: Phase, request: &str, index: usize, total: usize) {
        tracing::debug!(
            phase = phase.as_str(),
            stage.request = request,
            stage.index = index,
            stage.total = total,
            "Starting stage"
        );
    }

    fn on_stage_complete(&self, phase: Phase, request: &str, index: usize, total: usize) {
        tracing::debug!(
            phase = phase.as_str(),
            stage.request = request,
            stage.index = index,
            stage.total = total,
            "Completed stage"
        );
    }

    fn on_stage_error(&self, phase: Phase, request: &str, index: usize, error: &LoaderError) {
        tracing::error!(
            phase = phase.as_str(),
            stage.request = request,
            stage.index = index,
            error = %error,
            "Stage failed"
        );
    }

    fn on_intercept(&self, request: &str, index: usize) {
        tracing::debug!(
            stage.request = request,
            stage.index = index,
            "Pitch intercepted pipeline"
        );
    }

    fn on_event(&self, message: &str, level: EventLevel) {
        match level {
            EventLevel::Trace => tracing::trace!("{}", message),
            EventLevel::Debug => tracing::debug!("{}", message),
            EventLevel::Info => tracing::info!("{}", message),
            EventLevel::Warn => tracing::warn!("{}", message),
        }
    }

    fn on_run_start(&self, resource: &str, total_stages: usize) {
        tracing::info!(resource, total_stages, "Starting loader run");
    }

    fn on_run_complete(&self, resource: &str) {
        tracing::info!(resource, "Loader run completed");
    }

    fn on_run_error(&self, resource: &str, error: &LoaderError) {
        tracing::error!(resource, error = %error, "Loader run failed");
    }
}

/// Macro for emitting events through a loader context's observer.
///
/// # Examples
///
/// ```ignore
/// trace_event!(ctx, EventLevel::Debug, "Resolved {} stages", count);
/// ```
#[macro_export]
macro_rules! trace_event {
    ($ctx:expr, $level:expr, $($arg:tt)*) => {{
        $ctx.observer().on_event(&format!($($arg)*), $level);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test observer that counts events
    #[derive(Default)]
    struct CountingObserver {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        intercepts: AtomicUsize,
        events: AtomicUsize,
    }

    impl LoaderObserver for CountingObserver {
        fn on_stage_start(&self, _phase: Phase, _request: &str, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_complete(&self, _phase: Phase, _request: &str, _index: usize, _total: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_error(&self, _phase: Phase, _request: &str, _index: usize, _error: &LoaderError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_intercept(&self, _request: &str, _index: usize) {
            self.intercepts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_event(&self, _message: &str, _level: EventLevel) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_observer() {
        let observer = NoopObserver::new();
        let error = LoaderError::MissingIdent;
        observer.on_stage_start(Phase::Pitch, "a", 0, 1);
        observer.on_stage_complete(Phase::Pitch, "a", 0, 1);
        observer.on_stage_error(Phase::Normal, "a", 0, &error);
        observer.on_intercept("a", 0);
        observer.on_event("test message", EventLevel::Info);
        observer.on_run_start("/r.js", 1);
        observer.on_run_complete("/r.js");
        observer.on_run_error("/r.js", &error);
    }

    #[test]
    fn test_counting_observer() {
        let observer = Arc::new(CountingObserver::default());
        let error = LoaderError::MissingIdent;

        observer.on_stage_start(Phase::Pitch, "a", 0, 2);
        observer.on_stage_start(Phase::Normal, "b", 1, 2);
        observer.on_stage_complete(Phase::Pitch, "a", 0, 2);
        observer.on_stage_error(Phase::Normal, "b", 1, &error);
        observer.on_intercept("a", 0);
        observer.on_event("message", EventLevel::Debug);

        assert_eq!(observer.starts.load(Ordering::SeqCst), 2);
        assert_eq!(observer.completes.load(Ordering::SeqCst), 1);
        assert_eq!(observer.errors.load(Ordering::SeqCst), 1);
        assert_eq!(observer.intercepts.load(Ordering::SeqCst), 1);
        assert_eq!(observer.events.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_as_str() {
        assert_eq!(Phase::Pitch.as_str(), "pitch");
        assert_eq!(Phase::Normal.as_str(), "normal");
        assert_eq!(EventLevel::Warn.as_str(), "warn");
    }
}
