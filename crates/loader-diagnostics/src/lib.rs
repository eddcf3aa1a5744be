//! Diagnostic messages reported while running loader pipelines.
//!
//! Stages running inside a loader pipeline report non-fatal problems
//! (warnings and recoverable errors) rather than failing the run. Those
//! reports are shaped as a [`DiagnosticMessage`] and handed to a
//! [`DiagnosticsSink`], which the embedding compiler owns.
//!
//! # Key Types
//!
//! - [`DiagnosticMessage`]: kind, title and message text of one report
//! - [`DiagnosticKind`]: Error, Warning, Info, Note
//! - [`DiagnosticsSink`]: the capability a pipeline reports into
//! - [`CollectingSink`]: keeps every report in memory (tests, batch tools)
//! - [`TracingSink`]: forwards every report to `tracing`
//!
//! # Example
//!
//! ```
//! use loader_diagnostics::{CollectingSink, DiagnosticKind, DiagnosticsSink};
//!
//! let sink = CollectingSink::new();
//! sink.record(DiagnosticKind::Warning, "Module Warning", "unused export\n(from: ./a-loader)");
//!
//! let reports = sink.diagnostics();
//! assert_eq!(reports.len(), 1);
//! assert_eq!(reports[0].title, "Module Warning");
//! ```

pub mod diagnostic;
pub mod sink;

pub use diagnostic::{DiagnosticKind, DiagnosticMessage};
pub use sink::{CollectingSink, DiagnosticsSink, TracingSink};
