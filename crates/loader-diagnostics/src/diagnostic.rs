//! Core diagnostic message types.
//!
//! This module defines the structures for representing diagnostic messages
//! (errors, warnings, info) produced by loader stages.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// The kind of diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// An error reported by a stage without failing the run
    Error,
    /// A warning that doesn't prevent completion but indicates a problem
    Warning,
    /// Informational message
    Info,
    /// A note providing additional context
    Note,
}

impl DiagnosticKind {
    /// Severity tag as forwarded to the compiler ("error", "warning", ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Info => "info",
            DiagnosticKind::Note => "note",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "Error",
            DiagnosticKind::Warning => "Warning",
            DiagnosticKind::Info => "Info",
            DiagnosticKind::Note => "Note",
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single diagnostic report.
///
/// The message text is already annotated with the stage that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticMessage {
    /// Brief title for the diagnostic (e.g. "Module Error")
    pub title: String,

    /// The kind of diagnostic (Error, Warning, Info)
    pub kind: DiagnosticKind,

    /// Message body
    pub message: String,
}

impl DiagnosticMessage {
    /// Create a new diagnostic message.
    pub fn new(kind: DiagnosticKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            kind,
            message: message.into(),
        }
    }

    /// Render this diagnostic as plain text.
    ///
    /// Format:
    /// ```text
    /// Warning: Module Warning
    /// message line 1
    /// message line 2
    /// ```
    ///
    /// # Example
    ///
    /// ```
    /// use loader_diagnostics::{DiagnosticKind, DiagnosticMessage};
    ///
    /// let msg = DiagnosticMessage::new(DiagnosticKind::Error, "Module Error", "boom\n(from: ./a-loader)");
    /// let text = msg.to_text();
    /// assert!(text.starts_with("Error: Module Error\n"));
    /// assert!(text.ends_with("(from: ./a-loader)"));
    /// ```
    pub fn to_text(&self) -> String {
        let mut result = String::new();
        let _ = write!(result, "{}: {}", self.kind.label(), self.title);
        if !self.message.is_empty() {
            result.push('\n');
            result.push_str(&self.message);
        }
        result
    }
}

impl std::fmt::Display for DiagnosticMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}
