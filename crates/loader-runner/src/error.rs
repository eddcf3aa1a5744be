/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Error types for loader pipeline runs.
 */

//! Error types for loader pipeline runs.
//!
//! [`LoaderError`] is the single failure value a run delivers to its
//! caller. [`DoubleCompletionDefect`] is deliberately *not* part of it: a
//! stage completing twice is a programming defect and is raised as a panic.

use thiserror::Error;

/// Errors raised by stage functions and injected collaborators.
///
/// Stage authors can use `?` on any error type.
pub type StageError = anyhow::Error;

/// Sentinel ident written by rule compilers when a referenced options
/// object had no `ident`.
pub const MISSING_IDENT: &str = "[[missing ident]]";

/// Failure of a loader pipeline run.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A request string did not fit the `path?query#fragment` grammar.
    #[error("Request does not match the path/query/fragment grammar: {input:?}")]
    GrammarMismatch {
        /// The offending request
        input: String,
    },

    /// A `??` query referenced the missing-ident sentinel.
    #[error(
        "No ident is provided by referenced loader. When using a function for Rule.use in config you need to provide an 'ident' property for referenced loader options."
    )]
    MissingIdent,

    /// A `??` query referenced an ident the reference table doesn't know.
    #[error("Invalid ident is provided by referenced loader: {ident}")]
    UnknownIdent {
        /// The unresolved ident
        ident: String,
    },

    /// A structured stage request without a `loader`.
    #[error("request should be a string or object with loader and options ({value})")]
    InvalidStageObject {
        /// JSON form of the rejected request object
        value: String,
    },

    /// A stage's implementation could not be loaded.
    #[error("Failed to load loader {request}: {source:#}")]
    ImplementationLoad {
        /// Display form of the stage request
        request: String,
        /// Error reported by the implementation loader
        #[source]
        source: StageError,
    },

    /// A stage failed before completing.
    #[error("{source:#}")]
    StageExecution {
        /// Display form of the failing stage request
        request: String,
        /// Error thrown or delivered by the stage
        #[source]
        source: StageError,
    },

    /// The nested-compilation chain is deeper than allowed.
    #[error("Too many nested child compiler, exceeded max limitation {limit}")]
    NestingLimitExceeded {
        /// The configured maximum depth
        limit: usize,
    },

    /// Inbound source map or additional data is not valid JSON.
    #[error("Invalid {what} passed to loader runner: {source}")]
    InvalidInput {
        /// Which input was rejected
        what: &'static str,
        /// The decoding error
        #[source]
        source: serde_json::Error,
    },
}

impl LoaderError {
    /// Create a StageExecution error.
    pub fn stage(request: impl Into<String>, source: StageError) -> Self {
        Self::StageExecution {
            request: request.into(),
            source,
        }
    }

    /// Check if this error happened while constructing stage descriptors.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Self::GrammarMismatch { .. }
                | Self::MissingIdent
                | Self::UnknownIdent { .. }
                | Self::InvalidStageObject { .. }
        )
    }

    /// The stage request involved in this error, if any.
    pub fn stage_request(&self) -> Option<&str> {
        match self {
            Self::ImplementationLoad { request, .. } | Self::StageExecution { request, .. } => {
                Some(request)
            }
            _ => None,
        }
    }
}

/// A stage signalled completion a second time.
///
/// Raised as a panic whose message is this value's `Display`, never as a
/// [`LoaderError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoubleCompletionDefect {
    /// Which entry point was called again: `"callback"` or `"async"`
    pub entry: &'static str,
    /// Display form of the stage request, when known
    pub request: Option<String>,
}

impl std::fmt::Display for DoubleCompletionDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(): The callback was already called.", self.entry)?;
        if let Some(request) = &self.request {
            write!(f, " (from: {})", request)?;
        }
        Ok(())
    }
}

impl std::error::Error for DoubleCompletionDefect {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_errors() {
        assert!(LoaderError::MissingIdent.is_construction_error());
        assert!(
            LoaderError::UnknownIdent {
                ident: "x".to_string()
            }
            .is_construction_error()
        );
        assert!(!LoaderError::NestingLimitExceeded { limit: 1000 }.is_construction_error());
    }

    #[test]
    fn test_stage_error_display_keeps_chain() {
        let source = anyhow::anyhow!("inner").context("outer");
        let err = LoaderError::stage("./a-loader?x=1", source);
        assert_eq!(err.to_string(), "outer: inner");
        assert_eq!(err.stage_request(), Some("./a-loader?x=1"));
    }

    #[test]
    fn test_nesting_limit_display() {
        let err = LoaderError::NestingLimitExceeded { limit: 1000 };
        assert!(err.to_string().contains("exceeded max limitation 1000"));
    }

    #[test]
    fn test_double_completion_display() {
        let defect = DoubleCompletionDefect {
            entry: "callback",
            request: Some("./a-loader".to_string()),
        };
        assert_eq!(
            defect.to_string(),
            "callback(): The callback was already called. (from: ./a-loader)"
        );
    }
}
