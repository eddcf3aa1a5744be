/*
 * request.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Request grammar: `path?query#fragment` with NUL escaping.
 */

//! Request grammar.
//!
//! Every stage request and the module resource use the same grammar:
//!
//! ```text
//! request  := path [ query ] [ fragment ]
//! path     := longest prefix without an unescaped `?` or `#`
//! query    := `?` ... up to the first unescaped `#`
//! fragment := `#` ... to the end
//! ```
//!
//! A literal `#` inside the path or query is stored escaped as the two
//! characters `\0#` in canonical request strings, and decoded back to `#`
//! when the request is split into its parts. Multi-stage requests are
//! joined with `$`; the joined form of a whole pipeline uses `!`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::LoaderError;

/// Escape marker placed in front of a literal `#` inside path or query.
pub const ESCAPE_MARKER: char = '\0';

/// Separator between stages in an inbound multi-stage request.
pub const STAGE_SEPARATOR: char = '$';

/// Separator between stage requests (and the resource) in the joined
/// request projections.
pub const REQUEST_SEPARATOR: &str = "!";

static PATH_QUERY_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    // (?s)                      - `.` also matches newlines
    // ((?:\x00.|[^?#\x00])*)    - path: escaped pairs or anything but `?`, `#`, NUL
    // (\?(?:\x00.|[^#\x00])*)?  - query: `?` then escaped pairs or anything but `#`, NUL
    // (#.*)?                    - fragment: the rest
    Regex::new(r"(?s)^((?:\x00.|[^?#\x00])*)(\?(?:\x00.|[^#\x00])*)?(#.*)?$")
        .expect("Invalid regex pattern for request grammar")
});

/// A request split into its three parts.
///
/// Missing parts are empty strings. `path` and `query` hold decoded
/// text (a literal `#` is `#`, not the escaped pair).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RequestParts {
    /// Everything before the query
    pub path: String,
    /// The query including its leading `?`, or empty
    pub query: String,
    /// The fragment including its leading `#`, or empty
    pub fragment: String,
}

impl RequestParts {
    /// Build parts from already-decoded components.
    pub fn new(
        path: impl Into<String>,
        query: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            query: query.into(),
            fragment: fragment.into(),
        }
    }

    /// Split a request string. See [`parse`].
    pub fn parse(input: &str) -> Result<Self, LoaderError> {
        parse(input)
    }

    /// Canonical request string, with `#` escaped inside path and query.
    ///
    /// Re-parsing the result yields the same parts.
    pub fn to_request(&self) -> String {
        format!(
            "{}{}{}",
            escape_request_part(&self.path),
            escape_request_part(&self.query),
            self.fragment
        )
    }

    /// Human-readable request string (no escaping).
    pub fn display(&self) -> String {
        format!("{}{}{}", self.path, self.query, self.fragment)
    }

    /// Check if all three parts are empty.
    pub fn is_empty(&self) -> bool {
        self.path.is_empty() && self.query.is_empty() && self.fragment.is_empty()
    }
}

/// Split `input` into path, query and fragment.
///
/// # Example
///
/// ```
/// use loader_runner::request::parse;
///
/// let parts = parse("a/b?x=1#frag").unwrap();
/// assert_eq!(parts.path, "a/b");
/// assert_eq!(parts.query, "?x=1");
/// assert_eq!(parts.fragment, "#frag");
/// ```
///
/// # Errors
///
/// Returns [`LoaderError::GrammarMismatch`] when the input does not fit the
/// grammar, which only happens for a dangling escape marker.
pub fn parse(input: &str) -> Result<RequestParts, LoaderError> {
    let captures =
        PATH_QUERY_FRAGMENT
            .captures(input)
            .ok_or_else(|| LoaderError::GrammarMismatch {
                input: input.to_string(),
            })?;

    Ok(RequestParts {
        path: captures
            .get(1)
            .map(|m| unescape(m.as_str()))
            .unwrap_or_default(),
        query: captures
            .get(2)
            .map(|m| unescape(m.as_str()))
            .unwrap_or_default(),
        fragment: captures
            .get(3)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
    })
}

/// Escape every `#` in a path or query with the escape marker.
pub fn escape_request_part(part: &str) -> String {
    part.replace('#', "\0#")
}

/// Decode escaped pairs: the escape marker is dropped and the character
/// after it is kept verbatim.
pub fn unescape(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE_MARKER {
            if let Some(next) = chars.next() {
                result.push(next);
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Split a multi-stage request on every unescaped `$`.
///
/// An empty input has no stages.
pub fn split_stages(input: &str) -> Vec<&str> {
    if input.is_empty() {
        return Vec::new();
    }

    let mut stages = Vec::new();
    let mut start = 0;
    let mut chars = input.char_indices();
    while let Some((idx, c)) = chars.next() {
        if c == ESCAPE_MARKER {
            chars.next();
        } else if c == STAGE_SEPARATOR {
            stages.push(&input[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    stages.push(&input[start..]);
    stages
}

/// Directory part of a module path, accepting `/` and `\` separators.
///
/// - `/` stays `/`
/// - a path without any separator is returned unchanged
/// - when the last separator is also the first one (e.g. `/a` or `C:\a`)
///   it is kept
pub fn dirname(path: &str) -> String {
    if path == "/" {
        return "/".to_string();
    }
    let last_slash = path.rfind('/');
    let last_backslash = path.rfind('\\');
    let (idx, first) = match (last_slash, last_backslash) {
        (None, None) => return path.to_string(),
        (Some(i), Some(j)) if j > i => (j, path.find('\\')),
        (Some(i), _) => (i, path.find('/')),
        (None, Some(j)) => (j, path.find('\\')),
    };
    if first == Some(idx) {
        path[..idx + 1].to_string()
    } else {
        path[..idx].to_string()
    }
}
