/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Values passed between loader stages.
 */

//! Values passed between loader stages.
//!
//! Stages exchange a positional argument list, conventionally
//! `[content, source_map, additional_data]`. Each slot is either absent
//! (`None`, "undefined") or holds a [`LoaderValue`]. A JSON `null` is a
//! present value: it counts as a result when a pitch intercepts, but is
//! treated as absent when the final result is normalized.

use std::borrow::Cow;

/// Byte order mark stripped when text is decoded from a buffer.
const BOM: char = '\u{feff}';

/// One positional value.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderValue {
    /// Raw bytes
    Buffer(Vec<u8>),
    /// UTF-8 text
    String(String),
    /// Structured data (source map objects, additional data, ...)
    Json(serde_json::Value),
}

impl LoaderValue {
    /// Check if this value is JSON `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, LoaderValue::Json(serde_json::Value::Null))
    }

    /// Text view of the value. Buffers are decoded lossily, JSON is
    /// serialized.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            LoaderValue::Buffer(bytes) => String::from_utf8_lossy(bytes),
            LoaderValue::String(text) => Cow::Borrowed(text),
            LoaderValue::Json(serde_json::Value::String(text)) => Cow::Borrowed(text),
            LoaderValue::Json(value) => Cow::Owned(value.to_string()),
        }
    }

    /// Byte view of the value. Text is UTF-8 encoded, JSON is serialized.
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            LoaderValue::Buffer(bytes) => Cow::Borrowed(bytes),
            LoaderValue::String(text) => Cow::Borrowed(text.as_bytes()),
            LoaderValue::Json(value) => Cow::Owned(value.to_string().into_bytes()),
        }
    }

    /// Decode a buffer into text, dropping a leading byte order mark.
    fn decode_utf8(bytes: &[u8]) -> String {
        let text = String::from_utf8_lossy(bytes);
        match text.strip_prefix(BOM) {
            Some(stripped) => stripped.to_string(),
            None => text.into_owned(),
        }
    }
}

impl From<String> for LoaderValue {
    fn from(value: String) -> Self {
        LoaderValue::String(value)
    }
}

impl From<&str> for LoaderValue {
    fn from(value: &str) -> Self {
        LoaderValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for LoaderValue {
    fn from(value: Vec<u8>) -> Self {
        LoaderValue::Buffer(value)
    }
}

impl From<&[u8]> for LoaderValue {
    fn from(value: &[u8]) -> Self {
        LoaderValue::Buffer(value.to_vec())
    }
}

impl From<serde_json::Value> for LoaderValue {
    fn from(value: serde_json::Value) -> Self {
        LoaderValue::Json(value)
    }
}

/// Positional argument list exchanged between stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoaderArgs(Vec<Option<LoaderValue>>);

impl LoaderArgs {
    /// An empty argument list (every slot undefined).
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// An argument list holding only content.
    pub fn with_content(content: impl Into<LoaderValue>) -> Self {
        Self(vec![Some(content.into())])
    }

    /// Set the source map slot.
    pub fn and_source_map(self, source_map: impl Into<LoaderValue>) -> Self {
        self.with_slot(1, source_map.into())
    }

    /// Set the additional data slot.
    pub fn and_additional_data(self, data: impl Into<LoaderValue>) -> Self {
        self.with_slot(2, data.into())
    }

    fn with_slot(mut self, index: usize, value: LoaderValue) -> Self {
        if self.0.len() <= index {
            self.0.resize(index + 1, None);
        }
        self.0[index] = Some(value);
        self
    }

    /// Value at a position, if defined.
    pub fn get(&self, index: usize) -> Option<&LoaderValue> {
        self.0.get(index).and_then(Option::as_ref)
    }

    /// The content slot.
    pub fn content(&self) -> Option<&LoaderValue> {
        self.get(0)
    }

    /// The source map slot.
    pub fn source_map(&self) -> Option<&LoaderValue> {
        self.get(1)
    }

    /// The additional data slot.
    pub fn additional_data(&self) -> Option<&LoaderValue> {
        self.get(2)
    }

    /// Number of slots, defined or not.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no slots at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check if at least one slot holds a value.
    ///
    /// A pitch result with a defined value intercepts the pipeline.
    pub fn has_defined(&self) -> bool {
        self.0.iter().any(Option::is_some)
    }

    /// Bring the content slot into the representation a stage expects:
    /// raw stages receive bytes, all others receive text.
    pub fn coerce_content(&mut self, raw: bool) {
        let Some(slot) = self.0.first_mut() else {
            return;
        };
        let coerced = match slot.take() {
            Some(LoaderValue::Buffer(bytes)) if !raw => {
                Some(LoaderValue::String(LoaderValue::decode_utf8(&bytes)))
            }
            Some(LoaderValue::String(text)) if raw => Some(LoaderValue::Buffer(text.into_bytes())),
            other => other,
        };
        *slot = coerced;
    }

    /// Take the three conventional slots out of the list.
    pub fn into_parts(self) -> (Option<LoaderValue>, Option<LoaderValue>, Option<LoaderValue>) {
        let mut slots = self.0.into_iter();
        (
            slots.next().flatten(),
            slots.next().flatten(),
            slots.next().flatten(),
        )
    }
}

impl From<Vec<Option<LoaderValue>>> for LoaderArgs {
    fn from(values: Vec<Option<LoaderValue>>) -> Self {
        Self(values)
    }
}

impl FromIterator<Option<LoaderValue>> for LoaderArgs {
    fn from_iter<T: IntoIterator<Item = Option<LoaderValue>>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Drop absent and `null` values.
fn present(value: Option<LoaderValue>) -> Option<LoaderValue> {
    value.filter(|v| !v.is_null())
}

/// Normalize final content to bytes.
pub(crate) fn normalize_content(value: Option<LoaderValue>) -> Option<Vec<u8>> {
    present(value).map(|v| match v {
        LoaderValue::Buffer(bytes) => bytes,
        LoaderValue::String(text) => text.into_bytes(),
        LoaderValue::Json(json) => json.to_string().into_bytes(),
    })
}

/// Normalize a final source map to its textual JSON encoding.
///
/// Text (or bytes) is taken as already-encoded JSON; structured maps are
/// serialized.
pub(crate) fn normalize_source_map(value: Option<LoaderValue>) -> Option<Vec<u8>> {
    present(value).map(|v| match v {
        LoaderValue::Buffer(bytes) => bytes,
        LoaderValue::String(text) => text.into_bytes(),
        LoaderValue::Json(serde_json::Value::String(text)) => text.into_bytes(),
        LoaderValue::Json(json) => json.to_string().into_bytes(),
    })
}

/// Normalize final additional data to its JSON encoding.
pub(crate) fn normalize_additional_data(value: Option<LoaderValue>) -> Option<Vec<u8>> {
    present(value).map(|v| {
        let json = match v {
            LoaderValue::Buffer(bytes) => serde_json::Value::from(bytes),
            LoaderValue::String(text) => serde_json::Value::String(text),
            LoaderValue::Json(json) => json,
        };
        json.to_string().into_bytes()
    })
}
