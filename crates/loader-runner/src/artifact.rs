/*
 * artifact.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * In-memory storage for files emitted by loader stages.
 */

//! Emitted assets.
//!
//! Stages emit files through [`LoaderContext::emit_file`]. Each emitted
//! file carries one of three encodings:
//! - plain bytes
//! - bytes plus a textual original-source map
//! - bytes plus a structured source-map object
//!
//! [`AssetStore`] is an in-memory [`AssetEmitter`] that keeps every
//! emission in order. Names are not unique: emitting the same name twice
//! keeps both entries.
//!
//! [`LoaderContext::emit_file`]: crate::runner::context::LoaderContext::emit_file

use std::sync::{Mutex, PoisonError};

use crate::collaborators::AssetEmitter;

/// Encoded content of an emitted asset.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetSource {
    /// Bytes without a source map
    Raw {
        /// Asset content
        content: Vec<u8>,
    },
    /// Bytes with a textual original-source map
    Original {
        /// Asset content
        content: Vec<u8>,
        /// Source map text, with paths made relative to the module context
        source_map: String,
    },
    /// Bytes with a structured source map
    SourceMap {
        /// Asset content
        content: Vec<u8>,
        /// Name the map is attached to
        name: String,
        /// The source map object
        source_map: serde_json::Value,
    },
}

impl AssetSource {
    /// Asset content, regardless of encoding.
    pub fn content(&self) -> &[u8] {
        match self {
            AssetSource::Raw { content }
            | AssetSource::Original { content, .. }
            | AssetSource::SourceMap { content, .. } => content,
        }
    }

    /// Get content as UTF-8 string (lossy conversion for non-UTF8 data)
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(self.content()).into_owned()
    }

    /// Check if a source map is attached.
    pub fn has_source_map(&self) -> bool {
        !matches!(self, AssetSource::Raw { .. })
    }
}

/// One emitted asset.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedAsset {
    /// Asset name (output-relative file name)
    pub name: String,
    /// Encoded content
    pub source: AssetSource,
    /// Optional asset info for downstream consumers
    pub info: Option<serde_json::Value>,
}

/// In-memory asset storage, in emission order.
#[derive(Debug, Default)]
pub struct AssetStore {
    assets: Mutex<Vec<EmittedAsset>>,
}

impl AssetStore {
    /// Create a new empty asset store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all emitted assets.
    pub fn assets(&self) -> Vec<EmittedAsset> {
        self.lock().clone()
    }

    /// All assets emitted under a name, in emission order.
    pub fn get(&self, name: &str) -> Vec<EmittedAsset> {
        self.lock()
            .iter()
            .filter(|asset| asset.name == name)
            .cloned()
            .collect()
    }

    /// Check if an asset with the name was emitted.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().iter().any(|asset| asset.name == name)
    }

    /// Names of all emitted assets, duplicates included.
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|asset| asset.name.clone()).collect()
    }

    /// Get the number of emitted assets.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove all assets
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EmittedAsset>> {
        self.assets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AssetEmitter for AssetStore {
    fn emit_asset(&self, name: &str, source: AssetSource, info: Option<serde_json::Value>) {
        self.lock().push(EmittedAsset {
            name: name.to_string(),
            source,
            info,
        });
    }
}
