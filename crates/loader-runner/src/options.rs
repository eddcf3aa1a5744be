/*
 * options.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Compiler options visible to loader stages.
 */

//! Runner options.
//!
//! The subset of compiler options a loader run needs. Options are
//! normalized by the compiler; the runner only reads them.
//!
//! ```yaml
//! devtool: cheap-module-source-map
//! mode: development
//! hot: true
//! context: /project
//! hashFunction: sha256
//! nestingLimit: 1000
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default depth of the nested-compilation chain.
pub const DEFAULT_NESTING_LIMIT: usize = 1000;

/// Default hash function for `utils().create_hash`.
pub const DEFAULT_HASH_FUNCTION: &str = "sha256";

/// Errors loading runner options.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// JSON text could not be decoded
    #[error("Invalid runner options (JSON): {0}")]
    Json(#[from] serde_json::Error),

    /// YAML text could not be decoded
    #[error("Invalid runner options (YAML): {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Options shared by every run of a compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerOptions {
    /// Devtool setting (e.g. `"source-map"`, `"eval-cheap-source-map"`)
    pub devtool: Option<String>,
    /// Build mode (`"development"`, `"production"`, `"none"`)
    pub mode: Option<String>,
    /// Hot module replacement enabled
    pub hot: bool,
    /// Root context directory of the compiler
    pub context: PathBuf,
    /// Hash algorithm used by `create_hash` when none is named
    pub hash_function: String,
    /// Maximum depth of the nested-compilation chain
    pub nesting_limit: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            devtool: None,
            mode: None,
            hot: false,
            context: PathBuf::new(),
            hash_function: DEFAULT_HASH_FUNCTION.to_string(),
            nesting_limit: DEFAULT_NESTING_LIMIT,
        }
    }
}

impl RunnerOptions {
    /// Decode options from JSON text.
    pub fn from_json_str(input: &str) -> Result<Self, OptionsError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Decode options from YAML text.
    pub fn from_yaml_str(input: &str) -> Result<Self, OptionsError> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Set the devtool.
    pub fn with_devtool(mut self, devtool: impl Into<String>) -> Self {
        self.devtool = Some(devtool.into());
        self
    }

    /// Set the root context.
    pub fn with_context(mut self, context: impl Into<PathBuf>) -> Self {
        self.context = context.into();
        self
    }

    /// Whether stages should produce full source maps.
    ///
    /// True when the devtool asks for a source map that is either
    /// module-level or not cheap.
    pub fn use_source_map(&self) -> bool {
        let devtool = self.devtool.as_deref().unwrap_or_default();
        devtool.contains("source-map") && (devtool.contains("module") || !devtool.contains("cheap"))
    }

    /// Whether stages should produce line-only ("cheap") source maps.
    pub fn use_simple_source_map(&self) -> bool {
        let devtool = self.devtool.as_deref().unwrap_or_default();
        devtool.contains("source-map") && !self.use_source_map()
    }
}
