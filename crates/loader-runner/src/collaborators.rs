/*
 * collaborators.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Capabilities injected into a loader run by the embedding compiler.
 */

//! Injected capabilities.
//!
//! The runner never reaches into the compiler directly. Everything it
//! needs from the outside world arrives through one of these traits:
//!
//! - [`ReferenceTable`] - options objects referenced by `??ident` queries
//! - [`Resolver`] - module resolution for stages
//! - [`Compilation`] - loader hooks of the (possibly nested) compilation
//! - [`AssetEmitter`] - files emitted by stages
//!
//! The diagnostics sink lives in `loader_diagnostics`, the implementation
//! loader in [`crate::implementation`].

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;

use crate::artifact::AssetSource;
use crate::error::StageError;
use crate::runner::context::LoaderContext;

/// Lookup of options objects by ident.
///
/// Stage requests of the form `path??ident` take their options from this
/// table. The table is read-only for the duration of a run.
pub trait ReferenceTable: Send + Sync {
    /// Options registered under `ident`, if any.
    fn lookup(&self, ident: &str) -> Option<serde_json::Value>;
}

impl<S: BuildHasher + Send + Sync> ReferenceTable for HashMap<String, serde_json::Value, S> {
    fn lookup(&self, ident: &str) -> Option<serde_json::Value> {
        self.get(ident).cloned()
    }
}

/// Module resolution.
pub trait Resolver: Send + Sync {
    /// Resolve `request` relative to the directory `context`, returning an
    /// absolute path.
    fn resolve(&self, context: &str, request: &str) -> Result<String, StageError>;

    /// A resolver configured with extra options.
    ///
    /// Returns `None` when options make no difference, in which case the
    /// base resolver is used as is.
    fn with_options(&self, _options: &serde_json::Value) -> Option<Arc<dyn Resolver>> {
        None
    }
}

/// Resolver used when the embedder provides none. Every resolution fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedResolver;

impl Resolver for UnsupportedResolver {
    fn resolve(&self, _context: &str, request: &str) -> Result<String, StageError> {
        Err(anyhow::anyhow!(
            "Can't resolve '{request}': no resolver configured"
        ))
    }
}

/// A (possibly nested) compilation whose loader hooks run before the
/// stages.
///
/// Hooks of the innermost compilation run first, then its parent's, and so
/// on up the chain.
pub trait Compilation: Send + Sync {
    /// Run this compilation's loader hooks against the context.
    fn run_loader_hooks(&self, ctx: &mut LoaderContext);

    /// The compilation this one is nested in.
    fn parent(&self) -> Option<Arc<dyn Compilation>>;
}

/// Receiver of files emitted by stages.
pub trait AssetEmitter: Send + Sync {
    /// Emit a named asset.
    fn emit_asset(&self, name: &str, source: AssetSource, info: Option<serde_json::Value>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hashmap_reference_table() {
        let mut table = HashMap::new();
        table.insert("ref1".to_string(), json!({"a": 1}));
        assert_eq!(table.lookup("ref1"), Some(json!({"a": 1})));
        assert_eq!(table.lookup("ref2"), None);
    }

    #[test]
    fn test_unsupported_resolver_fails() {
        let resolver = UnsupportedResolver;
        let err = resolver.resolve("/src", "./dep").unwrap_err();
        assert!(err.to_string().contains("./dep"));
        assert!(resolver.with_options(&json!({})).is_none());
    }
}
