/*
 * implementation.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Stage implementations and the capability that loads them.
 */

//! Stage implementations.
//!
//! A stage's implementation is a pair of optional functions, `pitch` and
//! `normal`, plus a `raw` flag selecting whether the normal function wants
//! its content as bytes. Implementations are produced by an
//! [`ImplementationLoader`] and cached on the stage descriptor after the
//! first successful load.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::descriptor::StageDescriptor;
use crate::error::StageError;
use crate::runner::context::LoaderContext;
use crate::value::LoaderArgs;

/// Arguments handed to a pitch function.
///
/// The stage's per-stage data bag is reachable through
/// [`LoaderContext::data_mut`]; it is reset to an empty map right before
/// the pitch runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PitchArgs {
    /// Requests of all later stages plus the resource
    pub remaining_request: String,
    /// Requests of all earlier stages
    pub previous_request: String,
}

/// What a stage function hands back when it returns.
///
/// A stage that switched to asynchronous completion (or already called
/// [`LoaderContext::callback`]) has its returned value ignored.
pub enum StageOutput {
    /// The stage finished synchronously with these values.
    Values(LoaderArgs),
    /// The stage finishes when this future resolves. The future reaches
    /// the run through a [`LoaderContext::handle`] taken before returning.
    Future(BoxFuture<'static, Result<LoaderArgs, StageError>>),
}

impl StageOutput {
    /// A synchronous result with every slot undefined.
    pub fn none() -> Self {
        StageOutput::Values(LoaderArgs::none())
    }

    /// A synchronous result with the given values.
    pub fn values(args: LoaderArgs) -> Self {
        StageOutput::Values(args)
    }

    /// A deferred result.
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<LoaderArgs, StageError>> + Send + 'static,
    {
        StageOutput::Future(Box::pin(future))
    }
}

impl From<LoaderArgs> for StageOutput {
    fn from(args: LoaderArgs) -> Self {
        StageOutput::Values(args)
    }
}

impl std::fmt::Debug for StageOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageOutput::Values(args) => f.debug_tuple("Values").field(args).finish(),
            StageOutput::Future(_) => f.write_str("Future(..)"),
        }
    }
}

/// Result of invoking a stage function.
pub type StageResult = Result<StageOutput, StageError>;

/// A pitch function.
pub type PitchFn = Arc<dyn Fn(&mut LoaderContext, PitchArgs) -> StageResult + Send + Sync>;

/// A normal function.
pub type NormalFn = Arc<dyn Fn(&mut LoaderContext, LoaderArgs) -> StageResult + Send + Sync>;

/// The loaded implementation of one stage.
#[derive(Clone, Default)]
pub struct LoaderImplementation {
    /// Runs in the left-to-right pitch phase
    pub pitch: Option<PitchFn>,
    /// Runs in the right-to-left normal phase
    pub normal: Option<NormalFn>,
    /// Whether `normal` receives content as bytes instead of text
    pub raw: bool,
}

impl LoaderImplementation {
    /// An implementation with neither function.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pitch function.
    pub fn with_pitch<F>(mut self, pitch: F) -> Self
    where
        F: Fn(&mut LoaderContext, PitchArgs) -> StageResult + Send + Sync + 'static,
    {
        self.pitch = Some(Arc::new(pitch));
        self
    }

    /// Set the normal function.
    pub fn with_normal<F>(mut self, normal: F) -> Self
    where
        F: Fn(&mut LoaderContext, LoaderArgs) -> StageResult + Send + Sync + 'static,
    {
        self.normal = Some(Arc::new(normal));
        self
    }

    /// Mark the normal function as wanting raw bytes.
    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }
}

impl std::fmt::Debug for LoaderImplementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderImplementation")
            .field("pitch", &self.pitch.is_some())
            .field("normal", &self.normal.is_some())
            .field("raw", &self.raw)
            .finish()
    }
}

/// Capability that produces a stage's implementation from its identity.
///
/// Loading may be asynchronous (reading a plugin, compiling a script, ...).
/// A failure is reported to the run as an implementation-load error and
/// marks the run non-cacheable.
#[async_trait]
pub trait ImplementationLoader: Send + Sync {
    /// Load the implementation for a stage.
    async fn load(&self, stage: &StageDescriptor) -> Result<LoaderImplementation, StageError>;
}

/// Registry of in-process stage implementations, keyed by stage path.
///
/// The simplest [`ImplementationLoader`]: lookups are by the descriptor's
/// `path`; a path nobody registered fails to load.
#[derive(Debug, Default, Clone)]
pub struct LoaderRegistry {
    loaders: HashMap<String, LoaderImplementation>,
}

impl LoaderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under a path.
    ///
    /// If an implementation with the same path already exists, it is replaced.
    pub fn register(&mut self, path: impl Into<String>, implementation: LoaderImplementation) {
        self.loaders.insert(path.into(), implementation);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, path: impl Into<String>, implementation: LoaderImplementation) -> Self {
        self.register(path, implementation);
        self
    }

    /// Get an implementation by path.
    pub fn get(&self, path: &str) -> Option<&LoaderImplementation> {
        self.loaders.get(path)
    }

    /// List all registered paths.
    pub fn paths(&self) -> Vec<&str> {
        self.loaders.keys().map(|s| s.as_str()).collect()
    }

    /// Get the number of registered implementations.
    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

#[async_trait]
impl ImplementationLoader for LoaderRegistry {
    async fn load(&self, stage: &StageDescriptor) -> Result<LoaderImplementation, StageError> {
        self.get(&stage.path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Cannot find loader module '{}'", stage.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ReferenceTable;

    fn no_refs() -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }

    #[test]
    fn test_registry_register_and_get() {
        let registry = LoaderRegistry::new()
            .with("a-loader", LoaderImplementation::new().raw(true))
            .with("b-loader", LoaderImplementation::new());
        assert_eq!(registry.len(), 2);
        assert!(registry.get("a-loader").is_some_and(|i| i.raw));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_registry_load_by_path() {
        let registry = LoaderRegistry::new().with(
            "a-loader",
            LoaderImplementation::new().with_normal(|_, args| Ok(args.into())),
        );
        let refs: &dyn ReferenceTable = &no_refs();
        let stage = StageDescriptor::from_request("a-loader?x=1", refs).unwrap();
        let loaded = pollster::block_on(registry.load(&stage)).unwrap();
        assert!(loaded.normal.is_some());
        assert!(loaded.pitch.is_none());
    }

    #[test]
    fn test_registry_unknown_path_fails() {
        let registry = LoaderRegistry::new();
        let refs: &dyn ReferenceTable = &no_refs();
        let stage = StageDescriptor::from_request("nowhere", refs).unwrap();
        let err = pollster::block_on(registry.load(&stage)).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_implementation_debug_hides_functions() {
        let implementation = LoaderImplementation::new().with_pitch(|_, _| Ok(StageOutput::none()));
        let debug = format!("{:?}", implementation);
        assert!(debug.contains("pitch: true"));
        assert!(debug.contains("normal: false"));
    }
}
