/*
 * runner/handle.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Shared run state reachable from asynchronous stage work.
 */

//! Run handles.
//!
//! A stage only borrows the [`LoaderContext`] while its function runs.
//! Work that continues afterwards (a returned future, or a task that later
//! completes an [`async_completion`] handle) takes a [`LoaderHandle`]
//! instead. The handle shares the run's dependency sets, cacheability,
//! asset names and collaborators with the context, so whatever it records
//! shows up in the run's result.
//!
//! ```ignore
//! let handle = ctx.handle();
//! Ok(StageOutput::future(async move {
//!     let path = handle.resolve("/src", "./dep.js")?;
//!     handle.add_dependency(path);
//!     Ok(args)
//! }))
//! ```
//!
//! Changes made through a handle after the run finished are not reported.
//!
//! [`LoaderContext`]: super::context::LoaderContext
//! [`async_completion`]: super::context::LoaderContext::async_completion

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hashlink::LinkedHashSet;
use loader_diagnostics::{DiagnosticKind, DiagnosticsSink};

use crate::artifact::AssetSource;
use crate::collaborators::{AssetEmitter, Resolver};
use crate::error::StageError;
use crate::options::RunnerOptions;
use crate::utils::make_paths_relative;
use crate::value::LoaderValue;

use super::observer::{EventLevel, LoaderObserver};

/// Title of diagnostics reported through `emit_error`.
pub const MODULE_ERROR_TITLE: &str = "Module Error";

/// Title of diagnostics reported through `emit_warning`.
pub const MODULE_WARNING_TITLE: &str = "Module Warning";

/// What a run collects on the side of its content.
#[derive(Debug)]
pub(crate) struct RunOutputs {
    pub cacheable: bool,
    pub file_dependencies: LinkedHashSet<String>,
    pub context_dependencies: LinkedHashSet<String>,
    pub missing_dependencies: LinkedHashSet<String>,
    pub build_dependencies: LinkedHashSet<String>,
    pub asset_filenames: Vec<String>,
}

impl Default for RunOutputs {
    fn default() -> Self {
        Self {
            cacheable: true,
            file_dependencies: LinkedHashSet::new(),
            context_dependencies: LinkedHashSet::new(),
            missing_dependencies: LinkedHashSet::new(),
            build_dependencies: LinkedHashSet::new(),
            asset_filenames: Vec::new(),
        }
    }
}

impl RunOutputs {
    pub fn clear_dependencies(&mut self) {
        self.file_dependencies.clear();
        self.context_dependencies.clear();
        self.missing_dependencies.clear();
        self.build_dependencies.clear();
        self.cacheable = true;
    }
}

pub(crate) type SharedOutputs = Arc<Mutex<RunOutputs>>;

pub(crate) fn lock_outputs(outputs: &SharedOutputs) -> MutexGuard<'_, RunOutputs> {
    outputs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A cloneable, `Send` view of a running module.
///
/// Obtained from [`LoaderContext::handle`](super::context::LoaderContext::handle).
/// Diagnostics reported through it name the stage that was running when
/// the handle was taken.
#[derive(Clone)]
pub struct LoaderHandle {
    pub(crate) outputs: SharedOutputs,
    pub(crate) options: Arc<RunnerOptions>,
    pub(crate) diagnostics: Arc<dyn DiagnosticsSink>,
    pub(crate) resolver: Arc<dyn Resolver>,
    pub(crate) assets: Arc<dyn AssetEmitter>,
    pub(crate) observer: Arc<dyn LoaderObserver>,
    pub(crate) stage: Option<String>,
    pub(crate) module_context: Option<String>,
}

impl LoaderHandle {
    fn outputs(&self) -> MutexGuard<'_, RunOutputs> {
        lock_outputs(&self.outputs)
    }

    /// Mark the module uncacheable. `cacheable(true)` has no effect.
    pub fn cacheable(&self, flag: bool) {
        if !flag {
            self.outputs().cacheable = false;
        }
    }

    /// Whether the module result may be cached.
    pub fn is_cacheable(&self) -> bool {
        self.outputs().cacheable
    }

    /// Add a file dependency.
    pub fn add_dependency(&self, file: impl Into<String>) {
        self.outputs().file_dependencies.insert(file.into());
    }

    /// Add a context (directory) dependency.
    pub fn add_context_dependency(&self, context: impl Into<String>) {
        self.outputs().context_dependencies.insert(context.into());
    }

    /// Add a missing dependency.
    pub fn add_missing_dependency(&self, missing: impl Into<String>) {
        self.outputs().missing_dependencies.insert(missing.into());
    }

    /// Add a build dependency.
    pub fn add_build_dependency(&self, file: impl Into<String>) {
        self.outputs().build_dependencies.insert(file.into());
    }

    /// File dependencies in insertion order.
    pub fn dependencies(&self) -> Vec<String> {
        self.outputs().file_dependencies.iter().cloned().collect()
    }

    /// Empty all four dependency collections and make the module
    /// cacheable again.
    pub fn clear_dependencies(&self) {
        self.outputs().clear_dependencies();
    }

    fn report(&self, kind: DiagnosticKind, title: &str, error: &dyn std::fmt::Display) {
        let from = self.stage.as_deref().unwrap_or_default();
        let message = format!("{error:#}\n(from: {from})");
        self.diagnostics.record(kind, title, &message);
    }

    /// Report a non-fatal error for the module.
    pub fn emit_error(&self, error: impl std::fmt::Display) {
        self.report(DiagnosticKind::Error, MODULE_ERROR_TITLE, &error);
    }

    /// Report a warning for the module.
    pub fn emit_warning(&self, warning: impl std::fmt::Display) {
        self.report(DiagnosticKind::Warning, MODULE_WARNING_TITLE, &warning);
    }

    /// Emit a file.
    ///
    /// With a string `source_map` and source maps enabled (full or simple)
    /// the file carries an original-source map whose paths are relative
    /// to the module's directory. With a structured map and full source
    /// maps enabled it carries the map object. Otherwise it is plain bytes.
    pub fn emit_file(
        &self,
        name: impl Into<String>,
        content: Option<LoaderValue>,
        source_map: Option<LoaderValue>,
        info: Option<serde_json::Value>,
    ) {
        let name = name.into();
        let content = content.map(|c| c.to_bytes().into_owned()).unwrap_or_default();
        // A JSON string is a plain-text map, as in the run result.
        let source_map = source_map.map(|map| match map {
            LoaderValue::Json(serde_json::Value::String(text)) => LoaderValue::String(text),
            other => other,
        });
        let source = match source_map {
            Some(LoaderValue::String(text))
                if self.options.use_source_map() || self.options.use_simple_source_map() =>
            {
                let context = self.module_context.as_deref().unwrap_or_default();
                AssetSource::Original {
                    content,
                    source_map: make_paths_relative(context, &text),
                }
            }
            Some(map) if self.options.use_source_map() && !matches!(map, LoaderValue::String(_)) => {
                let source_map = match map {
                    LoaderValue::Json(value) => value,
                    LoaderValue::Buffer(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(
                        |_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()),
                    ),
                    LoaderValue::String(text) => serde_json::Value::String(text),
                };
                AssetSource::SourceMap {
                    content,
                    name: name.clone(),
                    source_map,
                }
            }
            _ => AssetSource::Raw { content },
        };
        crate::trace_event!(self, EventLevel::Debug, "Emitting asset {name}");
        self.outputs().asset_filenames.push(name.clone());
        self.assets.emit_asset(&name, source, info);
    }

    /// Resolve `request` relative to `context`.
    pub fn resolve(&self, context: &str, request: &str) -> Result<String, StageError> {
        self.resolver.resolve(context, request)
    }

    /// A resolver configured with extra options.
    pub fn get_resolver(&self, options: Option<&serde_json::Value>) -> Arc<dyn Resolver> {
        options
            .and_then(|options| self.resolver.with_options(options))
            .unwrap_or_else(|| Arc::clone(&self.resolver))
    }

    /// The run's options.
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// The run's observer.
    pub fn observer(&self) -> &dyn LoaderObserver {
        self.observer.as_ref()
    }
}

impl std::fmt::Debug for LoaderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderHandle")
            .field("stage", &self.stage)
            .field("module_context", &self.module_context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::AssetStore;
    use crate::collaborators::UnsupportedResolver;
    use crate::runner::observer::NoopObserver;
    use loader_diagnostics::CollectingSink;

    fn handle(sink: Arc<CollectingSink>) -> LoaderHandle {
        LoaderHandle {
            outputs: SharedOutputs::default(),
            options: Arc::new(RunnerOptions::default()),
            diagnostics: sink,
            resolver: Arc::new(UnsupportedResolver),
            assets: Arc::new(AssetStore::new()),
            observer: Arc::new(NoopObserver::new()),
            stage: Some("a?x".to_string()),
            module_context: Some("/src".to_string()),
        }
    }

    #[test]
    fn test_clones_share_outputs() {
        let first = handle(Arc::new(CollectingSink::new()));
        let second = first.clone();
        first.add_dependency("/a.js");
        second.add_dependency("/a.js");
        second.add_dependency("/b.js");
        second.cacheable(false);
        assert_eq!(first.dependencies(), vec!["/a.js", "/b.js"]);
        assert!(!first.is_cacheable());

        first.clear_dependencies();
        assert!(second.dependencies().is_empty());
        assert!(second.is_cacheable());
    }

    #[test]
    fn test_diagnostics_name_the_stage() {
        let sink = Arc::new(CollectingSink::new());
        handle(sink.clone()).emit_warning("late");
        let recorded = sink.diagnostics();
        assert_eq!(recorded[0].title, MODULE_WARNING_TITLE);
        assert_eq!(recorded[0].message, "late\n(from: a?x)");
    }

    #[test]
    fn test_handle_is_send() {
        fn assert_send<T: Send + Sync + 'static>() {}
        assert_send::<LoaderHandle>();
    }
}
