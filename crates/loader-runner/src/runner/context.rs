/*
 * runner/context.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The context every stage of a loader run operates on.
 */

//! Loader context.
//!
//! One [`LoaderContext`] exists per run. It owns the stage list and the
//! cursor the walkers move, collects dependencies and emitted assets, and
//! gives stages access to the injected collaborators.
//!
//! The request projections (`request`, `remaining_request`,
//! `current_request`, `previous_request`) are recomputed on every read
//! from the stage list and cursor. They are also available as free
//! functions over a stage slice.

use std::path::Path;
use std::sync::Arc;

use loader_diagnostics::{DiagnosticsSink, TracingSink};

use crate::artifact::AssetStore;
use crate::collaborators::{AssetEmitter, Resolver, UnsupportedResolver};
use crate::descriptor::{DataBag, StageDescriptor};
use crate::error::{LoaderError, StageError};
use crate::options::RunnerOptions;
use crate::request::{REQUEST_SEPARATOR, RequestParts, dirname};
use crate::utils::LoaderUtils;
use crate::value::{LoaderArgs, LoaderValue};

use super::completion::Completion;
use super::handle::{LoaderHandle, SharedOutputs, lock_outputs};
use super::observer::{LoaderObserver, NoopObserver};

pub use super::handle::{MODULE_ERROR_TITLE, MODULE_WARNING_TITLE};

/// Loader API version exposed to stages.
pub const LOADER_API_VERSION: u32 = 2;

fn join_requests(requests: impl Iterator<Item = String>, resource: Option<&str>) -> String {
    let mut parts: Vec<String> = requests.collect();
    if let Some(resource) = resource {
        parts.push(resource.to_string());
    }
    parts.join(REQUEST_SEPARATOR)
}

fn start_after(index: isize) -> usize {
    usize::try_from(index.saturating_add(1)).unwrap_or(0)
}

fn start_at(index: isize) -> usize {
    usize::try_from(index).unwrap_or(0)
}

/// All stage requests followed by the resource, joined with `!`.
pub fn request(stages: &[StageDescriptor], resource: &str) -> String {
    join_requests(stages.iter().map(StageDescriptor::request), Some(resource))
}

/// Requests of the stages after `index`, followed by the resource.
///
/// Empty when `index` is the last stage and there is no resource.
pub fn remaining_request(stages: &[StageDescriptor], index: isize, resource: &str) -> String {
    let last = isize::try_from(stages.len()).unwrap_or(isize::MAX) - 1;
    if index >= last && resource.is_empty() {
        return String::new();
    }
    let start = start_after(index).min(stages.len());
    join_requests(stages[start..].iter().map(StageDescriptor::request), Some(resource))
}

/// Requests of the stages from `index` on, followed by the resource.
pub fn current_request(stages: &[StageDescriptor], index: isize, resource: &str) -> String {
    let start = start_at(index).min(stages.len());
    join_requests(stages[start..].iter().map(StageDescriptor::request), Some(resource))
}

/// Requests of the stages before `index`.
pub fn previous_request(stages: &[StageDescriptor], index: isize) -> String {
    let end = start_at(index).min(stages.len());
    join_requests(stages[..end].iter().map(StageDescriptor::request), None)
}

/// The context of one loader run.
pub struct LoaderContext {
    resource: Option<RequestParts>,
    loaders: Vec<StageDescriptor>,
    loader_index: isize,
    is_pitching: bool,
    outputs: SharedOutputs,
    extensions: serde_json::Map<String, serde_json::Value>,
    options: Arc<RunnerOptions>,
    utils: LoaderUtils,
    diagnostics: Arc<dyn DiagnosticsSink>,
    resolver: Arc<dyn Resolver>,
    assets: Arc<dyn AssetEmitter>,
    observer: Arc<dyn LoaderObserver>,
    completion: Option<Completion>,
}

impl LoaderContext {
    /// Create a context for a resource and its stages.
    ///
    /// Collaborators default to a [`TracingSink`], a resolver that fails
    /// every request, a fresh [`AssetStore`] and a [`NoopObserver`].
    pub fn new(
        resource: Option<RequestParts>,
        loaders: Vec<StageDescriptor>,
        options: Arc<RunnerOptions>,
    ) -> Self {
        let utils = LoaderUtils::new(&options.hash_function);
        Self {
            resource,
            loaders,
            loader_index: 0,
            is_pitching: true,
            outputs: SharedOutputs::default(),
            extensions: serde_json::Map::new(),
            options,
            utils,
            diagnostics: Arc::new(TracingSink::new()),
            resolver: Arc::new(UnsupportedResolver),
            assets: Arc::new(AssetStore::new()),
            observer: Arc::new(NoopObserver::new()),
            completion: None,
        }
    }

    /// Set the diagnostics sink.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Set the resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the asset emitter.
    pub fn with_assets(mut self, assets: Arc<dyn AssetEmitter>) -> Self {
        self.assets = assets;
        self
    }

    /// Set the observer.
    pub fn with_observer(mut self, observer: Arc<dyn LoaderObserver>) -> Self {
        self.observer = observer;
        self
    }

    // --- resource -------------------------------------------------------

    /// The resource's canonical request, or empty without a resource.
    pub fn resource(&self) -> String {
        self.resource
            .as_ref()
            .map(RequestParts::to_request)
            .unwrap_or_default()
    }

    /// Replace the resource. `None` clears it.
    pub fn set_resource(&mut self, resource: Option<&str>) -> Result<(), LoaderError> {
        self.resource = resource.map(RequestParts::parse).transpose()?;
        Ok(())
    }

    /// Path of the resource.
    pub fn resource_path(&self) -> &str {
        self.resource.as_ref().map_or("", |r| r.path.as_str())
    }

    /// Query of the resource, including its `?`.
    pub fn resource_query(&self) -> &str {
        self.resource.as_ref().map_or("", |r| r.query.as_str())
    }

    /// Fragment of the resource, including its `#`.
    pub fn resource_fragment(&self) -> &str {
        self.resource.as_ref().map_or("", |r| r.fragment.as_str())
    }

    /// Directory of the module.
    pub fn context(&self) -> Option<String> {
        let path = self.resource_path();
        (!path.is_empty()).then(|| dirname(path))
    }

    // --- stages and cursor ---------------------------------------------

    /// The stages of this run.
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.loaders
    }

    /// Mutable access to the stages. Stages may be changed in place but
    /// never added or removed.
    pub fn stages_mut(&mut self) -> &mut [StageDescriptor] {
        &mut self.loaders
    }

    /// Index of the stage currently executing. `-1` once the normal phase
    /// walked past the first stage.
    pub fn loader_index(&self) -> isize {
        self.loader_index
    }

    pub(crate) fn set_loader_index(&mut self, index: isize) {
        self.loader_index = index;
    }

    /// Whether the run is in the pitch phase.
    pub fn is_pitching(&self) -> bool {
        self.is_pitching
    }

    pub(crate) fn set_pitching(&mut self, is_pitching: bool) {
        self.is_pitching = is_pitching;
    }

    /// The stage at the cursor.
    pub fn current_stage(&self) -> Option<&StageDescriptor> {
        usize::try_from(self.loader_index)
            .ok()
            .and_then(|i| self.loaders.get(i))
    }

    /// Mutable access to the stage at the cursor.
    pub fn current_stage_mut(&mut self) -> Option<&mut StageDescriptor> {
        usize::try_from(self.loader_index)
            .ok()
            .and_then(|i| self.loaders.get_mut(i))
    }

    pub(crate) fn current_display(&self) -> Option<String> {
        self.current_stage().map(StageDescriptor::display)
    }

    /// See [`request`].
    pub fn request(&self) -> String {
        request(&self.loaders, &self.resource())
    }

    /// See [`remaining_request`].
    pub fn remaining_request(&self) -> String {
        remaining_request(&self.loaders, self.loader_index, &self.resource())
    }

    /// See [`current_request`].
    pub fn current_request(&self) -> String {
        current_request(&self.loaders, self.loader_index, &self.resource())
    }

    /// See [`previous_request`].
    pub fn previous_request(&self) -> String {
        previous_request(&self.loaders, self.loader_index)
    }

    // --- current stage view ---------------------------------------------

    /// The current stage's options when they are an object, otherwise its
    /// query string.
    pub fn query(&self) -> serde_json::Value {
        match self.current_stage() {
            Some(stage) => match &stage.options {
                Some(options @ serde_json::Value::Object(_)) => options.clone(),
                _ => serde_json::Value::String(stage.query.clone()),
            },
            None => serde_json::Value::String(String::new()),
        }
    }

    /// The current stage's options, or an empty object.
    pub fn get_options(&self) -> serde_json::Value {
        self.current_stage()
            .and_then(|stage| stage.options.clone())
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()))
    }

    /// The current stage's data bag.
    pub fn data(&self) -> Option<&DataBag> {
        self.current_stage().map(|stage| &stage.data)
    }

    /// Mutable access to the current stage's data bag.
    pub fn data_mut(&mut self) -> Option<&mut DataBag> {
        self.current_stage_mut().map(|stage| &mut stage.data)
    }

    // --- cacheability and dependencies ----------------------------------

    /// Mark the module uncacheable. `cacheable(true)` has no effect.
    pub fn cacheable(&mut self, flag: bool) {
        if !flag {
            lock_outputs(&self.outputs).cacheable = false;
        }
    }

    /// Whether the module result may be cached.
    pub fn is_cacheable(&self) -> bool {
        lock_outputs(&self.outputs).cacheable
    }

    /// Add a file dependency.
    pub fn add_dependency(&mut self, file: impl Into<String>) {
        lock_outputs(&self.outputs).file_dependencies.insert(file.into());
    }

    /// Add a context (directory) dependency.
    pub fn add_context_dependency(&mut self, context: impl Into<String>) {
        lock_outputs(&self.outputs)
            .context_dependencies
            .insert(context.into());
    }

    /// Add a missing dependency.
    pub fn add_missing_dependency(&mut self, missing: impl Into<String>) {
        lock_outputs(&self.outputs)
            .missing_dependencies
            .insert(missing.into());
    }

    /// Add a build dependency.
    pub fn add_build_dependency(&mut self, file: impl Into<String>) {
        lock_outputs(&self.outputs).build_dependencies.insert(file.into());
    }

    /// File dependencies in insertion order.
    pub fn dependencies(&self) -> Vec<String> {
        lock_outputs(&self.outputs)
            .file_dependencies
            .iter()
            .cloned()
            .collect()
    }

    /// Context dependencies in insertion order.
    pub fn context_dependencies(&self) -> Vec<String> {
        lock_outputs(&self.outputs)
            .context_dependencies
            .iter()
            .cloned()
            .collect()
    }

    /// Missing dependencies in insertion order.
    pub fn missing_dependencies(&self) -> Vec<String> {
        lock_outputs(&self.outputs)
            .missing_dependencies
            .iter()
            .cloned()
            .collect()
    }

    /// Build dependencies in insertion order.
    pub fn build_dependencies(&self) -> Vec<String> {
        lock_outputs(&self.outputs)
            .build_dependencies
            .iter()
            .cloned()
            .collect()
    }

    /// Empty all four dependency collections and make the module
    /// cacheable again.
    pub fn clear_dependencies(&mut self) {
        lock_outputs(&self.outputs).clear_dependencies();
    }

    pub(crate) fn seed(
        &mut self,
        file_dependencies: Vec<String>,
        context_dependencies: Vec<String>,
        missing_dependencies: Vec<String>,
        build_dependencies: Vec<String>,
        asset_filenames: Vec<String>,
    ) {
        let mut outputs = lock_outputs(&self.outputs);
        outputs.file_dependencies.extend(file_dependencies);
        outputs.context_dependencies.extend(context_dependencies);
        outputs.missing_dependencies.extend(missing_dependencies);
        outputs.build_dependencies.extend(build_dependencies);
        outputs.asset_filenames.extend(asset_filenames);
    }

    pub(crate) fn take_collections(&mut self) -> CollectedOutputs {
        let mut outputs = lock_outputs(&self.outputs);
        CollectedOutputs {
            file_dependencies: std::mem::take(&mut outputs.file_dependencies)
                .into_iter()
                .collect(),
            context_dependencies: std::mem::take(&mut outputs.context_dependencies)
                .into_iter()
                .collect(),
            missing_dependencies: std::mem::take(&mut outputs.missing_dependencies)
                .into_iter()
                .collect(),
            build_dependencies: std::mem::take(&mut outputs.build_dependencies)
                .into_iter()
                .collect(),
            asset_filenames: std::mem::take(&mut outputs.asset_filenames),
        }
    }

    // --- diagnostics and assets -----------------------------------------

    /// A handle on this run for work that outlives the stage call.
    ///
    /// See [`LoaderHandle`]. Diagnostics reported through the handle name
    /// the stage running now.
    pub fn handle(&self) -> LoaderHandle {
        LoaderHandle {
            outputs: Arc::clone(&self.outputs),
            options: Arc::clone(&self.options),
            diagnostics: Arc::clone(&self.diagnostics),
            resolver: Arc::clone(&self.resolver),
            assets: Arc::clone(&self.assets),
            observer: Arc::clone(&self.observer),
            stage: self.current_display(),
            module_context: self.context(),
        }
    }

    /// Report a non-fatal error for the module.
    pub fn emit_error(&self, error: impl std::fmt::Display) {
        self.handle().emit_error(error);
    }

    /// Report a warning for the module.
    pub fn emit_warning(&self, warning: impl std::fmt::Display) {
        self.handle().emit_warning(warning);
    }

    /// Emit a file. See [`LoaderHandle::emit_file`].
    pub fn emit_file(
        &mut self,
        name: impl Into<String>,
        content: Option<LoaderValue>,
        source_map: Option<LoaderValue>,
        info: Option<serde_json::Value>,
    ) {
        self.handle().emit_file(name, content, source_map, info);
    }

    /// Names of emitted assets, duplicates included.
    pub fn asset_filenames(&self) -> Vec<String> {
        lock_outputs(&self.outputs).asset_filenames.clone()
    }

    /// A span for a stage's own log output, named `"<name>|<resource>"`.
    pub fn logger(&self, name: &str) -> tracing::Span {
        let resource = self.resource();
        let full_name = [name, resource.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("|");
        tracing::info_span!("loader", name = %full_name)
    }

    // --- compiler view ----------------------------------------------------

    /// Loader API version.
    pub fn version(&self) -> u32 {
        LOADER_API_VERSION
    }

    /// Build mode.
    pub fn mode(&self) -> Option<&str> {
        self.options.mode.as_deref()
    }

    /// Whether hot module replacement is enabled.
    pub fn hot(&self) -> bool {
        self.options.hot
    }

    /// Whether stages should produce source maps.
    pub fn source_map(&self) -> bool {
        self.options.use_source_map()
    }

    /// Root context of the compiler.
    pub fn root_context(&self) -> &Path {
        &self.options.context
    }

    /// The run's options.
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Identifier and hashing helpers.
    pub fn utils(&self) -> &LoaderUtils {
        &self.utils
    }

    /// Value attached to the context by a compilation hook.
    pub fn extension(&self, key: &str) -> Option<&serde_json::Value> {
        self.extensions.get(key)
    }

    /// Attach a value to the context.
    pub fn set_extension(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.extensions.insert(key.into(), value);
    }

    /// The run's observer.
    pub fn observer(&self) -> &dyn LoaderObserver {
        self.observer.as_ref()
    }

    // --- resolution -------------------------------------------------------

    /// Resolve `request` relative to `context`.
    pub fn resolve(&self, context: &str, request: &str) -> Result<String, StageError> {
        self.resolver.resolve(context, request)
    }

    /// Resolve and hand the outcome to `callback`.
    pub fn resolve_with<F>(&self, context: &str, request: &str, callback: F)
    where
        F: FnOnce(Result<String, StageError>),
    {
        callback(self.resolver.resolve(context, request));
    }

    /// A resolver configured with extra options.
    pub fn get_resolver(&self, options: Option<&serde_json::Value>) -> Arc<dyn Resolver> {
        options
            .and_then(|options| self.resolver.with_options(options))
            .unwrap_or_else(|| Arc::clone(&self.resolver))
    }

    // --- completion -------------------------------------------------------

    pub(crate) fn set_completion(&mut self, completion: Completion) {
        self.completion = Some(completion);
    }

    pub(crate) fn clear_completion(&mut self) {
        self.completion = None;
    }

    /// Switch the running stage to asynchronous completion.
    ///
    /// The stage must complete the returned handle exactly once. Outside a
    /// running stage the handle is inert. Work that completes later reaches
    /// the run through [`handle`](Self::handle).
    ///
    /// # Panics
    ///
    /// Panics if the running stage already completed.
    pub fn async_completion(&mut self) -> Completion {
        match &self.completion {
            Some(completion) => completion.enter_async(),
            None => Completion::detached(),
        }
    }

    /// Complete the running stage.
    ///
    /// # Panics
    ///
    /// Panics if the running stage already completed.
    pub fn callback(&mut self, result: Result<LoaderArgs, StageError>) {
        match &self.completion {
            Some(completion) => completion.complete(result),
            None => tracing::warn!("callback() called outside a running stage; ignored"),
        }
    }
}

impl std::fmt::Debug for LoaderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderContext")
            .field("resource", &self.resource())
            .field("loaders", &self.loaders)
            .field("loader_index", &self.loader_index)
            .field("is_pitching", &self.is_pitching)
            .field("cacheable", &self.is_cacheable())
            .finish_non_exhaustive()
    }
}

/// Collections moved out of a context at the end of a run.
#[derive(Debug, Default)]
pub(crate) struct CollectedOutputs {
    pub file_dependencies: Vec<String>,
    pub context_dependencies: Vec<String>,
    pub missing_dependencies: Vec<String>,
    pub build_dependencies: Vec<String>,
    pub asset_filenames: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::AssetSource;
    use loader_diagnostics::{CollectingSink, DiagnosticKind};
    use serde_json::json;
    use std::collections::HashMap;

    fn stages(requests: &[&str]) -> Vec<StageDescriptor> {
        let refs: HashMap<String, serde_json::Value> = HashMap::new();
        requests
            .iter()
            .map(|r| StageDescriptor::from_request(r, &refs).unwrap())
            .collect()
    }

    fn context(resource: Option<&str>, requests: &[&str]) -> LoaderContext {
        LoaderContext::new(
            resource.map(|r| RequestParts::parse(r).unwrap()),
            stages(requests),
            Arc::new(RunnerOptions::default()),
        )
    }

    #[test]
    fn test_projections() {
        let mut ctx = context(Some("/src/x.js?q"), &["a", "b?x", "c"]);
        ctx.set_loader_index(1);
        assert_eq!(ctx.request(), "a!b?x!c!/src/x.js?q");
        assert_eq!(ctx.remaining_request(), "c!/src/x.js?q");
        assert_eq!(ctx.current_request(), "b?x!c!/src/x.js?q");
        assert_eq!(ctx.previous_request(), "a");
    }

    #[test]
    fn test_remaining_request_at_last_stage() {
        let mut ctx = context(None, &["a", "b"]);
        ctx.set_loader_index(1);
        assert_eq!(ctx.remaining_request(), "");

        let mut ctx = context(Some("/r.js"), &["a", "b"]);
        ctx.set_loader_index(1);
        assert_eq!(ctx.remaining_request(), "/r.js");
    }

    #[test]
    fn test_projections_see_in_place_mutation() {
        let refs: HashMap<String, serde_json::Value> = HashMap::new();
        let mut ctx = context(Some("/r.js"), &["a", "b"]);
        assert_eq!(ctx.request(), "a!b!/r.js");
        ctx.stages_mut()[1].set_request("z?1", &refs).unwrap();
        assert_eq!(ctx.request(), "a!z?1!/r.js");
    }

    #[test]
    fn test_free_projection_functions() {
        let list = stages(&["a", "b"]);
        assert_eq!(request(&list, ""), "a!b!");
        assert_eq!(previous_request(&list, 0), "");
        assert_eq!(current_request(&list, -1, "/r"), "a!b!/r");
    }

    #[test]
    fn test_resource_accessors() {
        let mut ctx = context(Some("/src/app/x.js?raw#top"), &[]);
        assert_eq!(ctx.resource_path(), "/src/app/x.js");
        assert_eq!(ctx.resource_query(), "?raw");
        assert_eq!(ctx.resource_fragment(), "#top");
        assert_eq!(ctx.context().as_deref(), Some("/src/app"));

        ctx.set_resource(None).unwrap();
        assert_eq!(ctx.resource(), "");
        assert_eq!(ctx.context(), None);
    }

    #[test]
    fn test_dependencies_keep_order_and_dedupe() {
        let mut ctx = context(None, &[]);
        ctx.add_dependency("b");
        ctx.add_dependency("a");
        ctx.add_dependency("b");
        ctx.add_context_dependency("/dir");
        ctx.add_missing_dependency("/gone");
        ctx.add_build_dependency("/build.js");
        assert_eq!(ctx.dependencies(), vec!["b", "a"]);
        assert_eq!(ctx.context_dependencies(), vec!["/dir"]);
        assert_eq!(ctx.missing_dependencies(), vec!["/gone"]);
        assert_eq!(ctx.build_dependencies(), vec!["/build.js"]);
    }

    #[test]
    fn test_cacheable_latches_until_clear() {
        let mut ctx = context(None, &[]);
        ctx.add_dependency("a");
        ctx.cacheable(false);
        ctx.cacheable(true);
        assert!(!ctx.is_cacheable());

        ctx.clear_dependencies();
        assert!(ctx.is_cacheable());
        assert!(ctx.dependencies().is_empty());
    }

    #[test]
    fn test_emit_diagnostics() {
        let sink = Arc::new(CollectingSink::new());
        let mut ctx = context(Some("/r.js"), &["a?x=1", "b"]).with_diagnostics(sink.clone());
        ctx.set_loader_index(0);
        ctx.emit_warning("careful");
        ctx.emit_error(anyhow::anyhow!("inner").context("outer"));

        let recorded = sink.diagnostics();
        assert_eq!(recorded[0].kind, DiagnosticKind::Warning);
        assert_eq!(recorded[0].title, "Module Warning");
        assert_eq!(recorded[0].message, "careful\n(from: a?x=1)");
        assert_eq!(recorded[1].kind, DiagnosticKind::Error);
        assert_eq!(recorded[1].title, "Module Error");
        assert_eq!(recorded[1].message, "outer: inner\n(from: a?x=1)");
    }

    #[test]
    fn test_emit_file_encodings() {
        let store = Arc::new(AssetStore::new());
        let options = RunnerOptions::default().with_devtool("source-map");
        let mut ctx = LoaderContext::new(
            Some(RequestParts::parse("/p/src/x.js").unwrap()),
            vec![],
            Arc::new(options),
        )
        .with_assets(store.clone());

        ctx.emit_file("plain.txt", Some("a".into()), None, None);
        ctx.emit_file(
            "orig.js",
            Some("b".into()),
            Some("/p/src/orig.js".into()),
            None,
        );
        ctx.emit_file(
            "mapped.js",
            Some("c".into()),
            Some(json!({"version": 3}).into()),
            None,
        );
        ctx.emit_file("plain.txt", None, None, None);
        ctx.emit_file(
            "text.js",
            Some("d".into()),
            Some(json!("/p/src/text.js").into()),
            None,
        );

        assert_eq!(
            ctx.asset_filenames(),
            ["plain.txt", "orig.js", "mapped.js", "plain.txt", "text.js"]
        );
        let assets = store.assets();
        assert!(matches!(assets[0].source, AssetSource::Raw { .. }));
        assert_eq!(
            assets[1].source,
            AssetSource::Original {
                content: b"b".to_vec(),
                source_map: "./orig.js".to_string(),
            }
        );
        assert!(matches!(
            &assets[2].source,
            AssetSource::SourceMap { name, .. } if name == "mapped.js"
        ));
        assert_eq!(assets[3].source.content(), b"");
        assert_eq!(
            assets[4].source,
            AssetSource::Original {
                content: b"d".to_vec(),
                source_map: "./text.js".to_string(),
            }
        );
    }

    #[test]
    fn test_emit_file_without_source_maps_is_raw() {
        let store = Arc::new(AssetStore::new());
        let mut ctx = context(Some("/r.js"), &[]).with_assets(store.clone());
        ctx.emit_file("a.js", Some("x".into()), Some("map".into()), None);
        ctx.emit_file("b.js", Some("x".into()), Some(json!({}).into()), None);
        assert!(store.assets().iter().all(|a| !a.source.has_source_map()));
    }

    #[test]
    fn test_query_and_options() {
        let mut refs = HashMap::new();
        refs.insert("r".to_string(), json!({"k": 1}));
        let loaders = vec![
            StageDescriptor::from_request("a??r", &refs).unwrap(),
            StageDescriptor::from_request("b?x=1", &refs).unwrap(),
            StageDescriptor::from_request("c", &refs).unwrap(),
        ];
        let mut ctx = LoaderContext::new(None, loaders, Arc::new(RunnerOptions::default()));

        assert_eq!(ctx.query(), json!({"k": 1}));
        assert_eq!(ctx.get_options(), json!({"k": 1}));
        ctx.set_loader_index(1);
        assert_eq!(ctx.query(), json!("?x=1"));
        assert_eq!(ctx.get_options(), json!({}));
        ctx.set_loader_index(2);
        assert_eq!(ctx.query(), json!(""));
        assert_eq!(ctx.get_options(), json!({}));
    }

    #[test]
    fn test_data_bag_belongs_to_current_stage() {
        let mut ctx = context(None, &["a", "b"]);
        ctx.data_mut().unwrap().insert("seen".to_string(), json!(true));
        ctx.set_loader_index(1);
        assert!(ctx.data().unwrap().is_empty());
        ctx.set_loader_index(0);
        assert_eq!(ctx.data().unwrap().get("seen"), Some(&json!(true)));
        ctx.set_loader_index(-1);
        assert!(ctx.data().is_none());
    }

    #[test]
    fn test_compiler_view() {
        let options = RunnerOptions {
            mode: Some("production".to_string()),
            hot: true,
            ..RunnerOptions::default()
        }
        .with_context("/project");
        let ctx = LoaderContext::new(None, vec![], Arc::new(options));
        assert_eq!(ctx.version(), 2);
        assert_eq!(ctx.mode(), Some("production"));
        assert!(ctx.hot());
        assert!(!ctx.source_map());
        assert_eq!(ctx.root_context(), Path::new("/project"));
    }

    #[test]
    fn test_resolve_without_resolver_fails() {
        let ctx = context(None, &[]);
        assert!(ctx.resolve("/src", "./a").is_err());
        let mut seen = None;
        ctx.resolve_with("/src", "./a", |result| seen = Some(result.is_err()));
        assert_eq!(seen, Some(true));
    }

    #[test]
    fn test_callback_outside_stage_is_ignored() {
        let mut ctx = context(None, &[]);
        ctx.callback(Ok(LoaderArgs::none()));
        let completion = ctx.async_completion();
        completion.succeed(LoaderArgs::none());
    }
}
