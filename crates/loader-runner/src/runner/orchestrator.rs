/*
 * runner/orchestrator.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Entry point of a loader run.
 */

//! Loader runs.
//!
//! [`LoaderRunner`] holds the collaborators shared by every run of a
//! compiler. [`LoaderRunner::run`] takes one [`LoaderRunRequest`],
//! builds the stage descriptors and context, runs the compilation hooks,
//! walks the stages and delivers exactly one [`LoaderRunResult`] or
//! [`LoaderError`].

use std::collections::HashMap;
use std::sync::Arc;

use loader_diagnostics::{DiagnosticsSink, TracingSink};

use crate::artifact::AssetStore;
use crate::collaborators::{
    AssetEmitter, Compilation, ReferenceTable, Resolver, UnsupportedResolver,
};
use crate::descriptor::StageDescriptor;
use crate::error::LoaderError;
use crate::implementation::ImplementationLoader;
use crate::options::RunnerOptions;
use crate::request::{RequestParts, split_stages};
use crate::value::{
    LoaderArgs, LoaderValue, normalize_additional_data, normalize_content, normalize_source_map,
};

use super::context::LoaderContext;
use super::normal::iterate_normal_loaders;
use super::observer::{LoaderObserver, NoopObserver};
use super::pitch::iterate_pitching_loaders;

/// Inbound request for one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderRunRequest {
    /// The module resource (`path?query#fragment`)
    pub resource: String,
    /// Stage requests joined with `$`
    pub loaders: String,
    /// Start with the pitch phase (otherwise start at the last stage's
    /// normal function)
    pub is_pitching: bool,
    /// Module content, for runs starting in the normal phase
    pub content: Option<Vec<u8>>,
    /// JSON-encoded source map
    pub source_map: Option<Vec<u8>>,
    /// JSON-encoded additional data
    pub additional_data: Option<Vec<u8>>,
    /// File dependencies collected before this run
    pub file_dependencies: Vec<String>,
    /// Context dependencies collected before this run
    pub context_dependencies: Vec<String>,
    /// Missing dependencies collected before this run
    pub missing_dependencies: Vec<String>,
    /// Build dependencies collected before this run
    pub build_dependencies: Vec<String>,
    /// Assets emitted before this run
    pub asset_filenames: Vec<String>,
}

impl LoaderRunRequest {
    /// A pitching run of `loaders` over `resource`.
    pub fn new(resource: impl Into<String>, loaders: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            loaders: loaders.into(),
            is_pitching: true,
            ..Self::default()
        }
    }

    /// Choose the starting phase.
    pub fn pitching(mut self, is_pitching: bool) -> Self {
        self.is_pitching = is_pitching;
        self
    }

    /// Set the module content.
    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the JSON-encoded source map.
    pub fn with_source_map(mut self, source_map: impl Into<Vec<u8>>) -> Self {
        self.source_map = Some(source_map.into());
        self
    }

    /// Set the JSON-encoded additional data.
    pub fn with_additional_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.additional_data = Some(data.into());
        self
    }

    fn initial_args(&self) -> Result<LoaderArgs, LoaderError> {
        let content = self.content.clone().map(LoaderValue::Buffer);
        let source_map = decode_json(self.source_map.as_deref(), "source map")?;
        let additional_data = decode_json(self.additional_data.as_deref(), "additional data")?;
        Ok(LoaderArgs::from(vec![content, source_map, additional_data]))
    }
}

fn decode_json(bytes: Option<&[u8]>, what: &'static str) -> Result<Option<LoaderValue>, LoaderError> {
    bytes
        .map(|bytes| {
            serde_json::from_slice::<serde_json::Value>(bytes)
                .map(LoaderValue::Json)
                .map_err(|source| LoaderError::InvalidInput { what, source })
        })
        .transpose()
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderRunResult {
    /// Transformed content, absent when no stage produced any
    pub content: Option<Vec<u8>>,
    /// Source map as JSON text
    pub source_map: Option<Vec<u8>>,
    /// Additional data as JSON text
    pub additional_data: Option<Vec<u8>>,
    /// File dependencies in insertion order
    pub file_dependencies: Vec<String>,
    /// Context dependencies in insertion order
    pub context_dependencies: Vec<String>,
    /// Missing dependencies in insertion order
    pub missing_dependencies: Vec<String>,
    /// Build dependencies in insertion order
    pub build_dependencies: Vec<String>,
    /// Whether the result may be cached
    pub cacheable: bool,
    /// Names of emitted assets, duplicates included
    pub asset_filenames: Vec<String>,
    /// Whether the run ended in the pitch phase (no stage intercepted)
    pub is_pitching: bool,
}

/// Runs loader pipelines against shared collaborators.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use loader_runner::{LoaderArgs, LoaderImplementation, LoaderRegistry, LoaderRunRequest, LoaderRunner};
///
/// let registry = LoaderRegistry::new().with(
///     "upper",
///     LoaderImplementation::new().with_normal(|_ctx, args| {
///         let text = args.content().map(|c| c.to_text().to_uppercase()).unwrap_or_default();
///         Ok(LoaderArgs::with_content(text).into())
///     }),
/// );
/// let runner = LoaderRunner::new(Arc::new(registry));
/// let request = LoaderRunRequest::new("/src/a.txt", "upper")
///     .pitching(false)
///     .with_content("hello");
///
/// let result = pollster::block_on(runner.run(request)).unwrap();
/// assert_eq!(result.content.as_deref(), Some(&b"HELLO"[..]));
/// ```
#[derive(Clone)]
pub struct LoaderRunner {
    options: Arc<RunnerOptions>,
    loader: Arc<dyn ImplementationLoader>,
    resolver: Arc<dyn Resolver>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    references: Arc<dyn ReferenceTable>,
    assets: Arc<dyn AssetEmitter>,
    compilation: Option<Arc<dyn Compilation>>,
    observer: Arc<dyn LoaderObserver>,
}

impl LoaderRunner {
    /// A runner loading stage implementations through `loader`.
    pub fn new(loader: Arc<dyn ImplementationLoader>) -> Self {
        Self {
            options: Arc::new(RunnerOptions::default()),
            loader,
            resolver: Arc::new(UnsupportedResolver),
            diagnostics: Arc::new(TracingSink::new()),
            references: Arc::new(HashMap::<String, serde_json::Value>::new()),
            assets: Arc::new(AssetStore::new()),
            compilation: None,
            observer: Arc::new(NoopObserver::new()),
        }
    }

    /// Set the options.
    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    /// Set the resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the diagnostics sink.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Set the table `??ident` queries are resolved against.
    pub fn with_references(mut self, references: Arc<dyn ReferenceTable>) -> Self {
        self.references = references;
        self
    }

    /// Set the asset emitter.
    pub fn with_assets(mut self, assets: Arc<dyn AssetEmitter>) -> Self {
        self.assets = assets;
        self
    }

    /// Set the (innermost) compilation whose loader hooks run first.
    pub fn with_compilation(mut self, compilation: Arc<dyn Compilation>) -> Self {
        self.compilation = Some(compilation);
        self
    }

    /// Set the observer.
    pub fn with_observer(mut self, observer: Arc<dyn LoaderObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The runner's options.
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Run the stages of one module.
    pub async fn run(&self, request: LoaderRunRequest) -> Result<LoaderRunResult, LoaderError> {
        let mut ctx = match self.prepare(&request) {
            Ok(ctx) => ctx,
            Err(error) => {
                self.observer.on_run_error(&request.resource, &error);
                return Err(error);
            }
        };

        let outcome = self.walk(&mut ctx, &request).await;
        match outcome {
            Ok(args) => {
                self.observer.on_run_complete(&request.resource);
                Ok(finish(ctx, args))
            }
            Err(error) => {
                self.observer.on_run_error(&request.resource, &error);
                Err(error)
            }
        }
    }

    fn prepare(&self, request: &LoaderRunRequest) -> Result<LoaderContext, LoaderError> {
        let resource = if request.resource.is_empty() {
            None
        } else {
            Some(RequestParts::parse(&request.resource)?)
        };
        let loaders = split_stages(&request.loaders)
            .into_iter()
            .map(|stage| StageDescriptor::from_request(stage, self.references.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut ctx = LoaderContext::new(resource, loaders, Arc::clone(&self.options))
            .with_diagnostics(Arc::clone(&self.diagnostics))
            .with_resolver(Arc::clone(&self.resolver))
            .with_assets(Arc::clone(&self.assets))
            .with_observer(Arc::clone(&self.observer));
        ctx.seed(
            request.file_dependencies.clone(),
            request.context_dependencies.clone(),
            request.missing_dependencies.clone(),
            request.build_dependencies.clone(),
            request.asset_filenames.clone(),
        );
        ctx.set_pitching(request.is_pitching);

        self.observer
            .on_run_start(&request.resource, ctx.stages().len());
        self.run_compilation_hooks(&mut ctx)?;
        Ok(ctx)
    }

    /// Run the loader hooks of the compilation chain, innermost first.
    fn run_compilation_hooks(&self, ctx: &mut LoaderContext) -> Result<(), LoaderError> {
        let limit = self.options.nesting_limit;
        let mut depth = 0;
        let mut current = self.compilation.clone();
        while let Some(compilation) = current {
            if depth >= limit {
                return Err(LoaderError::NestingLimitExceeded { limit });
            }
            compilation.run_loader_hooks(ctx);
            depth += 1;
            current = compilation.parent();
        }
        Ok(())
    }

    async fn walk(
        &self,
        ctx: &mut LoaderContext,
        request: &LoaderRunRequest,
    ) -> Result<LoaderArgs, LoaderError> {
        if ctx.is_pitching() {
            ctx.set_loader_index(0);
            iterate_pitching_loaders(self.loader.as_ref(), ctx, LoaderArgs::none()).await
        } else {
            let args = request.initial_args()?;
            let last = isize::try_from(ctx.stages().len()).unwrap_or(isize::MAX) - 1;
            ctx.set_loader_index(last);
            iterate_normal_loaders(self.loader.as_ref(), ctx, args).await
        }
    }
}

impl std::fmt::Debug for LoaderRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderRunner")
            .field("options", &self.options)
            .field("has_compilation", &self.compilation.is_some())
            .finish_non_exhaustive()
    }
}

/// Build the result contract from the final context and arguments.
fn finish(mut ctx: LoaderContext, args: LoaderArgs) -> LoaderRunResult {
    let (content, source_map, additional_data) = args.into_parts();
    let collected = ctx.take_collections();
    LoaderRunResult {
        content: normalize_content(content),
        source_map: normalize_source_map(source_map),
        additional_data: normalize_additional_data(additional_data),
        file_dependencies: collected.file_dependencies,
        context_dependencies: collected.context_dependencies,
        missing_dependencies: collected.missing_dependencies,
        build_dependencies: collected.build_dependencies,
        cacheable: ctx.is_cacheable(),
        asset_filenames: collected.asset_filenames,
        is_pitching: ctx.is_pitching(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::implementation::{LoaderImplementation, LoaderRegistry};
    use serde_json::json;

    fn runner(registry: LoaderRegistry) -> LoaderRunner {
        LoaderRunner::new(Arc::new(registry))
    }

    #[test]
    fn test_no_stages_pitching_has_no_result() {
        let result = pollster::block_on(
            runner(LoaderRegistry::new()).run(LoaderRunRequest::new("/r.js", "")),
        )
        .unwrap();
        assert_eq!(result.content, None);
        assert!(result.is_pitching);
        assert!(result.cacheable);
    }

    #[test]
    fn test_no_stages_normal_passes_input_through() {
        let request = LoaderRunRequest::new("/r.js", "")
            .pitching(false)
            .with_content("body")
            .with_source_map(r#"{"version":3}"#)
            .with_additional_data(r#"{"k":1}"#);
        let result = pollster::block_on(runner(LoaderRegistry::new()).run(request)).unwrap();
        assert_eq!(result.content.as_deref(), Some(&b"body"[..]));
        assert_eq!(result.source_map.as_deref(), Some(&br#"{"version":3}"#[..]));
        assert_eq!(result.additional_data.as_deref(), Some(&br#"{"k":1}"#[..]));
        assert!(!result.is_pitching);
    }

    #[test]
    fn test_invalid_source_map_input() {
        let request = LoaderRunRequest::new("/r.js", "")
            .pitching(false)
            .with_source_map("{not json");
        let err = pollster::block_on(runner(LoaderRegistry::new()).run(request)).unwrap_err();
        assert!(matches!(
            err,
            LoaderError::InvalidInput {
                what: "source map",
                ..
            }
        ));
    }

    #[test]
    fn test_seeded_collections_survive() {
        let registry = LoaderRegistry::new().with(
            "a",
            LoaderImplementation::new().with_normal(|ctx, args| {
                ctx.add_dependency("/new.js");
                Ok(args.into())
            }),
        );
        let mut request = LoaderRunRequest::new("/r.js", "a")
            .pitching(false)
            .with_content("x");
        request.file_dependencies = vec!["/old.js".to_string()];
        request.asset_filenames = vec!["earlier.txt".to_string()];

        let result = pollster::block_on(runner(registry).run(request)).unwrap();
        assert_eq!(result.file_dependencies, vec!["/old.js", "/new.js"]);
        assert_eq!(result.asset_filenames, vec!["earlier.txt"]);
    }

    #[test]
    fn test_construction_error_fails_run() {
        let err = pollster::block_on(
            runner(LoaderRegistry::new()).run(LoaderRunRequest::new("/r.js", "a??nope")),
        )
        .unwrap_err();
        assert!(err.is_construction_error());
    }

    #[test]
    fn test_unknown_loader_fails_run() {
        let err = pollster::block_on(
            runner(LoaderRegistry::new()).run(LoaderRunRequest::new("/r.js", "missing")),
        )
        .unwrap_err();
        assert!(matches!(err, LoaderError::ImplementationLoad { .. }));
    }

    #[test]
    fn test_reference_lookup_through_runner() {
        let registry = LoaderRegistry::new().with(
            "a",
            LoaderImplementation::new().with_normal(|ctx, _args| {
                Ok(LoaderArgs::with_content(ctx.get_options().to_string()).into())
            }),
        );
        let mut refs = HashMap::new();
        refs.insert("ref1".to_string(), json!({"x": 1}));
        let runner = runner(registry).with_references(Arc::new(refs));
        let request = LoaderRunRequest::new("/r.js", "a??ref1").pitching(false);
        let result = pollster::block_on(runner.run(request)).unwrap();
        assert_eq!(result.content.as_deref(), Some(&br#"{"x":1}"#[..]));
    }
}
