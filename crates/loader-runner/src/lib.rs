//! Two-phase loader pipeline runner
//!
//! This crate runs an ordered chain of content transform stages
//! ("loaders") against a single module and reports a normalized result
//! (content, source map, additional data, dependencies, cacheability)
//! back to the compiler.
//!
//! # Architecture
//!
//! - [`request`] - the `path?query#fragment` request grammar
//! - [`StageDescriptor`] - one stage, built from a request string or object
//! - [`LoaderContext`] - per-run state every stage operates on
//! - [`LoaderRunner`] - builds a run and walks the stages in two phases
//! - [`Completion`] - the single-completion handle for asynchronous stages
//!
//! Everything the runner needs from the compiler is injected: the
//! [`ImplementationLoader`], a [`Resolver`], a
//! [`DiagnosticsSink`](loader_diagnostics::DiagnosticsSink), a
//! [`ReferenceTable`], a [`Compilation`] chain and an [`AssetEmitter`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use loader_runner::{
//!     LoaderArgs, LoaderImplementation, LoaderRegistry, LoaderRunRequest, LoaderRunner,
//!     StageOutput,
//! };
//!
//! let registry = LoaderRegistry::new()
//!     .with(
//!         "cache",
//!         LoaderImplementation::new().with_pitch(|_ctx, args| {
//!             // Intercept when the remaining request is already cached.
//!             if args.remaining_request.ends_with("cached.js") {
//!                 return Ok(LoaderArgs::with_content("from cache").into());
//!             }
//!             Ok(StageOutput::none())
//!         }),
//!     )
//!     .with(
//!         "compile",
//!         LoaderImplementation::new().with_normal(|_ctx, _args| {
//!             Ok(LoaderArgs::with_content("compiled").into())
//!         }),
//!     );
//! let runner = LoaderRunner::new(Arc::new(registry));
//!
//! let hit = pollster::block_on(runner.run(LoaderRunRequest::new("/cached.js", "cache$compile")))
//!     .unwrap();
//! assert_eq!(hit.content.as_deref(), Some(&b"from cache"[..]));
//! assert!(!hit.is_pitching);
//!
//! let miss = pollster::block_on(runner.run(LoaderRunRequest::new("/fresh.js", "cache$compile")))
//!     .unwrap();
//! assert_eq!(miss.content, None);
//! assert!(miss.is_pitching);
//! ```

pub mod artifact;
pub mod collaborators;
pub mod descriptor;
pub mod error;
pub mod implementation;
pub mod options;
pub mod request;
pub mod runner;
pub mod utils;
pub mod value;

// Re-export commonly used types
pub use artifact::{AssetSource, AssetStore, EmittedAsset};
pub use collaborators::{AssetEmitter, Compilation, ReferenceTable, Resolver, UnsupportedResolver};
pub use descriptor::{DataBag, StageDescriptor, StageInput, StageObject};
pub use error::{DoubleCompletionDefect, LoaderError, MISSING_IDENT, StageError};
pub use implementation::{
    ImplementationLoader, LoaderImplementation, LoaderRegistry, NormalFn, PitchArgs, PitchFn,
    StageOutput, StageResult,
};
pub use options::{OptionsError, RunnerOptions};
pub use request::RequestParts;
pub use runner::completion::Completion;
pub use runner::context::LoaderContext;
pub use runner::handle::LoaderHandle;
pub use runner::observer::{EventLevel, LoaderObserver, NoopObserver, Phase, TracingObserver};
pub use runner::orchestrator::{LoaderRunRequest, LoaderRunResult, LoaderRunner};
pub use utils::{LoaderHash, LoaderUtils};
pub use value::{LoaderArgs, LoaderValue};
