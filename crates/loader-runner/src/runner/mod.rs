/*
 * runner/mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Two-phase loader pipeline execution.
 */

//! Two-phase loader pipeline execution.
//!
//! ```text
//!            pitch:  a ──► b ──► c ──► (resource)
//!                                       │
//!           normal:  a ◄── b ◄── c ◄────┘
//! ```
//!
//! A run first walks the stages left to right calling `pitch` functions
//! ([`pitch`]), then right to left calling `normal` functions
//! ([`normal`]). A pitch that returns a value short-circuits: the stages
//! after it never run and the normal walk starts at the stage before it.
//!
//! - [`LoaderRunner`](orchestrator::LoaderRunner) - entry point
//! - [`LoaderContext`](context::LoaderContext) - what stages see
//! - [`Completion`](completion::Completion) - asynchronous completion handle
//! - [`LoaderHandle`](handle::LoaderHandle) - run access for asynchronous stage work
//! - [`LoaderObserver`](observer::LoaderObserver) - run events

pub mod completion;
pub mod context;
pub mod handle;
pub mod normal;
pub mod observer;
pub mod orchestrator;
pub mod pitch;

use crate::error::LoaderError;
use crate::implementation::{ImplementationLoader, LoaderImplementation};

use context::LoaderContext;
use observer::Phase;

/// The implementation of stage `index`, loading and caching it on first
/// use.
///
/// A load failure marks the module uncacheable.
pub(crate) async fn ensure_implementation(
    loader: &dyn ImplementationLoader,
    ctx: &mut LoaderContext,
    index: usize,
    phase: Phase,
) -> Result<LoaderImplementation, LoaderError> {
    if let Some(implementation) = ctx.stages()[index].implementation() {
        return Ok(implementation.clone());
    }

    let loaded = loader.load(&ctx.stages()[index]).await;
    match loaded {
        Ok(implementation) => {
            ctx.stages_mut()[index].set_implementation(implementation.clone());
            Ok(implementation)
        }
        Err(source) => {
            ctx.cacheable(false);
            let request = ctx.stages()[index].display();
            let error = LoaderError::ImplementationLoad {
                request: request.clone(),
                source,
            };
            ctx.observer().on_stage_error(phase, &request, index, &error);
            Err(error)
        }
    }
}
