/*
 * runner/pitch.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Left-to-right pass over the stages' pitch functions.
 */

use crate::descriptor::DataBag;
use crate::error::LoaderError;
use crate::implementation::{ImplementationLoader, PitchArgs};
use crate::value::LoaderArgs;

use super::completion::run_sync_or_async;
use super::context::LoaderContext;
use super::ensure_implementation;
use super::normal::iterate_normal_loaders;
use super::observer::Phase;

/// Walk the stages forward from the cursor, running pitch functions.
///
/// The first pitch that produces any defined value intercepts the run:
/// the phase flips to normal, the cursor steps back one stage, and the
/// normal walk starts from there with the pitch result as its arguments.
/// Walking past the last stage without interception returns the last
/// (all-undefined) pitch result: the run has no local result.
pub(crate) async fn iterate_pitching_loaders(
    loader: &dyn ImplementationLoader,
    ctx: &mut LoaderContext,
    mut args: LoaderArgs,
) -> Result<LoaderArgs, LoaderError> {
    let total = ctx.stages().len();
    loop {
        let Some(index) = usize::try_from(ctx.loader_index())
            .ok()
            .filter(|&i| i < total)
        else {
            return Ok(args);
        };

        if ctx.stages()[index].pitch_executed() {
            ctx.set_loader_index(ctx.loader_index() + 1);
            continue;
        }

        let implementation = ensure_implementation(loader, ctx, index, Phase::Pitch).await?;
        ctx.stages_mut()[index].mark_pitch_executed();

        let Some(pitch) = implementation.pitch else {
            continue;
        };

        let pitch_args = PitchArgs {
            remaining_request: ctx.remaining_request(),
            previous_request: ctx.previous_request(),
        };
        ctx.stages_mut()[index].data = DataBag::new();

        let display = ctx.stages()[index].display();
        ctx.observer()
            .on_stage_start(Phase::Pitch, &display, index, total);

        let values = match run_sync_or_async(ctx, |ctx| pitch(ctx, pitch_args)).await {
            Ok(values) => values,
            Err(source) => {
                let error = LoaderError::stage(display.as_str(), source);
                ctx.observer()
                    .on_stage_error(Phase::Pitch, &display, index, &error);
                return Err(error);
            }
        };
        ctx.observer()
            .on_stage_complete(Phase::Pitch, &display, index, total);

        if values.has_defined() {
            ctx.observer().on_intercept(&display, index);
            ctx.set_pitching(false);
            ctx.set_loader_index(ctx.loader_index() - 1);
            return iterate_normal_loaders(loader, ctx, values).await;
        }
        args = values;
    }
}
