/*
 * runner/normal.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Right-to-left pass over the stages' normal functions.
 */

use crate::error::LoaderError;
use crate::implementation::ImplementationLoader;
use crate::value::LoaderArgs;

use super::completion::run_sync_or_async;
use super::context::LoaderContext;
use super::ensure_implementation;
use super::observer::Phase;

/// Walk the stages backward from the cursor, threading `args` through
/// every normal function. Returns the arguments left when the cursor
/// drops below the first stage.
pub(crate) async fn iterate_normal_loaders(
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

        if ctx.stages()[index].normal_executed() {
            ctx.set_loader_index(ctx.loader_index() - 1);
            continue;
        }

        let implementation = ensure_implementation(loader, ctx, index, Phase::Normal).await?;
        ctx.stages_mut()[index].mark_normal_executed();

        let Some(normal) = implementation.normal else {
            continue;
        };

        args.coerce_content(implementation.raw);

        let display = ctx.stages()[index].display();
        ctx.observer()
            .on_stage_start(Phase::Normal, &display, index, total);

        let stage_args = std::mem::take(&mut args);
        args = match run_sync_or_async(ctx, |ctx| normal(ctx, stage_args)).await {
            Ok(values) => values,
            Err(source) => {
                let error = LoaderError::stage(display.as_str(), source);
                ctx.observer()
                    .on_stage_error(Phase::Normal, &display, index, &error);
                return Err(error);
            }
        };
        ctx.observer()
            .on_stage_complete(Phase::Normal, &display, index, total);
    }
}
