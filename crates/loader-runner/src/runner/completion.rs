/*
 * runner/completion.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Single-completion adapter for stage functions.
 */

//! Single-completion adapter.
//!
//! A stage function finishes in one of three ways:
//!
//! 1. it returns [`StageOutput::Values`] synchronously
//! 2. it returns [`StageOutput::Future`], finishing when the future resolves
//! 3. it calls [`LoaderContext::async_completion`] and later completes the
//!    returned [`Completion`] exactly once (or calls
//!    [`LoaderContext::callback`] before returning)
//!
//! ```text
//! RUNNING ──return──────────────► DONE
//!    │                             ▲
//!    └──async_completion()──► AWAITING ──complete()──┘
//! ```
//!
//! Completing a stage twice is a defect and panics with
//! [`DoubleCompletionDefect`], unless the stage already failed, in which
//! case later completions are dropped.
//!
//! [`LoaderContext::async_completion`]: super::context::LoaderContext::async_completion
//! [`LoaderContext::callback`]: super::context::LoaderContext::callback

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::{DoubleCompletionDefect, StageError};
use crate::implementation::{StageOutput, StageResult};
use crate::value::LoaderArgs;

use super::context::LoaderContext;

type CompletionSender = oneshot::Sender<Result<LoaderArgs, StageError>>;

#[derive(Debug)]
struct CompletionState {
    is_sync: bool,
    is_done: bool,
    reported_error: bool,
    sender: Option<CompletionSender>,
}

/// Handle through which a stage signals that it finished.
///
/// Cloning the handle does not allow a second completion: all clones
/// share one state.
#[derive(Debug, Clone)]
pub struct Completion {
    state: Arc<Mutex<CompletionState>>,
    request: Option<String>,
}

impl Completion {
    fn new(sender: Option<CompletionSender>, request: Option<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CompletionState {
                is_sync: true,
                is_done: false,
                reported_error: false,
                sender,
            })),
            request,
        }
    }

    /// A completion not attached to any running stage. Completing it has
    /// no effect.
    pub(crate) fn detached() -> Self {
        let completion = Self::new(None, None);
        completion.lock().is_sync = false;
        completion
    }

    fn lock(&self) -> MutexGuard<'_, CompletionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn defect(&self, entry: &'static str) -> DoubleCompletionDefect {
        DoubleCompletionDefect {
            entry,
            request: self.request.clone(),
        }
    }

    /// Deliver the stage's result.
    ///
    /// # Panics
    ///
    /// Panics if the stage was already completed and had not failed.
    pub fn complete(&self, result: Result<LoaderArgs, StageError>) {
        let mut state = self.lock();
        if state.is_done {
            if state.reported_error {
                return;
            }
            drop(state);
            panic!("{}", self.defect("callback"));
        }
        state.is_done = true;
        state.is_sync = false;
        if let Some(sender) = state.sender.take() {
            // The receiver is gone only if the run itself was dropped.
            let _ = sender.send(result);
        }
    }

    /// Complete successfully with the given values.
    pub fn succeed(&self, args: LoaderArgs) {
        self.complete(Ok(args));
    }

    /// Complete with a failure.
    pub fn fail(&self, error: impl Into<StageError>) {
        self.complete(Err(error.into()));
    }

    /// Check if the stage already completed.
    pub fn is_done(&self) -> bool {
        self.lock().is_done
    }

    /// Switch to asynchronous completion.
    pub(crate) fn enter_async(&self) -> Completion {
        let mut state = self.lock();
        if state.is_done {
            if !state.reported_error {
                drop(state);
                panic!("{}", self.defect("async"));
            }
        } else {
            state.is_sync = false;
        }
        self.clone()
    }
}

enum Settled {
    Output(StageOutput),
    Callback,
}

/// Run one stage function through the completion protocol.
///
/// The active [`Completion`] is installed on the context before `call`
/// runs, so the stage can reach it through its context.
pub(crate) async fn run_sync_or_async<F>(
    ctx: &mut LoaderContext,
    call: F,
) -> Result<LoaderArgs, StageError>
where
    F: FnOnce(&mut LoaderContext) -> StageResult,
{
    let (sender, receiver) = oneshot::channel();
    let completion = Completion::new(Some(sender), ctx.current_display());
    ctx.set_completion(completion.clone());

    let returned = call(ctx);
    // Only the stage's own handles may keep the sender alive from here on,
    // so a stage that drops them fails instead of hanging.
    ctx.clear_completion();

    let settled = {
        let mut state = completion.lock();
        match returned {
            Ok(output) if state.is_sync => {
                state.is_done = true;
                Settled::Output(output)
            }
            // Already completed via callback or awaiting the async handle;
            // the returned value is ignored.
            Ok(_) => Settled::Callback,
            Err(error) if state.is_done => {
                drop(state);
                panic!(
                    "{}: stage failed after completing: {error:#}",
                    completion.defect("callback")
                );
            }
            Err(error) => {
                state.is_done = true;
                state.reported_error = true;
                state.sender = None;
                return Err(error);
            }
        }
    };
    drop(completion);

    match settled {
        Settled::Output(StageOutput::Values(args)) => Ok(args),
        Settled::Output(StageOutput::Future(future)) => future.await,
        Settled::Callback => receiver.await.unwrap_or_else(|_| {
            Err(anyhow::anyhow!(
                "Stage never completed: its completion handle was dropped without being called"
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_twice_after_failure_is_dropped() {
        let completion = Completion::new(None, None);
        completion.lock().reported_error = true;
        completion.lock().is_done = true;
        completion.succeed(LoaderArgs::none());
        completion.fail(anyhow::anyhow!("late"));
        assert!(completion.is_done());
    }

    #[test]
    #[should_panic(expected = "callback(): The callback was already called.")]
    fn test_complete_twice_panics() {
        let completion = Completion::new(None, Some("./a-loader".to_string()));
        completion.succeed(LoaderArgs::none());
        completion.succeed(LoaderArgs::none());
    }

    #[test]
    #[should_panic(expected = "async(): The callback was already called.")]
    fn test_enter_async_after_done_panics() {
        let completion = Completion::new(None, None);
        completion.succeed(LoaderArgs::none());
        let _ = completion.enter_async();
    }

    #[test]
    fn test_clones_share_state() {
        let completion = Completion::new(None, None);
        let other = completion.clone();
        other.succeed(LoaderArgs::with_content("x"));
        assert!(completion.is_done());
    }

    #[test]
    fn test_detached_completion_is_inert() {
        let completion = Completion::detached();
        completion.succeed(LoaderArgs::none());
        assert!(completion.is_done());
    }
}
