//! Strategy for hosts that already enforce deadlines themselves.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tether_types::{BoxError, Outcome};
use tokio_util::sync::CancellationToken;

use crate::error::{ExecutionError, OperationPanicked, panic_payload_to_string};
use crate::settle::settle;
use crate::{ExecutionContext, ExecutionStrategy};

/// Runs the operation inline, without a second layer of time-bounding.
///
/// Meant for code already running inside an environment that owns timeouts,
/// retries and durability (for example a workflow-engine activity). The
/// context is still validated, caller cancellation still interrupts the wait,
/// and failures are classified exactly as
/// [`InProcessStrategy`](crate::InProcessStrategy) does, so callers can swap
/// strategies without changing their error handling. The context timeout is
/// not enforced here.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelegatedStrategy;

impl DelegatedStrategy {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ExecutionStrategy for DelegatedStrategy {
    fn execute<T, E, F, Fut>(
        &self,
        ctx: &ExecutionContext,
        operation: F,
    ) -> impl Future<Output = Result<T, ExecutionError>> + Send
    where
        T: Send + 'static,
        E: Into<BoxError> + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        async move {
            ctx.validate()?;
            if ctx.is_interrupted() {
                return settle(ctx, Outcome::Interrupted);
            }

            let signal = ctx.cancellation().child_token();
            let operation_signal = signal.clone();
            // Building the future may itself panic, so it happens inside the guard.
            let guarded = AssertUnwindSafe(async move { operation(operation_signal).await });

            // No deadline branch: the host enforces time limits.
            let outcome = tokio::select! {
                biased;
                () = ctx.cancellation().cancelled() => Outcome::Interrupted,
                finished = guarded.catch_unwind() => match finished {
                    Ok(result) => Outcome::from(result),
                    Err(payload) => Outcome::Failed(Box::new(OperationPanicked {
                        message: panic_payload_to_string(&*payload),
                    })),
                },
            };

            if outcome.requires_cancellation() {
                signal.cancel();
            }

            settle(ctx, outcome)
        }
    }
}
