//! Deadline-bounded execution of long-running operations.
//!
//! # Architecture
//!
//! Every call goes through an [`ExecutionStrategy`]:
//!
//! - [`InProcessStrategy`] - spawns the operation on a Tokio task and waits for
//!   it, the caller's cancellation token, or the deadline, whichever comes first
//! - [`DelegatedStrategy`] - runs the operation inline and leaves deadlines to
//!   the hosting environment (e.g. a durable-workflow activity)
//! - [`Strategy`] - closed set of the above, picked when the application is
//!   assembled
//!
//! The caller-facing contract is identical for all of them: the value on
//! success, otherwise exactly one [`ExecutionError`] variant.
//!
//! # Cancellation
//!
//! Operations receive a [`CancellationToken`]. It fires when the strategy stops
//! waiting (timeout or interruption). Cancellation is advisory: an operation
//! that has already sent a request cannot unsend it, and one that ignores the
//! token keeps running in the background with its result discarded. See
//! [`CancelMode`] for the optional hard abort.
//!
//! # Logging
//!
//! Strategies log only when they give up waiting, at `warn`, with the same
//! fields the returned error carries.

mod context;
mod delegated;
mod error;
mod in_process;
mod settle;
mod strategy;

use std::future::Future;
use std::sync::Arc;

pub use context::ExecutionContext;
pub use delegated::DelegatedStrategy;
pub use error::{ErrorKind, ExecutionError, OperationPanicked};
pub use in_process::InProcessStrategy;
pub use strategy::Strategy;

pub use tether_types::{Attempt, BoxError, CancelMode, ContextError, InteractionId, Outcome};
pub use tokio_util::sync::CancellationToken;

/// Runs an operation under the deadline and cancellation rules of an
/// [`ExecutionContext`].
///
/// An operation is any `FnOnce(CancellationToken) -> impl Future<Output =
/// Result<T, E>>`. The error type only needs to convert into [`BoxError`]; it
/// is preserved as the `source` of [`ExecutionError::Failed`] unless it already
/// is an [`ExecutionError`], in which case it is returned as is.
///
/// Implementations must:
/// - fail with [`ExecutionError::Validation`] before running anything when the
///   context is invalid
/// - never change the context's attempt number
/// - never retry
pub trait ExecutionStrategy: Send + Sync {
    fn execute<T, E, F, Fut>(
        &self,
        ctx: &ExecutionContext,
        operation: F,
    ) -> impl Future<Output = Result<T, ExecutionError>> + Send
    where
        T: Send + 'static,
        E: Into<BoxError> + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static;
}

impl<S> ExecutionStrategy for Arc<S>
where
    S: ExecutionStrategy,
{
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
        (**self).execute(ctx, operation)
    }
}
