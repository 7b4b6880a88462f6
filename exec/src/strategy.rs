use std::future::Future;

use futures_util::future::Either;
use tether_types::BoxError;
use tokio_util::sync::CancellationToken;

use crate::{
    DelegatedStrategy, ExecutionContext, ExecutionError, ExecutionStrategy, InProcessStrategy,
};

/// The strategies an application can be assembled with.
///
/// Chosen once, at composition time (explicitly or from configuration), and
/// dispatched statically from then on.
#[derive(Debug, Clone)]
pub enum Strategy {
    InProcess(InProcessStrategy),
    Delegated(DelegatedStrategy),
}

impl Strategy {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::InProcess(_) => "in_process",
            Self::Delegated(_) => "delegated",
        }
    }

    /// Whether this strategy enforces the context timeout itself.
    #[must_use]
    pub const fn enforces_deadline(&self) -> bool {
        matches!(self, Self::InProcess(_))
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Self::InProcess(InProcessStrategy::default())
    }
}

impl From<InProcessStrategy> for Strategy {
    fn from(strategy: InProcessStrategy) -> Self {
        Self::InProcess(strategy)
    }
}

impl From<DelegatedStrategy> for Strategy {
    fn from(strategy: DelegatedStrategy) -> Self {
        Self::Delegated(strategy)
    }
}

impl ExecutionStrategy for Strategy {
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
        match self {
            Self::InProcess(strategy) => Either::Left(strategy.execute(ctx, operation)),
            Self::Delegated(strategy) => Either::Right(strategy.execute(ctx, operation)),
        }
    }
}
