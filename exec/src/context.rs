use std::time::Duration;

use tether_types::{Attempt, ContextError, InteractionId};
use tokio_util::sync::CancellationToken;

/// Per-call execution parameters.
///
/// Immutable once built: the `with_*` methods consume and return a new value.
/// Cloning is cheap and clones share the same caller cancellation token.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    interaction_id: InteractionId,
    timeout: Duration,
    attempt: Attempt,
    cancellation: CancellationToken,
}

impl ExecutionContext {
    /// First attempt with a fresh, never-cancelled caller token.
    ///
    /// The timeout is not checked here; strategies reject a zero timeout with
    /// [`ContextError::NonPositiveTimeout`] before running anything.
    pub fn new(interaction_id: impl Into<InteractionId>, timeout: Duration) -> Self {
        Self {
            interaction_id: interaction_id.into(),
            timeout,
            attempt: Attempt::FIRST,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_attempt(mut self, attempt: Attempt) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tie this call to the caller's own cancellation context.
    ///
    /// Cancelling `token` while a strategy is waiting interrupts the call. The
    /// strategy never resets it, so the caller still observes the cancellation
    /// afterwards.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Same interaction, next attempt. For callers that retry.
    #[must_use]
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt.next(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn interaction_id(&self) -> &InteractionId {
        &self.interaction_id
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Timeout in whole milliseconds, rounded up so sub-millisecond budgets
    /// never report as zero.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_micros().div_ceil(1000)).unwrap_or(u64::MAX)
    }

    #[must_use]
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn validate(&self) -> Result<(), ContextError> {
        if self.timeout.is_zero() {
            return Err(ContextError::NonPositiveTimeout);
        }
        Ok(())
    }
}
