use tether_types::Outcome;

use crate::ExecutionContext;
use crate::error::{ExecutionError, classify_failure};

/// Translate a classified outcome into the caller-facing result.
///
/// This is the only place execution logs. Cancellation of the in-flight
/// operation is the strategy's job and must already have happened.
pub(crate) fn settle<T>(ctx: &ExecutionContext, outcome: Outcome<T>) -> Result<T, ExecutionError> {
    match outcome {
        Outcome::Success(value) => Ok(value),
        Outcome::TimedOut => {
            let timeout_ms = ctx.timeout_ms();
            tracing::warn!(
                interaction_id = %ctx.interaction_id(),
                attempt = ctx.attempt().get(),
                timeout_ms,
                "Operation timed out; cancellation requested"
            );
            Err(ExecutionError::Timeout {
                interaction_id: ctx.interaction_id().clone(),
                attempt: ctx.attempt(),
                timeout_ms,
            })
        }
        Outcome::Interrupted => {
            tracing::warn!(
                interaction_id = %ctx.interaction_id(),
                attempt = ctx.attempt().get(),
                "Wait interrupted by caller; cancellation requested"
            );
            Err(ExecutionError::Interrupted {
                interaction_id: ctx.interaction_id().clone(),
                attempt: ctx.attempt(),
            })
        }
        Outcome::Failed(cause) => Err(classify_failure(ctx.interaction_id(), cause)),
    }
}
