//! Failure taxonomy for bounded execution.

use std::any::Any;
use std::error::Error as StdError;

use tether_types::{Attempt, BoxError, ContextError, InteractionId};
use thiserror::Error;
use tokio::task::JoinError;

/// The only ways an execution can fail.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The context was rejected; the operation never ran.
    #[error("invalid execution context: {0}")]
    Validation(#[from] ContextError),
    /// The deadline passed while waiting. The operation was sent a
    /// cancellation signal but may still be running.
    #[error("interaction {interaction_id} timed out after {timeout_ms}ms (attempt {attempt})")]
    Timeout {
        interaction_id: InteractionId,
        attempt: Attempt,
        timeout_ms: u64,
    },
    /// The caller's cancellation token fired while waiting.
    #[error("interaction {interaction_id} interrupted while waiting (attempt {attempt})")]
    Interrupted {
        interaction_id: InteractionId,
        attempt: Attempt,
    },
    /// The operation failed. `source` is the operation's own error, untouched.
    #[error("interaction {interaction_id} failed: {source}")]
    Failed {
        interaction_id: InteractionId,
        #[source]
        source: BoxError,
    },
}

/// Fieldless discriminant of [`ExecutionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Timeout,
    Interrupted,
    Failed,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Timeout => "timeout",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }
}

impl ExecutionError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Interrupted { .. } => ErrorKind::Interrupted,
            Self::Failed { .. } => ErrorKind::Failed,
        }
    }

    /// Correlation id of the failed interaction. `None` for validation errors.
    #[must_use]
    pub fn interaction_id(&self) -> Option<&InteractionId> {
        match self {
            Self::Validation(_) => None,
            Self::Timeout { interaction_id, .. }
            | Self::Interrupted { interaction_id, .. }
            | Self::Failed { interaction_id, .. } => Some(interaction_id),
        }
    }

    #[must_use]
    pub fn attempt(&self) -> Option<Attempt> {
        match self {
            Self::Timeout { attempt, .. } | Self::Interrupted { attempt, .. } => Some(*attempt),
            Self::Validation(_) | Self::Failed { .. } => None,
        }
    }

    /// Recover the operation's own error if it has type `E`.
    #[must_use]
    pub fn cause<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        match self {
            Self::Failed { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// The operation panicked instead of returning.
#[derive(Debug, Clone, Error)]
#[error("operation panicked: {message}")]
pub struct OperationPanicked {
    pub message: String,
}

/// Cancelled while still waiting for a concurrency slot; never started.
#[derive(Debug, Clone, Copy, Error)]
#[error("operation cancelled before it started")]
pub(crate) struct NotStarted;

/// Turn an operation's failure into an [`ExecutionError`].
///
/// Errors that already belong to the taxonomy pass through unchanged so
/// nested executions are not wrapped twice.
pub(crate) fn classify_failure(interaction_id: &InteractionId, cause: BoxError) -> ExecutionError {
    let cause = match cause.downcast::<ExecutionError>() {
        Ok(own) => return *own,
        Err(cause) => cause,
    };
    match cause.downcast::<ContextError>() {
        Ok(invalid) => ExecutionError::Validation(*invalid),
        Err(cause) => ExecutionError::Failed {
            interaction_id: interaction_id.clone(),
            source: cause,
        },
    }
}

pub(crate) fn join_failure(err: JoinError) -> BoxError {
    if err.is_panic() {
        let payload = err.into_panic();
        return Box::new(OperationPanicked {
            message: panic_payload_to_string(&*payload),
        });
    }
    Box::new(err)
}

pub(crate) fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use tether_types::{Attempt, BoxError, ContextError, InteractionId};

    use super::{ErrorKind, ExecutionError, OperationPanicked, classify_failure};

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct IllegalState(String);

    fn id(s: &str) -> InteractionId {
        InteractionId::from(s)
    }

    #[test]
    fn foreign_errors_are_wrapped_with_the_interaction() {
        let err = classify_failure(&id("req-3"), Box::new(IllegalState("x".into())));
        assert_eq!(err.kind(), ErrorKind::Failed);
        assert_eq!(err.interaction_id(), Some(&id("req-3")));
        assert_eq!(err.cause::<IllegalState>().map(|e| e.0.as_str()), Some("x"));
    }

    #[test]
    fn own_errors_pass_through_unchanged() {
        let inner = ExecutionError::Timeout {
            interaction_id: id("inner"),
            attempt: Attempt::FIRST.next(),
            timeout_ms: 5,
        };
        let err = classify_failure(&id("outer"), Box::new(inner));
        match err {
            ExecutionError::Timeout {
                interaction_id,
                attempt,
                timeout_ms,
            } => {
                assert_eq!(interaction_id, id("inner"));
                assert_eq!(attempt.get(), 2);
                assert_eq!(timeout_ms, 5);
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[test]
    fn context_errors_become_validation() {
        let cause: BoxError = Box::new(ContextError::NonPositiveTimeout);
        let err = classify_failure(&id("req"), cause);
        assert!(matches!(
            err,
            ExecutionError::Validation(ContextError::NonPositiveTimeout)
        ));
        assert_eq!(err.interaction_id(), None);
    }

    #[test]
    fn failed_keeps_the_source_chain() {
        let err = classify_failure(&id("req"), "plain message".into());
        let source = StdError::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("plain message"));
        assert_eq!(err.to_string(), "interaction req failed: plain message");
    }

    #[test]
    fn timeout_message_carries_fields() {
        let err = ExecutionError::Timeout {
            interaction_id: id("req-2"),
            attempt: Attempt::FIRST,
            timeout_ms: 10,
        };
        assert_eq!(
            err.to_string(),
            "interaction req-2 timed out after 10ms (attempt 1)"
        );
        assert_eq!(err.attempt(), Some(Attempt::FIRST));
        assert_eq!(ErrorKind::Timeout.as_str(), "timeout");
    }

    #[test]
    fn panics_are_described() {
        let err = OperationPanicked {
            message: "kaboom".into(),
        };
        assert_eq!(err.to_string(), "operation panicked: kaboom");
    }
}
