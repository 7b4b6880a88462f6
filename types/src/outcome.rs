//! Terminal result of one bounded execution.

use crate::BoxError;

/// Exactly one of these is produced per invocation; there are no partial results.
///
/// Strategies classify what happened into an `Outcome` first and only then
/// translate non-success variants into their error type, so the mapping from
/// outcome to failure kind lives in one place.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The operation finished before the deadline.
    Success(T),
    /// The deadline passed while the caller was still waiting.
    TimedOut,
    /// The caller's own cancellation signal fired while it was waiting.
    Interrupted,
    /// The operation itself failed (including panics).
    Failed(BoxError),
}

impl<T> Outcome<T> {
    /// Whether the in-flight operation should be sent a cancellation signal.
    #[must_use]
    pub const fn requires_cancellation(&self) -> bool {
        matches!(self, Self::TimedOut | Self::Interrupted)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::TimedOut => Outcome::TimedOut,
            Self::Interrupted => Outcome::Interrupted,
            Self::Failed(cause) => Outcome::Failed(cause),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T>
where
    E: Into<BoxError>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Failed(err.into()),
        }
    }
}
