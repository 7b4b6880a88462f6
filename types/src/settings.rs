//! Resolved execution settings shared across crates.

use serde::{Deserialize, Serialize};

/// What a strategy does to an in-flight operation once it stops waiting for it.
///
/// Both modes are best-effort: neither can undo side effects the operation has
/// already performed, such as a request that has already left the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelMode {
    /// Fire the operation's cancellation token and detach it. The operation
    /// decides when (and whether) to stop; its result is discarded.
    #[default]
    Signal,
    /// Fire the token and also abort the task, which stops it at its next
    /// suspension point.
    Abort,
}

impl CancelMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::Abort => "abort",
        }
    }
}
