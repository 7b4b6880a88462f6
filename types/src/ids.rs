use std::fmt;
use std::num::NonZeroU32;

use crate::ContextError;

/// Opaque correlation token for one logical interaction.
///
/// Never parsed or interpreted; it only travels into log fields and error
/// payloads so separate attempts of the same request can be tied together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct InteractionId(String);

impl InteractionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for InteractionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for InteractionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for InteractionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 1-based attempt counter supplied by the caller.
///
/// Zero is unrepresentable. Strategies only report this value; moving to the
/// next attempt is the caller's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Attempt(NonZeroU32);

impl Attempt {
    pub const FIRST: Attempt = Attempt(NonZeroU32::MIN);

    pub fn new(value: u32) -> Result<Self, ContextError> {
        NonZeroU32::new(value)
            .map(Self)
            .ok_or(ContextError::ZeroAttempt)
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// The following attempt, saturating at `u32::MAX`.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl Default for Attempt {
    fn default() -> Self {
        Self::FIRST
    }
}

impl TryFrom<u32> for Attempt {
    type Error = ContextError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Attempt> for u32 {
    fn from(value: Attempt) -> Self {
        value.get()
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
