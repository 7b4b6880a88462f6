//! Core domain types for Tether.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! The execution and decoration crates build on these; nothing here knows how an
//! operation is actually run.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod ids;
mod outcome;
mod settings;

pub use ids::{Attempt, InteractionId};
pub use outcome::Outcome;
pub use settings::CancelMode;

use std::error::Error as StdError;

use thiserror::Error;

/// Type-erased failure cause produced by an operation.
///
/// Anything implementing `std::error::Error` converts into this, as do
/// `String` and `&str`, so operations can fail with whatever they already have.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// An execution context that cannot be run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("timeout must be strictly positive")]
    NonPositiveTimeout,
    #[error("attempt numbers start at 1")]
    ZeroAttempt,
}
