//! Handle decoration.
//!
//! A decorator maps a handle to another handle with the same capability,
//! adding cross-cutting behavior (routing, instrumentation, caching) that the
//! eventual caller never has to know about.
//!
//! # Contract
//!
//! - Decoration is pure and total. A decorator that needs to fail does so when
//!   the returned handle is *invoked*, never while decorating.
//! - [`IDENTITY`] returns its input unchanged: same instance, no allocation.
//! - Composition is plain function composition. In a [`DecoratorChain`] the
//!   first decorator is the outermost and the last one sits closest to the
//!   base handle, so `[d1, d2]` behaves like `d1(d2(base))`.
//!
//! Any `Fn(H) -> H + Send + Sync` is a decorator, so closures and function
//! items can be used directly.

mod chain;

pub use chain::DecoratorChain;

/// Wraps a handle of type `H` with additional behavior.
pub trait Decorator<H>: Send + Sync {
    fn decorate(&self, handle: H) -> H;
}

impl<H, F> Decorator<H> for F
where
    F: Fn(H) -> H + Send + Sync,
{
    fn decorate(&self, handle: H) -> H {
        self(handle)
    }
}

/// The no-op decorator. Composing it with anything is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Identity;

/// Shared identity decorator.
pub const IDENTITY: Identity = Identity;

impl<H> Decorator<H> for Identity {
    #[inline]
    fn decorate(&self, handle: H) -> H {
        handle
    }
}

/// `outer` applied to the result of `inner`.
#[derive(Debug, Clone, Copy)]
pub struct Composed<O, I> {
    outer: O,
    inner: I,
}

impl<H, O, I> Decorator<H> for Composed<O, I>
where
    O: Decorator<H>,
    I: Decorator<H>,
{
    fn decorate(&self, handle: H) -> H {
        self.outer.decorate(self.inner.decorate(handle))
    }
}

/// Compose two decorators; `inner` is applied first.
pub fn compose<O, I>(outer: O, inner: I) -> Composed<O, I> {
    Composed { outer, inner }
}
