use std::fmt;
use std::sync::Arc;

use crate::Decorator;

/// Ordered decorators applied outer-to-inner.
///
/// Index 0 is the outermost wrapper; the last entry wraps the base handle
/// directly. An empty chain returns the base handle untouched.
pub struct DecoratorChain<H> {
    decorators: Vec<Arc<dyn Decorator<H>>>,
}

impl<H> DecoratorChain<H> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            decorators: Vec::new(),
        }
    }

    /// Append a decorator. It becomes the innermost one so far.
    pub fn then(mut self, decorator: impl Decorator<H> + 'static) -> Self {
        self.push(decorator);
        self
    }

    pub fn push(&mut self, decorator: impl Decorator<H> + 'static) {
        self.decorators.push(Arc::new(decorator));
    }

    /// Append an already shared decorator.
    pub fn push_shared(&mut self, decorator: Arc<dyn Decorator<H>>) {
        self.decorators.push(decorator);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.decorators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decorators.is_empty()
    }

    /// Wrap `base` with every decorator, innermost first.
    pub fn apply(&self, base: H) -> H {
        self.decorators
            .iter()
            .rev()
            .fold(base, |handle, decorator| decorator.decorate(handle))
    }
}

impl<H> Default for DecoratorChain<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Clone for DecoratorChain<H> {
    fn clone(&self) -> Self {
        Self {
            decorators: self.decorators.clone(),
        }
    }
}

impl<H> fmt::Debug for DecoratorChain<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorChain")
            .field("len", &self.decorators.len())
            .finish()
    }
}

impl<H> Decorator<H> for DecoratorChain<H> {
    fn decorate(&self, handle: H) -> H {
        self.apply(handle)
    }
}

impl<H> FromIterator<Arc<dyn Decorator<H>>> for DecoratorChain<H> {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Decorator<H>>>>(iter: I) -> Self {
        Self {
            decorators: iter.into_iter().collect(),
        }
    }
}
