use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::core::SharedHandler;

/// Immutable view of a chain at one point in time
pub type ChainSnapshot = Arc<Vec<SharedHandler>>;

/// Ordered, append-only list of handler stages.
///
/// Appends publish a new copy of the list (copy-on-append through
/// [`ArcSwap::rcu`]); readers take a lock-free [`snapshot`](Self::snapshot)
/// and iterate it without ever observing a half-built list. A snapshot is
/// unaffected by appends that land after it was taken, and no lock is held
/// while the handlers in it run.
pub struct HandlerChain {
    handlers: ArcSwap<Vec<SharedHandler>>,
}

impl HandlerChain {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Add a handler to the end of the chain.
    ///
    /// Visible to every snapshot taken after this call returns. Concurrent
    /// appends are all retained; their relative order is the order in which
    /// they were published.
    pub fn append(&self, handler: SharedHandler) {
        self.handlers.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&handler));
            next
        });
    }

    /// Current handlers, in call order
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> ChainSnapshot {
        self.handlers.load_full()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.load().is_empty()
    }
}

impl Default for HandlerChain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("len", &self.len())
            .finish()
    }
}
