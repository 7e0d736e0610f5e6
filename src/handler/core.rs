use std::sync::Arc;

use serde_json::Value;

use crate::request::Request;

/// Result of a single handler stage.
///
/// `Ok(None)` (or `Ok(Some(Value::Null))`) means the stage ran successfully
/// and produced no result.
pub type HandlerResult = anyhow::Result<Option<Value>>;

/// A unit of request-processing logic.
///
/// Pre-handlers, the primary handler and post-handlers all implement this
/// trait; they differ only by where they sit in a [`Method`](crate::method::Method).
/// Implementations must be `Send + Sync` because one handler instance serves
/// every concurrent dispatch of its method.
pub trait Handler: Send + Sync + 'static {
    fn serve(&self, req: &Request) -> HandlerResult;
}

/// Adapter that lets an ordinary closure act as a [`Handler`]
///
/// ```rust
/// use methodchain::handler::{Handler, HandlerFn};
/// use methodchain::request::Request;
/// use serde_json::json;
///
/// let square = HandlerFn::new(|req: &Request| {
///     let n = req.args.as_i64().unwrap_or(0);
///     Ok(Some(json!(n * n)))
/// });
/// let out = square.serve(&Request::new("square", json!(4))).unwrap();
/// assert_eq!(out, Some(json!(16)));
/// ```
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F>
where
    F: Fn(&Request) -> HandlerResult + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&Request) -> HandlerResult + Send + Sync + 'static,
{
    #[inline]
    fn serve(&self, req: &Request) -> HandlerResult {
        (self.f)(req)
    }
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    #[inline]
    fn serve(&self, req: &Request) -> HandlerResult {
        (**self).serve(req)
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    #[inline]
    fn serve(&self, req: &Request) -> HandlerResult {
        (**self).serve(req)
    }
}

/// Shared, type-erased handler as stored in chains
pub type SharedHandler = Arc<dyn Handler>;

/// Erase a handler into the form stored by chains and methods
pub fn shared<H: Handler>(handler: H) -> SharedHandler {
    Arc::new(handler)
}

/// Normalize a stage result: JSON `null` counts as "no result"
#[inline]
pub(crate) fn present(value: Option<Value>) -> Option<Value> {
    value.filter(|v| !v.is_null())
}
