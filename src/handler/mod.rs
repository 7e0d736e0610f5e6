//! # Handler Module
//!
//! Handlers are the units of work a method executes: any number of
//! pre-handlers, one primary handler and any number of post-handlers. All of
//! them implement the same [`Handler`] trait.
//!
//! - [`Handler`] - `serve(&Request) -> HandlerResult`
//! - [`HandlerFn`] - adapter for plain closures
//! - [`HandlerChain`] - append-only ordered list with lock-free snapshots
//!
//! ## Example
//!
//! ```rust
//! use methodchain::handler::{shared, HandlerChain, HandlerFn};
//! use methodchain::request::Request;
//! use serde_json::{json, Value};
//!
//! let chain = HandlerChain::new();
//! chain.append(shared(HandlerFn::new(|_req: &Request| Ok(None))));
//! chain.append(shared(HandlerFn::new(|_req: &Request| Ok(Some(json!("audited"))))));
//!
//! let req = Request::new("audit", Value::Null);
//! for handler in chain.snapshot().iter() {
//!     handler.serve(&req).unwrap();
//! }
//! ```

mod chain;
mod core;

pub use self::chain::{ChainSnapshot, HandlerChain};
pub use self::core::{shared, Handler, HandlerFn, HandlerResult, SharedHandler};

pub(crate) use self::core::present;
