//! # Method Module
//!
//! A [`Method`] is what a name resolves to in the [`Registry`](crate::registry::Registry):
//! one primary handler wrapped by an ordered pre chain and post chain, a
//! [`ResultPolicy`], an authentication flag and an optional rate limiter.
//!
//! ## Dispatch
//!
//! ```text
//! throttle ─▶ pre[0] ─▶ … ─▶ pre[n] ─▶ primary ─▶ post[0] ─▶ … ─▶ post[m] ─▶ policy
//!    │           │                │         │          │                │
//!    └── Throttled                └─ Err ───┴──────────┴──── Err ───────┘
//! ```
//!
//! Stages run strictly one after another on the calling thread. The first
//! error stops the call; no further stage runs and the error is returned
//! as-is, tagged with the [`Stage`](crate::error::Stage) that raised it.
//!
//! ## Example
//!
//! ```rust
//! use methodchain::method::{Method, ResultPolicy};
//! use methodchain::request::Request;
//! use methodchain::runtime_config::RuntimeConfig;
//! use methodchain::handler::HandlerFn;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let config = RuntimeConfig::default()
//!     .without_authentication()
//!     .with_result_policy(ResultPolicy::LastResult);
//!
//! let method = Method::new(
//!     "square",
//!     HandlerFn::new(|req: &Request| {
//!         let n = req.args.as_i64().unwrap_or_default();
//!         Ok(Some(json!(n * n)))
//!     }),
//!     &config,
//! );
//! method
//!     .throttle(100, Duration::from_secs(1))
//!     .post_handle_fn(|_req: &Request| Ok(Some(json!("audited"))));
//!
//! let out = method.dispatch(&Request::new("square", json!(3))).unwrap();
//! assert_eq!(out, Some(json!("audited")));
//! ```

mod core;
mod policy;

pub use self::core::{DispatchResult, Method};
pub use self::policy::ResultPolicy;
