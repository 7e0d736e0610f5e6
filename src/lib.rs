//! # methodchain
//!
//! **methodchain** is the per-method dispatch engine of an RPC service: it
//! resolves a method name to a registered [`Method`], checks authentication,
//! applies the method's token-bucket rate limit, and runs the ordered chain
//! of handlers with a configurable rule for which result gets returned.
//!
//! Transport, wire encoding and token verification live outside the crate.
//! The transport builds a [`Request`] and calls [`Registry::dispatch`].
//!
//! ## Architecture
//!
//! - **[`registry`]** - name → method table, service-wide chains and authenticators
//! - **[`method`]** - one primary handler wrapped by pre/post chains and a [`ResultPolicy`]
//! - **[`handler`]** - the [`Handler`] trait and the append-only [`HandlerChain`]
//! - **[`rate_limit`]** - thread-safe token bucket ([`RateLimiter`])
//! - **[`security`]** - the [`Authenticator`] seam
//! - **[`error`]** - [`DispatchError`] and the [`Stage`] that failed
//! - **[`runtime_config`]** - service-wide defaults from env or TOML/YAML files
//! - **[`metrics`]** - per-method counters
//! - **[`logging`]** - optional `tracing` subscriber set-up
//!
//! ## Request Flow
//!
//! ```text
//! Registry::dispatch(name, req)
//!   ├─ lookup ─────────────▶ MethodNotFound
//!   ├─ authenticate ───────▶ Unauthenticated
//!   ├─ rate limit ─────────▶ Throttled
//!   ├─ service pre, method pre
//!   ├─ primary
//!   ├─ method post, service post
//!   └─ ResultPolicy picks the returned value
//! ```
//!
//! Any handler error stops the call at once; later stages do not run.
//!
//! ## Quick Start
//!
//! ```rust
//! use methodchain::{Registry, Request, ResultPolicy, RuntimeConfig};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let config = RuntimeConfig::default()
//!     .without_authentication()
//!     .with_result_policy(ResultPolicy::PrimaryResult);
//! let registry = Registry::new(config);
//!
//! registry.pre_handle_fn(|req: &Request| {
//!     tracing::info!(request_id = %req.request_id, "audit");
//!     Ok(None)
//! });
//!
//! registry
//!     .handle_fn("greet", |req: &Request| {
//!         let name = req.arg("name").and_then(|v| v.as_str()).unwrap_or("world");
//!         Ok(Some(json!(format!("hello, {name}"))))
//!     })
//!     .throttle(100, Duration::from_secs(1));
//!
//! let req = Request::new("greet", json!({ "name": "ada" }));
//! assert_eq!(registry.dispatch("greet", &req).unwrap(), Some(json!("hello, ada")));
//!
//! let err = registry.dispatch("missing", &req).unwrap_err();
//! assert!(err.is_not_found());
//! ```

pub mod error;
pub mod handler;
pub mod ids;
pub mod logging;
pub mod method;
pub mod metrics;
pub mod rate_limit;
pub mod registry;
pub mod request;
pub mod runtime_config;
pub mod security;

pub use error::{DispatchError, ErrorKind, Stage};
pub use handler::{Handler, HandlerChain, HandlerFn, HandlerResult};
pub use ids::RequestId;
pub use method::{DispatchResult, Method, ResultPolicy};
pub use rate_limit::RateLimiter;
pub use registry::Registry;
pub use request::{Auth, Request};
pub use runtime_config::{RuntimeConfig, ThrottleMode};
pub use security::{Authenticator, StaticKeyAuthenticator};
