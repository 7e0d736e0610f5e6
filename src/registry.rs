//! # Registry Module
//!
//! The [`Registry`] is the owning service: it maps method names to
//! [`Method`]s, holds the service-wide handler chains and authenticators,
//! and exposes [`Registry::dispatch`], the single entry point the transport
//! layer calls for every inbound request.
//!
//! ## Composition Order
//!
//! For a registered method the full pipeline is:
//!
//! ```text
//! service pre ▶ method pre ▶ primary ▶ method post ▶ service post
//! ```
//!
//! Service-wide pre-handlers therefore see every call first, and
//! service-wide post-handlers see it last. Service-wide stages take part in
//! result selection like any other stage.
//!
//! ## Registration
//!
//! ```rust
//! use methodchain::registry::Registry;
//! use methodchain::request::Request;
//! use methodchain::runtime_config::RuntimeConfig;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let registry = Registry::new(RuntimeConfig::default());
//! registry
//!     .handle_fn("square", |req: &Request| {
//!         let n = req.args.as_f64().unwrap_or_default();
//!         Ok(Some(json!(n * n)))
//!     })
//!     .disable_authentication()
//!     .throttle(20, Duration::from_secs(1));
//!
//! let out = registry.dispatch("square", &Request::new("square", json!(4))).unwrap();
//! assert_eq!(out, Some(json!(16.0)));
//! ```
//!
//! Re-registering a name replaces the previous method. Calls already
//! running on the old method finish on it.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::error::DispatchError;
use crate::handler::{shared, Handler, HandlerChain, HandlerFn, HandlerResult};
use crate::method::{DispatchResult, Method};
use crate::metrics::MethodMetricsSnapshot;
use crate::request::Request;
use crate::runtime_config::RuntimeConfig;
use crate::security::Authenticator;

/// Name → method table plus service-wide chains
pub struct Registry {
    config: RuntimeConfig,
    methods: DashMap<String, Arc<Method>>,
    pre: HandlerChain,
    post: HandlerChain,
    authenticators: DashMap<String, Arc<dyn Authenticator>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Registry {
    /// Create an empty registry whose methods inherit `config`
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            methods: DashMap::new(),
            pre: HandlerChain::new(),
            post: HandlerChain::new(),
            authenticators: DashMap::new(),
        }
    }

    /// Defaults every registered method inherits
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Register `handler` as the primary handler of `name`.
    ///
    /// Returns the new method so it can be configured fluently. A method
    /// already registered under the same name is replaced.
    pub fn handle<H: Handler>(&self, name: &str, handler: H) -> Arc<Method> {
        let method = Arc::new(Method::from_shared(name, shared(handler), &self.config));

        if self
            .methods
            .insert(name.to_string(), Arc::clone(&method))
            .is_some()
        {
            warn!(
                method = %name,
                total_methods = self.methods.len(),
                "Replaced existing method - in-flight calls finish on the old one"
            );
        } else {
            info!(
                method = %name,
                total_methods = self.methods.len(),
                authenticate = method.requires_authentication(),
                policy = method.result_policy().as_str(),
                "Method registered successfully"
            );
        }
        method
    }

    /// Register a closure as the primary handler of `name`
    pub fn handle_fn<F>(&self, name: &str, f: F) -> Arc<Method>
    where
        F: Fn(&Request) -> HandlerResult + Send + Sync + 'static,
    {
        self.handle(name, HandlerFn::new(f))
    }

    /// Add a handler that runs before every method's own pre chain.
    ///
    /// Calling this several times registers several handlers, executed in
    /// FIFO order. A non-error return lets the next stage run.
    pub fn pre_handle<H: Handler>(&self, handler: H) -> &Self {
        self.pre.append(shared(handler));
        self
    }

    pub fn pre_handle_fn<F>(&self, f: F) -> &Self
    where
        F: Fn(&Request) -> HandlerResult + Send + Sync + 'static,
    {
        self.pre_handle(HandlerFn::new(f))
    }

    /// Add a handler that runs after every method's own post chain.
    pub fn post_handle<H: Handler>(&self, handler: H) -> &Self {
        self.post.append(shared(handler));
        self
    }

    pub fn post_handle_fn<F>(&self, f: F) -> &Self
    where
        F: Fn(&Request) -> HandlerResult + Send + Sync + 'static,
    {
        self.post_handle(HandlerFn::new(f))
    }

    /// Register the authenticator for credentials of `kind`, replacing any previous one
    pub fn authenticator<A: Authenticator>(&self, kind: &str, authenticator: A) -> &Self {
        let authenticator: Arc<dyn Authenticator> = Arc::new(authenticator);
        if self
            .authenticators
            .insert(kind.to_string(), authenticator)
            .is_some()
        {
            warn!(kind = %kind, "Replaced existing authenticator");
        } else {
            debug!(kind = %kind, "Authenticator registered");
        }
        self
    }

    /// Look up `name` and run its full pipeline for `req`.
    ///
    /// Errors:
    /// - [`DispatchError::MethodNotFound`] - nothing registered under `name`; no handler runs
    /// - [`DispatchError::Unauthenticated`] - the method requires authentication and
    ///   the request failed it; no handler runs
    /// - [`DispatchError::Throttled`] - the method's bucket is empty; no handler runs
    /// - [`DispatchError::Handler`] - some stage failed; carries that stage's error
    pub fn dispatch(&self, name: &str, req: &Request) -> DispatchResult {
        debug!(
            request_id = %req.request_id,
            method = %name,
            available_methods = self.methods.len(),
            "Method lookup"
        );

        // Clone the Arc out so no map shard stays locked while handlers run.
        let Some(method) = self.method(name) else {
            warn!(
                request_id = %req.request_id,
                method = %name,
                available_methods = self.methods.len(),
                "Method not found"
            );
            return Err(DispatchError::MethodNotFound {
                method: name.to_string(),
            });
        };

        if method.requires_authentication() {
            self.authenticate(&method, req)?;
        }

        let pre = self.pre.snapshot();
        let post = self.post.snapshot();
        method.dispatch_within(req, &pre, &post)
    }

    fn authenticate(&self, method: &Method, req: &Request) -> Result<(), DispatchError> {
        let Some(auth) = &req.auth else {
            warn!(
                request_id = %req.request_id,
                method = %method.name(),
                "Authentication required but no credentials supplied"
            );
            return Err(method.reject_unauthenticated("no credentials"));
        };

        let authenticator = self
            .authenticators
            .get(&auth.kind)
            .map(|entry| Arc::clone(entry.value()));
        let Some(authenticator) = authenticator else {
            warn!(
                request_id = %req.request_id,
                method = %method.name(),
                kind = %auth.kind,
                "No authenticator for credential kind"
            );
            return Err(method.reject_unauthenticated(format!(
                "no authenticator for kind '{}'",
                auth.kind
            )));
        };

        authenticator.authenticate(req).map_err(|err| {
            warn!(
                request_id = %req.request_id,
                method = %method.name(),
                kind = %auth.kind,
                error = %err,
                "Authentication rejected"
            );
            method.reject_unauthenticated(err.to_string())
        })
    }

    /// The method currently registered under `name`
    #[must_use]
    pub fn method(&self, name: &str) -> Option<Arc<Method>> {
        self.methods.get(name).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered method names, sorted
    #[must_use]
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    #[must_use]
    pub fn pre_handlers_len(&self) -> usize {
        self.pre.len()
    }

    #[must_use]
    pub fn post_handlers_len(&self) -> usize {
        self.post.len()
    }

    /// Counters for every registered method
    #[must_use]
    pub fn metrics_snapshot(&self) -> HashMap<String, MethodMetricsSnapshot> {
        self.methods
            .iter()
            .map(|e| (e.key().clone(), e.value().metrics().snapshot()))
            .collect()
    }
}
