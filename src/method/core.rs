use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::policy::ResultPolicy;
use crate::error::{DispatchError, Stage};
use crate::handler::{
    present, shared, Handler, HandlerChain, HandlerFn, HandlerResult, SharedHandler,
};
use crate::metrics::{millis, MethodMetrics};
use crate::rate_limit::RateLimiter;
use crate::request::Request;
use crate::runtime_config::{RuntimeConfig, ThrottleMode};

/// Outcome of a dispatch: the selected result (if any) or a structured error
pub type DispatchResult = Result<Option<Value>, DispatchError>;

/// A registered method: pre chain, primary handler, post chain.
///
/// The primary handler and the result policy are fixed at construction.
/// Everything else is configured through `&self` setters, so a method can
/// be shared behind an `Arc` and extended while it is already serving
/// calls; each in-flight dispatch keeps the chain snapshot it started with.
pub struct Method {
    name: String,
    handler: SharedHandler,
    pre: HandlerChain,
    post: HandlerChain,
    policy: ResultPolicy,
    authenticate: AtomicBool,
    throttle_mode: ThrottleMode,
    bucket: OnceCell<RateLimiter>,
    metrics: MethodMetrics,
}

impl Method {
    /// Create a method taking its defaults from `config`.
    ///
    /// `name` may be empty for unnamed methods.
    pub fn new<H: Handler>(name: impl Into<String>, handler: H, config: &RuntimeConfig) -> Self {
        Self::from_shared(name, shared(handler), config)
    }

    pub fn from_shared(
        name: impl Into<String>,
        handler: SharedHandler,
        config: &RuntimeConfig,
    ) -> Self {
        Self {
            name: name.into(),
            handler,
            pre: HandlerChain::new(),
            post: HandlerChain::new(),
            policy: config.result_policy,
            authenticate: AtomicBool::new(config.require_authentication),
            throttle_mode: config.throttle_mode,
            bucket: OnceCell::new(),
            metrics: MethodMetrics::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn result_policy(&self) -> ResultPolicy {
        self.policy
    }

    /// Current value of the authentication flag
    #[must_use]
    pub fn requires_authentication(&self) -> bool {
        self.authenticate.load(Ordering::Acquire)
    }

    /// The installed rate limiter, if [`throttle`](Self::throttle) was called
    #[must_use]
    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.bucket.get()
    }

    #[must_use]
    pub fn metrics(&self) -> &MethodMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn pre_handlers_len(&self) -> usize {
        self.pre.len()
    }

    #[must_use]
    pub fn post_handlers_len(&self) -> usize {
        self.post.len()
    }

    /// Skip the authentication check for this method.
    ///
    /// Dispatches that already read the flag are not affected.
    pub fn disable_authentication(&self) -> &Self {
        self.authenticate.store(false, Ordering::Release);
        self
    }

    /// Limit the method to `rate` calls per `frequency`.
    ///
    /// The bucket holds `rate` tokens and is refilled with `rate` tokens once
    /// per `frequency`. Only the first call installs a bucket; later calls
    /// are ignored. A zero rate or zero frequency installs nothing.
    pub fn throttle(&self, rate: u64, frequency: Duration) -> &Self {
        if self.bucket.get().is_some() {
            debug!(
                method = %self.name,
                rate = rate,
                frequency_ms = millis(frequency),
                "Method already throttled - keeping first configuration"
            );
            return self;
        }

        let Some(bucket) = RateLimiter::try_new(rate, frequency) else {
            warn!(
                method = %self.name,
                rate = rate,
                frequency_ms = millis(frequency),
                "Ignoring invalid throttle configuration"
            );
            return self;
        };

        // Lost a race with a concurrent throttle() call: the winner's bucket stays.
        if self.bucket.set(bucket).is_ok() {
            info!(
                method = %self.name,
                rate = rate,
                frequency_ms = millis(frequency),
                mode = ?self.throttle_mode,
                "Method throttled"
            );
        }
        self
    }

    /// Append a handler that runs before the primary handler
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

    /// Append a handler that runs after the primary handler
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

    /// Run the method for one request.
    ///
    /// 1. Admission through the rate limiter, if any. A denied call runs no handler.
    /// 2. Pre chain, in append order.
    /// 3. Primary handler.
    /// 4. Post chain, in append order.
    /// 5. Result selection according to the [`ResultPolicy`].
    ///
    /// The first error from any stage ends the call and is returned
    /// unchanged inside [`DispatchError::Handler`].
    pub fn dispatch(&self, req: &Request) -> DispatchResult {
        self.dispatch_within(req, &[], &[])
    }

    /// Dispatch wrapped by service-wide chains: `outer_pre` runs before the
    /// method's own pre chain and `outer_post` after its own post chain.
    pub(crate) fn dispatch_within(
        &self,
        req: &Request,
        outer_pre: &[SharedHandler],
        outer_post: &[SharedHandler],
    ) -> DispatchResult {
        self.metrics.record_dispatch();
        self.admit(req)?;

        let start = Instant::now();
        let outcome = self.run_stages(req, outer_pre, outer_post);
        let latency = start.elapsed();

        match &outcome {
            Ok(result) => {
                self.metrics.record_success(latency);
                info!(
                    request_id = %req.request_id,
                    method = %self.name,
                    policy = self.policy.as_str(),
                    has_result = result.is_some(),
                    latency_ms = millis(latency),
                    "Method dispatch complete"
                );
            }
            Err(err) => {
                self.metrics.record_failure(latency);
                warn!(
                    request_id = %req.request_id,
                    method = %self.name,
                    stage = ?err.stage(),
                    error = %err,
                    latency_ms = millis(latency),
                    "Method dispatch failed"
                );
            }
        }
        outcome
    }

    pub(crate) fn reject_unauthenticated(&self, reason: impl Into<String>) -> DispatchError {
        self.metrics.record_dispatch();
        self.metrics.record_unauthenticated();
        DispatchError::Unauthenticated {
            method: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn admit(&self, req: &Request) -> Result<(), DispatchError> {
        let Some(bucket) = self.bucket.get() else {
            return Ok(());
        };

        let admitted = match self.throttle_mode {
            ThrottleMode::Reject => bucket.try_take(1),
            ThrottleMode::Wait => bucket.wait(1).is_ok(),
        };
        if admitted {
            return Ok(());
        }

        self.metrics.record_throttled();
        warn!(
            request_id = %req.request_id,
            method = %self.name,
            capacity = bucket.capacity(),
            interval_ms = millis(bucket.interval()),
            "Request throttled"
        );
        Err(DispatchError::Throttled {
            method: self.name.clone(),
        })
    }

    fn run_stages(
        &self,
        req: &Request,
        outer_pre: &[SharedHandler],
        outer_post: &[SharedHandler],
    ) -> DispatchResult {
        let mut selected: Option<Value> = None;

        let pre = self.pre.snapshot();
        for (idx, handler) in outer_pre.iter().chain(pre.iter()).enumerate() {
            let value = self.run_stage(handler.as_ref(), req, Stage::Pre, idx)?;
            self.policy.absorb(&mut selected, Stage::Pre, value);
        }
        drop(pre);

        let value = self.run_stage(self.handler.as_ref(), req, Stage::Primary, 0)?;
        self.policy.absorb(&mut selected, Stage::Primary, value);

        let post = self.post.snapshot();
        for (idx, handler) in post.iter().chain(outer_post.iter()).enumerate() {
            let value = self.run_stage(handler.as_ref(), req, Stage::Post, idx)?;
            self.policy.absorb(&mut selected, Stage::Post, value);
        }

        Ok(selected)
    }

    #[inline]
    fn run_stage(
        &self,
        handler: &dyn Handler,
        req: &Request,
        stage: Stage,
        idx: usize,
    ) -> Result<Option<Value>, DispatchError> {
        debug!(
            request_id = %req.request_id,
            method = %self.name,
            stage = stage.as_str(),
            stage_index = idx,
            "Running handler stage"
        );
        match handler.serve(req) {
            Ok(value) => Ok(present(value)),
            Err(source) => Err(DispatchError::Handler {
                method: self.name.clone(),
                stage,
                source,
            }),
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("authenticate", &self.requires_authentication())
            .field("throttle_mode", &self.throttle_mode)
            .field("pre_handlers", &self.pre.len())
            .field("post_handlers", &self.post.len())
            .field("throttled", &self.bucket.get().is_some())
            .finish()
    }
}
