//! Tests for method registration, lookup and service-wide chains
//!
//! # Test Coverage
//!
//! - Unknown method names fail without running any handler
//! - Service-wide chains wrap every method's own chains
//! - Re-registration replaces the method
//! - Authentication gate in front of every handler
//! - Per-method metrics snapshots

use anyhow::anyhow;
use methodchain::{
    DispatchError, ErrorKind, HandlerResult, Method, Registry, Request, ResultPolicy,
    RuntimeConfig, StaticKeyAuthenticator,
};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

mod tracing_util;
use tracing_util::TestTracing;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn record(
    log: &Log,
    label: &'static str,
    result: Option<Value>,
) -> impl Fn(&Request) -> HandlerResult + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |_req: &Request| -> HandlerResult {
        log.lock().push(label);
        Ok(result.clone())
    }
}

fn open_registry() -> Registry {
    Registry::new(RuntimeConfig::default().without_authentication())
}

#[test]
fn test_unknown_method_runs_no_handlers() {
    let tracing = TestTracing::init();
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = open_registry();

    let counter = Arc::clone(&calls);
    registry.pre_handle_fn(move |_req: &Request| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    });
    let counter = Arc::clone(&calls);
    registry.handle_fn("known", move |_req: &Request| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    });

    let err = registry
        .dispatch("unknown", &Request::new("unknown", Value::Null))
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.kind(), ErrorKind::MethodNotFound);
    assert_eq!(err.method(), "unknown");
    assert_eq!(err.to_string(), "method not found: 'unknown'");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(tracing.logs.contains("Method not found"));
}

#[test]
fn test_empty_registry_not_found() {
    let registry = Registry::default();
    let err = registry
        .dispatch("", &Request::new("", Value::Null))
        .unwrap_err();
    assert!(matches!(err, DispatchError::MethodNotFound { .. }));
}

#[test]
fn test_service_chains_wrap_method_chains() {
    let log = Log::default();
    let registry = open_registry();
    registry
        .pre_handle_fn(record(&log, "service_pre1", None))
        .pre_handle_fn(record(&log, "service_pre2", None))
        .post_handle_fn(record(&log, "service_post", None));

    registry
        .handle_fn("echo", record(&log, "primary", Some(json!("P"))))
        .pre_handle_fn(record(&log, "method_pre", None))
        .post_handle_fn(record(&log, "method_post", None));

    let out = registry
        .dispatch("echo", &Request::new("echo", Value::Null))
        .unwrap();
    assert_eq!(out, Some(json!("P")));
    assert_eq!(
        *log.lock(),
        vec![
            "service_pre1",
            "service_pre2",
            "method_pre",
            "primary",
            "method_post",
            "service_post",
        ]
    );
    assert_eq!(registry.pre_handlers_len(), 2);
    assert_eq!(registry.post_handlers_len(), 1);
}

#[test]
fn test_service_stages_take_part_in_result_selection() {
    let log = Log::default();
    let registry = Registry::new(
        RuntimeConfig::default()
            .without_authentication()
            .with_result_policy(ResultPolicy::LastResult),
    );
    registry.post_handle_fn(record(&log, "service_post", Some(json!("wrapped"))));
    registry.handle_fn("echo", record(&log, "primary", Some(json!("raw"))));

    let out = registry
        .dispatch("echo", &Request::new("echo", Value::Null))
        .unwrap();
    assert_eq!(out, Some(json!("wrapped")));
}

#[test]
fn test_service_pre_error_stops_call() {
    let log = Log::default();
    let registry = open_registry();
    registry.pre_handle_fn(|_req: &Request| Err(anyhow!("maintenance")));
    registry.handle_fn("echo", record(&log, "primary", None));

    let err = registry
        .dispatch("echo", &Request::new("echo", Value::Null))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Handler);
    assert!(log.lock().is_empty());
}

#[test]
fn test_reregistration_overwrites() {
    let tracing = TestTracing::init();
    let registry = open_registry();
    registry.handle_fn("version", |_req: &Request| Ok(Some(json!(1))));
    registry.handle_fn("version", |_req: &Request| Ok(Some(json!(2))));

    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry
            .dispatch("version", &Request::new("version", Value::Null))
            .unwrap(),
        Some(json!(2))
    );
    assert!(tracing.logs.contains("Replaced existing method"));
}

#[test]
fn test_authentication_required_without_credentials() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = Registry::new(RuntimeConfig::default());
    registry.authenticator("token", StaticKeyAuthenticator::new(["s3cret"]));

    let counter = Arc::clone(&calls);
    registry.pre_handle_fn(move |_req: &Request| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    });
    let method = registry.handle_fn("private", |_req: &Request| Ok(Some(json!("data"))));
    assert!(method.requires_authentication());

    let err = registry
        .dispatch("private", &Request::new("private", Value::Null))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    assert_eq!(
        err.to_string(),
        "authentication failed for 'private': no credentials"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(method.metrics().unauthenticated_count(), 1);
}

#[test]
fn test_authentication_with_credentials() {
    let registry = Registry::new(RuntimeConfig::default());
    registry.authenticator("token", StaticKeyAuthenticator::new(["s3cret"]));
    registry.handle_fn("private", |_req: &Request| Ok(Some(json!("data"))));

    let ok = Request::new("private", Value::Null).with_auth("token", "s3cret");
    assert_eq!(
        registry.dispatch("private", &ok).unwrap(),
        Some(json!("data"))
    );

    let wrong_key = Request::new("private", Value::Null).with_auth("token", "guess");
    let err = registry.dispatch("private", &wrong_key).unwrap_err();
    assert_eq!(
        err.to_string(),
        "authentication failed for 'private': invalid key"
    );

    let unknown_kind = Request::new("private", Value::Null).with_auth("password", "s3cret");
    let err = registry.dispatch("private", &unknown_kind).unwrap_err();
    let reason = err.to_string();
    assert!(reason.contains("no authenticator for kind 'password'"));
}

#[test]
fn test_closure_authenticator_sees_request() {
    let registry = Registry::new(RuntimeConfig::default());
    registry.authenticator("session", |req: &Request| {
        match req.get_metadata("session_id") {
            Some(_) => Ok(()),
            None => Err(anyhow!("session expired")),
        }
    });
    registry.handle_fn("me", |req: &Request| Ok(req.username.clone().map(Value::from)));

    let req = Request::new("me", Value::Null)
        .with_auth("session", "ignored")
        .with_username("ada")
        .with_metadata("session_id", "42");
    assert_eq!(registry.dispatch("me", &req).unwrap(), Some(json!("ada")));

    let stale = Request::new("me", Value::Null).with_auth("session", "ignored");
    assert!(registry
        .dispatch("me", &stale)
        .unwrap_err()
        .to_string()
        .ends_with("session expired"));
}

#[test]
fn test_disable_authentication_lifts_check() {
    let registry = Registry::new(RuntimeConfig::default());
    registry
        .handle_fn("health", |_req: &Request| Ok(Some(json!("ok"))))
        .disable_authentication();

    let out = registry
        .dispatch("health", &Request::new("health", Value::Null))
        .unwrap();
    assert_eq!(out, Some(json!("ok")));
}

#[test]
fn test_disable_authentication_from_handler_applies_to_next_call() {
    let registry = Registry::new(RuntimeConfig::default());
    registry.authenticator("token", StaticKeyAuthenticator::new(["s3cret"]));

    let this: Arc<OnceCell<Weak<Method>>> = Arc::default();
    let slot = Arc::clone(&this);
    let method = registry.handle_fn("open", move |_req: &Request| {
        if let Some(method) = slot.get().and_then(Weak::upgrade) {
            method.disable_authentication();
        }
        Ok(Some(json!("opened")))
    });
    assert!(this.set(Arc::downgrade(&method)).is_ok());

    let anonymous = Request::new("open", Value::Null);
    let err = registry.dispatch("open", &anonymous).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    assert!(method.requires_authentication());

    // The check for this call already ran before the handler lifted it
    let signed = anonymous.clone().with_auth("token", "s3cret");
    let out = registry.dispatch("open", &signed).unwrap();
    assert_eq!(out, Some(json!("opened")));
    assert!(!method.requires_authentication());

    let out = registry.dispatch("open", &anonymous).unwrap();
    assert_eq!(out, Some(json!("opened")));
    assert_eq!(method.metrics().unauthenticated_count(), 1);
}

#[test]
fn test_metrics_snapshot_per_method() {
    let registry = open_registry();
    registry.handle_fn("ok", |_req: &Request| Ok(None));
    registry.handle_fn("bad", |_req: &Request| Err(anyhow!("nope")));

    let req = Request::new("ok", Value::Null);
    for _ in 0..3 {
        registry.dispatch("ok", &req).unwrap();
    }
    registry.dispatch("bad", &req).unwrap_err();

    let snapshot = registry.metrics_snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot["ok"].dispatched, 3);
    assert_eq!(snapshot["ok"].succeeded, 3);
    assert_eq!(snapshot["bad"].dispatched, 1);
    assert_eq!(snapshot["bad"].failed, 1);

    let json = serde_json::to_value(&snapshot["ok"]).unwrap();
    assert_eq!(json["dispatched"], json!(3));
}
