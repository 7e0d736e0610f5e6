use criterion::{criterion_group, criterion_main, Criterion};
use methodchain::{Registry, Request, ResultPolicy, RuntimeConfig, StaticKeyAuthenticator};
use serde_json::{json, Value};
use std::hint::black_box;

fn build_registry(policy: ResultPolicy) -> Registry {
    let registry = Registry::new(RuntimeConfig::default().with_result_policy(policy));
    registry.authenticator("token", StaticKeyAuthenticator::new(["bench"]));
    registry.pre_handle_fn(|_req: &Request| Ok(None));
    registry.post_handle_fn(|_req: &Request| Ok(None));

    registry
        .handle_fn("square", |req: &Request| {
            let n = req.args.as_i64().unwrap_or_default();
            Ok(Some(json!(n * n)))
        })
        .pre_handle_fn(|req: &Request| Ok(req.arg("hint").cloned()))
        .post_handle_fn(|_req: &Request| Ok(Some(json!("audited"))));

    registry
        .handle_fn("noop", |_req: &Request| Ok(None))
        .disable_authentication();
    registry
}

fn bench_dispatch(c: &mut Criterion) {
    let registry = build_registry(ResultPolicy::PrimaryResult);
    let authed = Request::new("square", json!(12)).with_auth("token", "bench");
    let bare = Request::new("noop", Value::Null);

    c.bench_function("dispatch_full_pipeline", |b| {
        b.iter(|| black_box(registry.dispatch("square", black_box(&authed))))
    });
    c.bench_function("dispatch_noop", |b| {
        b.iter(|| black_box(registry.dispatch("noop", black_box(&bare))))
    });
    c.bench_function("dispatch_not_found", |b| {
        b.iter(|| black_box(registry.dispatch("missing", black_box(&bare))))
    });

    let last = build_registry(ResultPolicy::LastResult);
    c.bench_function("dispatch_last_result", |b| {
        b.iter(|| black_box(last.dispatch("square", black_box(&authed))))
    });
}

fn bench_throttled(c: &mut Criterion) {
    let registry = Registry::new(RuntimeConfig::default().without_authentication());
    registry
        .handle_fn("limited", |_req: &Request| Ok(None))
        .throttle(u32::MAX as u64, std::time::Duration::from_secs(1));
    let req = Request::new("limited", Value::Null);

    c.bench_function("dispatch_with_rate_limit", |b| {
        b.iter(|| black_box(registry.dispatch("limited", black_box(&req))))
    });
}

criterion_group!(benches, bench_dispatch, bench_throttled);
criterion_main!(benches);
