use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use brrtbind::middleware::{from_fn, Middleware, PrepareBody, TracingMiddleware};
use brrtbind::{value, Handler, Request, ResponseWriter, Router};
use http::{Method, StatusCode};
use serde_json::{json, Value};

mod common;
use common::fixtures::demo_router;
use common::tracing_util::TestTracing;

#[test]
fn test_protected_route_without_token_is_403() {
    let _tracing = TestTracing::init();
    let res = demo_router().serve(Request::new(Method::GET, "/me"));
    assert_eq!(res.status, StatusCode::FORBIDDEN);
    assert_eq!(res.json().unwrap(), json!({"error": "auth token missing"}));
}

#[test]
fn test_protected_route_reads_token_from_context() {
    let req = Request::new(Method::GET, "/me").with_header("Authorization", "abc");
    let res = demo_router().serve(req);
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json().unwrap(), json!({"token": "abc"}));
}

#[test]
fn test_public_routes_are_not_guarded() {
    let res = demo_router().serve(Request::new(Method::GET, "/hello/Ann"));
    assert_eq!(res.status, StatusCode::OK);
}

#[derive(Default)]
struct Counter {
    before: AtomicUsize,
    after: AtomicUsize,
}

struct Counting(Arc<Counter>);

impl Middleware for Counting {
    fn before(&self, _req: &Request) -> anyhow::Result<Option<Request>> {
        self.0.before.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    fn after(&self, _req: &Request, _res: &ResponseWriter, _latency: Duration) {
        self.0.after.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_after_hooks_run_on_rejection_and_not_found() {
    let counter = Arc::new(Counter::default());
    let mut router = Router::new();
    router
        .use_middleware(Counting(Arc::clone(&counter)))
        .use_middleware(from_fn(|req: &Request| {
            if req.path == "/blocked" {
                anyhow::bail!("blocked");
            }
            Ok(None)
        }));

    router.serve(Request::new(Method::GET, "/blocked"));
    router.serve(Request::new(Method::GET, "/missing"));
    assert_eq!(counter.before.load(Ordering::SeqCst), 2);
    assert_eq!(counter.after.load(Ordering::SeqCst), 2);
}

#[test]
fn test_body_limit_is_413() {
    fn echo(text: String) -> anyhow::Result<Value> {
        Ok(json!({ "text": text }))
    }
    let mut router = Router::new();
    router
        .use_middleware(PrepareBody::new(8))
        .handle("POST /echo", Handler::new(value::from_body::<String>("text"), echo))
        .unwrap();

    let req = Request::new(Method::POST, "/echo")
        .with_json_body(&json!({"text": "far too long for the limit"}))
        .unwrap();
    let res = router.serve(req);
    assert_eq!(res.status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[test]
fn test_tracing_middleware_leaves_response_alone() {
    let _tracing = TestTracing::init();
    fn hello(name: String) -> anyhow::Result<Value> {
        Ok(json!({ "message": format!("Hello {name}!") }))
    }
    let mut router = Router::new();
    router
        .use_middleware(TracingMiddleware)
        .handle("GET /hello/{name}", Handler::new(value::from_path::<String>("name"), hello))
        .unwrap();
    let res = router.serve(Request::new(Method::GET, "/hello/Bo"));
    assert_eq!(res.json().unwrap(), json!({"message": "Hello Bo!"}));
}

#[test]
fn test_sub_router_middleware_runs_after_parent() {
    let mut sub = Router::sub_router("/api");
    sub.use_middleware(from_fn(|req: &Request| {
        let seen = req.context().get("stage").cloned().unwrap_or(Value::Null);
        Ok(Some(brrtbind::patch_value(req, "stage", json!([seen, "child"]))))
    }));
    sub.handle(
        "GET /stage",
        Handler::new(value::from_context::<Value>("stage"), |v: Value| -> anyhow::Result<Value> {
            Ok(v)
        }),
    )
    .unwrap();

    let mut router = Router::new();
    router
        .use_middleware(from_fn(|req: &Request| {
            Ok(Some(brrtbind::patch_value(req, "stage", "parent")))
        }))
        .mount(sub)
        .unwrap();

    let res = router.serve(Request::new(Method::GET, "/api/stage"));
    assert_eq!(res.json().unwrap(), json!(["parent", "child"]));
}
