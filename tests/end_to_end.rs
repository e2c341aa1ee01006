use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rroute::context::Context;
use rroute::handler::Reply;
use rroute::{BodyKind, CompiledRouter, Lookup, Method, Request, Response, Router, StatusCode, Verdict};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn make_request(method: &str, path: &str) -> Request {
    let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    Request::parse(raw.as_bytes()).unwrap()
}

fn sample_router() -> CompiledRouter {
    let mut router = Router::new();
    router
        .get("/", |_ctx: Context| async { "root" })
        .unwrap();
    router
        .get("/id/:id", |ctx: Context| async move {
            format!("id={}", ctx.param("id").unwrap_or_default())
        })
        .unwrap();
    router
        .get("/files/*", |ctx: Context| async move {
            format!("rest={}", ctx.params().wildcard().unwrap_or_default())
        })
        .unwrap();
    router.compile()
}

#[tokio::test]
async fn routes_static_param_wildcard_and_missing() {
    init_tracing();
    let router = sample_router();

    let res = router.handle(make_request("GET", "/")).await;
    assert_eq!(res.text(), Some("root"));

    let res = router.handle(make_request("GET", "/id/42")).await;
    assert_eq!(res.text(), Some("id=42"));

    let res = router.handle(make_request("GET", "/files/a/b")).await;
    assert_eq!(res.text(), Some("rest=a/b"));

    let res = router.handle(make_request("GET", "/missing")).await;
    assert_eq!(res.status(), StatusCode::NotFound);
}

#[test]
fn lookup_exposes_wildcard_capture() {
    let router = sample_router();
    match router.find(&Method::Get, "/files/a/b/c") {
        Lookup::Found(found) => {
            assert_eq!(found.pattern(), "/files/*");
            assert_eq!(found.params().get("*"), Some("a/b/c"));
        }
        other => panic!("expected a match, got {other:?}"),
    }
}

#[tokio::test]
async fn insertion_order_does_not_change_matching() {
    let orders = [
        ["/abc", "/abcd", "/ab"],
        ["/ab", "/abc", "/abcd"],
        ["/abcd", "/ab", "/abc"],
    ];
    for order in orders {
        let mut router = Router::new();
        for path in order {
            router
                .get(path, move |_ctx: Context| async move { path })
                .unwrap();
        }
        let router = router.compile();
        for path in ["/abc", "/abcd", "/ab"] {
            let res = router.handle(make_request("GET", path)).await;
            assert_eq!(res.text(), Some(path), "{order:?}");
        }
        for path in ["/a", "/abce"] {
            let res = router.handle(make_request("GET", path)).await;
            assert_eq!(res.status(), StatusCode::NotFound, "{order:?}");
        }
    }
}

#[tokio::test]
async fn guard_short_circuits_subtree() {
    init_tracing();
    let handled = Arc::new(AtomicUsize::new(0));
    let guarded = Arc::new(AtomicUsize::new(0));

    let mut router = Router::new();
    {
        let guarded = guarded.clone();
        router
            .guard("/private", move |ctx: Context| {
                guarded.fetch_add(1, Ordering::SeqCst);
                async move { Verdict::Reject(ctx) }
            })
            .unwrap();
    }
    for path in ["/private/a", "/private/b/:id"] {
        let handled = handled.clone();
        router
            .get(path, move |_ctx: Context| {
                handled.fetch_add(1, Ordering::SeqCst);
                async { "secret" }
            })
            .unwrap();
    }
    let router = router.compile();

    for path in ["/private/a", "/private/b/1", "/private/b/2"] {
        let res = router.handle(make_request("GET", path)).await;
        assert_eq!(res.status(), StatusCode::NotFound, "{path}");
    }
    assert_eq!(guarded.load(Ordering::SeqCst), 3);
    assert_eq!(handled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wrap_applies_once_to_async_handler() {
    let wraps = Arc::new(AtomicUsize::new(0));
    let mut router = Router::new();
    {
        let wraps = wraps.clone();
        router
            .wrap("/api/*", move |reply: Reply| {
                wraps.fetch_add(1, Ordering::SeqCst);
                match reply {
                    Reply::Json(value) => Reply::Json(serde_json::json!({ "data": value })),
                    other => other,
                }
            })
            .unwrap();
    }
    router
        .add_parsed(Method::Post, "/api/echo", BodyKind::Json, |ctx: Context| async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            ctx.body().as_json().cloned().unwrap_or_default()
        })
        .unwrap();
    let router = router.compile();

    let request = Request::new("POST", "/api/echo").with_body(r#"{"n":7}"#);
    let res = router.handle(request).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.text(), Some(r#"{"data":{"n":7}}"#));
    assert_eq!(wraps.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn compiled_router_serves_concurrent_requests() {
    let router = Arc::new(sample_router());

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let router = router.clone();
            tokio::spawn(async move {
                let res = router.handle(make_request("GET", &format!("/id/{i}"))).await;
                (i, res)
            })
        })
        .collect();

    for task in tasks {
        let (i, res): (usize, Response) = task.await.unwrap();
        assert_eq!(res.text().map(str::to_owned), Some(format!("id={i}")));
    }
}
