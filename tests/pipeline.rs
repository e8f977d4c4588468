//! Request pipeline stages as served over HTTP.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use mock_server::db::{normalize_json_db, NormalizeOptions};
use mock_server::{AppState, Flow, MiddlewareRegistry, RequestContext, ServerConfig};
use serde_json::{json, Value};

mod common;

fn registry() -> MiddlewareRegistry {
    let mut registry = MiddlewareRegistry::with_builtins();
    registry
        .register("explode", |_ctx: &mut RequestContext| -> Flow { panic!("kaboom") })
        .register("countVisits", |ctx: &mut RequestContext| {
            let visits = ctx.store.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
            ctx.store.set("visits", json!(visits));
            ctx.set_json(json!({"visits": visits}));
            Flow::Next
        })
        .register("forgetVisits", |ctx: &mut RequestContext| {
            let removed = ctx.store.remove("visits");
            ctx.set_json(json!({"forgot": removed}));
            Flow::Next
        });
    registry
}

async fn spawn(db: Value) -> (std::net::SocketAddr, mock_server::Shutdown) {
    let map = normalize_json_db(db, NormalizeOptions::default());
    let state = AppState::new(ServerConfig::default(), map, registry()).unwrap();
    common::spawn_state(state).await
}

#[tokio::test]
async fn test_delay_holds_the_response() {
    let db = json!({
        "/slow": {"_config": true, "mock": {"ok": true}, "delay": 300},
        "/fast": {"ok": true}
    });
    let (addr, _shutdown) = spawn(db).await;
    let client = common::client();

    let started = Instant::now();
    let res = client.get(format!("http://{}/slow", addr)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({"ok": true}));
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_missing_optional_param_redirects() {
    let (backend, hits) = common::start_programmable_backend(|_| async {
        (200, json!({"id": 4, "name": "Siva"}).to_string())
    })
    .await;
    let db = json!({
        "/users/:id?": {
            "_config": true,
            "fetch": format!("http://{}/users/${{req.params.id}}", backend)
        }
    });
    let (addr, _shutdown) = spawn(db).await;
    let client = common::client();

    let res = client.get(format!("http://{}/users?x=1", addr)).send().await.unwrap();
    assert_eq!(res.status(), 307);
    assert_eq!(res.headers()["location"], "/users/id?x=1");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let res = client.get(format!("http://{}/users/4", addr)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({"id": 4, "name": "Siva"}));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panicking_middleware_returns_500() {
    let db = json!({
        "/boom": {"_config": true, "mock": 1, "middlewares": ["explode"]},
        "/after": 2
    });
    let (addr, _shutdown) = spawn(db).await;
    let client = common::client();

    let res = client.get(format!("http://{}/boom", addr)).send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(res.text().await.unwrap(), "kaboom");

    // the server keeps serving
    let res = client.get(format!("http://{}/after", addr)).send().await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn test_registered_middlewares_share_the_store() {
    let db = json!({
        "/visit": {"_config": true, "mock": {}, "middlewares": ["countVisits"]},
        "/forget": {"_config": true, "mock": {}, "middlewares": ["forgetVisits"]}
    });
    let (addr, _shutdown) = spawn(db).await;
    let client = common::client();

    for expected in 1..=2 {
        let res = client.get(format!("http://{}/visit", addr)).send().await.unwrap();
        assert_eq!(res.json::<Value>().await.unwrap(), json!({"visits": expected}));
    }
    let res = client.get(format!("http://{}/_store/visits", addr)).send().await.unwrap();
    assert_eq!(res.json::<Value>().await.unwrap(), json!(2));

    let res = client.get(format!("http://{}/forget", addr)).send().await.unwrap();
    assert_eq!(res.json::<Value>().await.unwrap(), json!({"forgot": 2}));
    let res = client.get(format!("http://{}/_store", addr)).send().await.unwrap();
    assert_eq!(res.json::<Value>().await.unwrap(), json!({}));
}
