//! HTTP routes driven through the router without a listener.
//!
//! `redis_counters_round_trip` needs Redis; set `TEST_REDIS_URL` to run it.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{admin_token, token, APP_KEY};
use orderwire::models::{Identity, Role};
use orderwire::repositories::{Broker, CounterStore, MemoryRepository, RedisRepository};
use orderwire::{create_app, Config};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};
use tower::util::ServiceExt;

fn app() -> (axum::Router, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    (create_app(common::state(&repo, 30)), repo)
}

async fn body_json(res: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, app_key: Option<&str>, body: Value) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = app_key {
        req = req.header("x-app-key", key);
    }
    req.body(Body::from(body.to_string())).unwrap()
}

fn authed(method: &str, uri: &str, bearer: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", bearer))
        .body(Body::empty())
        .unwrap()
}

#[test]
fn config_defaults_load() {
    let config = assert_ok!(Config::from_lookup(|_| None));
    assert_eq!(config.keep_alive.as_secs(), 30);
    assert_err!(Config::from_lookup(|key| (key == "BROKER_BACKEND").then(|| "kafka".to_string())));
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = app();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json, json!({ "status": "ok", "service": "orderwire" }));
}

#[tokio::test]
async fn publish_requires_app_key_and_known_channel() {
    let (app, repo) = app();
    let payload = json!({ "channel": "orders:new-order", "payload": { "orderId": "O1" } });

    let res = app
        .clone()
        .oneshot(post_json("/api/publish", None, payload.clone()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/publish",
            Some(APP_KEY),
            json!({ "channel": "orders:everything", "payload": {} }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // No subscriber: still succeeds.
    let res = app
        .clone()
        .oneshot(post_json("/api/publish", Some(APP_KEY), payload.clone()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["subscriber_count"], 0);

    let mut sub = repo.subscribe(&["orders:new-order"]).await.unwrap();
    let res = app
        .oneshot(post_json("/api/publish", Some(APP_KEY), payload))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["subscriber_count"], 1);
    let msg = sub.recv().await.unwrap();
    assert_eq!(serde_json::from_str::<Value>(&msg.payload).unwrap(), json!({ "orderId": "O1" }));
}

#[tokio::test]
async fn application_events_count_unread_per_admin() {
    let (app, _) = app();
    let event = json!({
        "type": "new_application",
        "applicationId": "app-3",
        "restaurantName": "Taco Loco",
        "ownerName": "Marta",
        "adminIds": ["A", "B"]
    });
    for _ in 0..3 {
        let res = app
            .clone()
            .oneshot(post_json("/api/applications/events", Some(APP_KEY), event.clone()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["admins"], 2);
    }

    let res = app
        .clone()
        .oneshot(authed("GET", "/api/notifications/unread", &admin_token("A")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await, json!({ "userId": "A", "count": 3 }));

    let res = app
        .clone()
        .oneshot(authed("POST", "/api/notifications/unread/reset", &admin_token("A")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["count"], 0);

    let res = app
        .clone()
        .oneshot(authed("GET", "/api/notifications/unread", &admin_token("A")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["count"], 0);

    let res = app
        .oneshot(authed("GET", "/api/notifications/unread", &admin_token("B")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["count"], 3);
}

#[tokio::test]
async fn application_event_rejects_bad_input() {
    let (app, _) = app();
    let res = app
        .clone()
        .oneshot(post_json(
            "/api/applications/events",
            Some("wrong"),
            json!({ "type": "application_update", "applicationId": "x", "restaurantName": "y", "status": "approved" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .oneshot(post_json(
            "/api/applications/events",
            Some(APP_KEY),
            json!({ "type": "application_update", "applicationId": " ", "restaurantName": "y", "status": "approved", "adminIds": ["A"] }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn application_update_must_name_its_admins() {
    let (app, repo) = app();
    let mut sub = repo.subscribe(&["notifications:application-update"]).await.unwrap();

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/applications/events",
            Some(APP_KEY),
            json!({ "type": "application_update", "applicationId": "app-1", "restaurantName": "Dosa Den", "status": "approved" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(tokio::time::timeout(std::time::Duration::from_millis(100), sub.recv())
        .await
        .is_err());

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/applications/events",
            Some(APP_KEY),
            json!({ "type": "application_update", "applicationId": "app-1", "restaurantName": "Dosa Den", "status": "approved", "adminIds": ["B"] }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .oneshot(authed("GET", "/api/notifications/unread", &admin_token("B")))
        .await
        .unwrap();
    assert_eq!(body_json(res).await, json!({ "userId": "B", "count": 1 }));
}

#[tokio::test]
async fn unread_requires_a_valid_token() {
    let (app, _) = app();
    let req = Request::builder()
        .uri("/api/notifications/unread")
        .body(Body::empty())
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());

    // Any authenticated role may read its own counter.
    let customer = token(&Identity::new("C1", Role::Customer));
    let res = app
        .oneshot(authed("GET", "/api/notifications/unread", &customer))
        .await
        .unwrap();
    assert_eq!(body_json(res).await, json!({ "userId": "C1", "count": 0 }));
}

#[tokio::test]
async fn redis_counters_round_trip() {
    let redis_url = match std::env::var("TEST_REDIS_URL") {
        Ok(u) => u,
        Err(_) => {
            eprintln!("Skip redis test: set TEST_REDIS_URL");
            return;
        }
    };
    let repo = match RedisRepository::connect(&redis_url).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Skip redis test: {}", e);
            return;
        }
    };
    let key = format!("unread:test-{}", uuid::Uuid::new_v4());
    for _ in 0..3 {
        assert_ok!(repo.incr(&key).await);
    }
    assert_eq!(repo.get(&key).await.unwrap(), 3);
    repo.del(&key).await.unwrap();
    assert_eq!(repo.get(&key).await.unwrap(), 0);

    let channel = format!("test:{}", uuid::Uuid::new_v4());
    assert_eq!(repo.publish(&channel, "{}").await.unwrap(), 0);
}
