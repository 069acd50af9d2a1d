//! Admin notification stream over a real HTTP connection.

mod common;

use std::time::Duration;

use common::{admin_token, token, TestServer, APP_KEY};
use futures::{stream::BoxStream, StreamExt};
use orderwire::models::{Identity, Role};
use serde_json::{json, Value};

const NEW_APPLICATION: &str = "notifications:new-application";
const APPLICATION_UPDATE: &str = "notifications:application-update";

/// Splits an SSE body into frames.
struct SseReader {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buf: String,
}

impl SseReader {
    fn new(res: reqwest::Response) -> Self {
        Self {
            body: res.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())).boxed(),
            buf: String::new(),
        }
    }

    /// Next raw frame (without the blank-line terminator), or `None` on timeout.
    async fn frame(&mut self, within: Duration) -> Option<String> {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if let Some(end) = self.buf.find("\n\n") {
                let frame = self.buf[..end].to_string();
                self.buf.drain(..end + 2);
                return Some(frame);
            }
            let chunk = tokio::time::timeout_at(deadline, self.body.next()).await.ok()??;
            self.buf.push_str(&String::from_utf8_lossy(&chunk.ok()?));
        }
    }

    /// Next data frame as JSON, skipping comments.
    async fn data(&mut self, within: Duration) -> Option<Value> {
        loop {
            let frame = self.frame(within).await?;
            let data: String = frame
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(str::trim_start)
                .collect();
            if !data.is_empty() {
                return serde_json::from_str(&data).ok();
            }
        }
    }
}

async fn open_stream(server: &TestServer, bearer: Option<&str>) -> reqwest::Response {
    let mut req = reqwest::Client::new().get(server.http_url("/api/notifications/stream"));
    if let Some(token) = bearer {
        req = req.bearer_auth(token);
    }
    req.send().await.unwrap()
}

async fn publish(server: &TestServer, channel: &str, payload: Value) {
    let res = reqwest::Client::new()
        .post(server.http_url("/api/publish"))
        .header("x-app-key", APP_KEY)
        .json(&json!({ "channel": channel, "payload": payload }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn unauthenticated_and_non_admin_callers_get_bare_401() {
    let server = TestServer::start().await;

    let res = open_stream(&server, None).await;
    assert_eq!(res.status(), 401);
    assert!(res.bytes().await.unwrap().is_empty());

    let customer = token(&Identity::new("C1", Role::Customer));
    let res = open_stream(&server, Some(&customer)).await;
    assert_eq!(res.status(), 401);

    let res = open_stream(&server, Some("not-a-token")).await;
    assert_eq!(res.status(), 401);

    assert_eq!(server.repo.subscriber_count(NEW_APPLICATION).await, 0);
    assert_eq!(server.repo.subscriber_count(APPLICATION_UPDATE).await, 0);
}

#[tokio::test]
async fn token_query_parameter_is_accepted() {
    let server = TestServer::start().await;
    let url = format!(
        "{}?token={}",
        server.http_url("/api/notifications/stream"),
        admin_token("A")
    );
    let res = reqwest::get(url).await.unwrap();
    assert_eq!(res.status(), 200);
    let mut stream = SseReader::new(res);
    assert_eq!(stream.data(Duration::from_secs(2)).await, Some(json!({ "type": "connected" })));
}

#[tokio::test]
async fn events_reach_only_the_admins_they_name() {
    let server = TestServer::start().await;

    let res_a = open_stream(&server, Some(&admin_token("A"))).await;
    assert_eq!(res_a.status(), 200);
    assert!(res_a.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let mut a = SseReader::new(res_a);
    let mut b = SseReader::new(open_stream(&server, Some(&admin_token("B"))).await);

    // Connected means subscribed.
    assert_eq!(a.data(Duration::from_secs(2)).await.unwrap()["type"], "connected");
    assert_eq!(b.data(Duration::from_secs(2)).await.unwrap()["type"], "connected");
    assert_eq!(server.repo.subscriber_count(NEW_APPLICATION).await, 2);

    publish(
        &server,
        NEW_APPLICATION,
        json!({
            "type": "new_application",
            "applicationId": "app-1",
            "restaurantName": "Dosa Den",
            "ownerName": "Ravi",
            "adminIds": ["A"]
        }),
    )
    .await;
    publish(&server, NEW_APPLICATION, json!("garbage")).await;
    // Addressed to everyone; serves as a marker for B.
    publish(
        &server,
        APPLICATION_UPDATE,
        json!({
            "type": "application_update",
            "applicationId": "app-1",
            "restaurantName": "Dosa Den",
            "status": "approved"
        }),
    )
    .await;

    let mut for_a = Vec::new();
    for _ in 0..2 {
        for_a.push(a.data(Duration::from_secs(2)).await.unwrap());
    }
    for_a.sort_by_key(|v| v["type"].as_str().unwrap_or_default().to_string());
    assert_eq!(for_a[0]["type"], "application_update");
    assert_eq!(for_a[1]["type"], "new_application");
    assert_eq!(for_a[1]["adminIds"], json!(["A"]));

    let first_for_b = b.data(Duration::from_secs(2)).await.unwrap();
    assert_eq!(first_for_b["type"], "application_update");
    assert!(b.data(Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn keep_alive_comment_is_sent_while_idle() {
    let server = TestServer::start_with_keep_alive(1).await;
    let mut stream = SseReader::new(open_stream(&server, Some(&admin_token("A"))).await);
    assert!(stream.data(Duration::from_secs(2)).await.is_some());

    let frame = stream.frame(Duration::from_secs(3)).await.unwrap();
    assert!(frame.starts_with(':'), "expected a comment frame, got {:?}", frame);
    assert!(frame.contains("keep-alive"));
}

#[tokio::test]
async fn closing_the_stream_releases_the_subscription() {
    let server = TestServer::start_with_keep_alive(1).await;
    let mut stream = SseReader::new(open_stream(&server, Some(&admin_token("A"))).await);
    assert!(stream.data(Duration::from_secs(2)).await.is_some());
    assert_eq!(server.repo.subscriber_count(NEW_APPLICATION).await, 1);

    drop(stream);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while server.repo.subscriber_count(NEW_APPLICATION).await > 0 {
        assert!(tokio::time::Instant::now() < deadline, "subscription still open");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(server.repo.subscriber_count(APPLICATION_UPDATE).await, 0);
}
