//! Tests for the webhook API client.
//!
//! Uses wiremock for the server's replies, plus one run against a real capture
//! server bound to an ephemeral port.

use std::sync::Arc;
use std::time::Duration;

use hookwatch::cache::PersistentCache;
use hookwatch::client::{normalize_base_url, HookClient};
use hookwatch::server;
use hookwatch::store::EventStore;
use hookwatch::sync::{SyncConfig, SyncEngine};
use hookwatch::types::ChannelId;
use serde_json::json;
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn channel(id: &str) -> ChannelId {
    ChannelId::new(id).unwrap()
}

fn client_for(base: &str) -> HookClient {
    HookClient::new(base, Duration::from_secs(5)).unwrap()
}

fn event_json(id: &str, ts: i64) -> serde_json::Value {
    json!({
        "id": id,
        "channelId": "abc",
        "timestamp": ts,
        "method": "POST",
        "headers": {"content-type": "application/json"},
        "body": {"x": 1},
        "query": {},
        "path": "/webhook/abc"
    })
}

// ============================================================================
// URL handling Tests
// ============================================================================

#[test]
fn test_normalize_base_url_strips_trailing_slashes() {
    assert_eq!(&*normalize_base_url("http://localhost:3000/"), "http://localhost:3000");
    assert_eq!(&*normalize_base_url("http://localhost:3000//"), "http://localhost:3000");
    assert_eq!(&*normalize_base_url("http://localhost:3000"), "http://localhost:3000");
}

#[test]
fn test_channel_url_encodes_segment() {
    let client = client_for("http://localhost:3000/");
    let url = client.channel_url(&channel("a b/c")).unwrap();
    assert_eq!(url.as_str(), "http://localhost:3000/api/webhook/a%20b%2Fc");
}

#[test]
fn test_channel_url_keeps_base_path() {
    let client = client_for("http://example.com/proxy");
    let url = client.channel_url(&channel("abc")).unwrap();
    assert_eq!(url.as_str(), "http://example.com/proxy/api/webhook/abc");
}

#[test]
fn test_invalid_base_url_is_rejected() {
    assert!(HookClient::new("not a url", Duration::from_secs(1)).is_err());
}

// ============================================================================
// list_events Tests
// ============================================================================

#[tokio::test]
async fn test_list_events_parses_reply() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/webhook/abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([event_json("e1", 1), event_json("e2", 2)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let events = client_for(&server.uri())
        .list_events(&channel("abc"))
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, "e1");
    assert_eq!(events[1].timestamp, 2);
    assert_eq!(events[0].headers["content-type"], "application/json");
}

#[tokio::test]
async fn test_list_events_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/webhook/abc"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client_for(&server.uri())
        .list_events(&channel("abc"))
        .await
        .unwrap_err();
    let msg = format!("{err:?}");
    assert!(msg.contains("500"), "{msg}");
    assert!(msg.contains("boom"), "{msg}");
}

#[tokio::test]
async fn test_list_events_malformed_reply_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/webhook/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    assert!(client_for(&server.uri())
        .list_events(&channel("abc"))
        .await
        .is_err());
}

// ============================================================================
// send_json Tests
// ============================================================================

#[tokio::test]
async fn test_send_json_posts_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhook/abc"))
        .and(body_json(json!({"hello": "world"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "webhookId": "w-1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ack = client_for(&server.uri())
        .send_json(&channel("abc"), &json!({"hello": "world"}))
        .await
        .unwrap();
    assert!(ack.success);
    assert_eq!(ack.webhook_id, "w-1");
}

// ============================================================================
// End-to-end
// ============================================================================

#[tokio::test]
async fn test_watcher_sees_events_sent_to_real_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(server::serve(
        listener,
        EventStore::new(),
        shutdown.clone(),
    ));

    let client = client_for(&base);
    let abc = channel("abc");
    let first = client.send_json(&abc, &json!({"n": 1})).await.unwrap();
    client.send_json(&channel("other"), &json!({"n": 0})).await.unwrap();

    let dir = tempdir().unwrap();
    let cache = Arc::new(PersistentCache::new(dir.path().join("webhooks.json")));
    let mut cfg = SyncConfig::new(abc.clone());
    cfg.poll_interval = Duration::from_millis(25);
    let handle = SyncEngine::new(cfg, Arc::new(client.clone()), cache.clone())
        .start()
        .await;

    let second = client.send_json(&abc, &json!({"n": 2})).await.unwrap();

    let mut rx = handle.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        while rx.borrow_and_update().len() < 2 {
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("watcher never saw both events");

    let view = handle.view();
    let seen: Vec<&str> = view.iter().map(|e| e.id.as_str()).collect();
    assert!(seen.contains(&first.webhook_id.as_str()));
    assert!(seen.contains(&second.webhook_id.as_str()));
    assert!(view.iter().all(|e| e.channel_id == abc));
    assert!(view[0].timestamp >= view[1].timestamp);

    handle.stop().await.unwrap();
    assert_eq!(cache.events_for(&abc).await.unwrap().len(), 2);

    shutdown.cancel();
    server.await.unwrap().unwrap();
}
