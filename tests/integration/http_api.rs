//! Integration tests for the JSON API.
//!
//! Requests are driven through the full router with `tower::ServiceExt`,
//! without opening a socket.
//!
//! Verifies:
//! 1. Status codes of the error taxonomy.
//! 2. The camelCase wire shape of messages, conversations and pages.
//! 3. Cursor paging over HTTP.
//! 4. Deletion, mark-read and inbox endpoints end to end.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use souk_server::config::MessagingConfig;
use souk_server::server;
use souk_server::service::ChatService;
use souk_server::store::InMemoryStore;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn app_with(config: MessagingConfig) -> Router {
    let svc = ChatService::new(Arc::new(InMemoryStore::new()), config);
    server::router(Arc::new(svc))
}

fn app() -> Router {
    app_with(MessagingConfig {
        send_cooldown: Duration::ZERO,
        ack_timeout: Duration::from_millis(10),
        ..MessagingConfig::default()
    })
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    caller: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = caller {
        builder = builder.header("x-user-id", user);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, value)
}

async fn send_text(app: &Router, from: &str, to: &str, body: &str) -> Value {
    let (status, message) = call(
        app,
        "POST",
        "/messages",
        Some(from),
        Some(json!({
            "senderId": from,
            "receiverId": to,
            "type": "text",
            "body": body,
            "listingId": "L1",
            "listingTitle": "Oak table",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "send failed: {message}");
    message
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_open() {
    let app = app();
    let (status, body) = call(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn send_returns_camel_case_message() {
    let app = app();
    let (status, message) = call(
        &app,
        "POST",
        "/messages",
        Some("u1"),
        Some(json!({
            "senderId": "u1",
            "receiverId": "u2",
            "body": "Is it still available?",
            "listingId": "L1",
            "clientCorrelationId": "tmp-42",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["type"], "text");
    assert_eq!(message["body"], "Is it still available?");
    assert_eq!(message["senderId"], "u1");
    assert_eq!(message["clientCorrelationId"], "tmp-42");
    assert_eq!(message["delivered"], false);
    assert_eq!(message["read"], false);
    assert_eq!(message["deletedEveryone"], false);
    assert!(message["createdAt"].is_u64());
    assert!(message["conversationId"].is_string());
}

#[tokio::test]
async fn error_taxonomy_maps_to_statuses() {
    let app = app();

    // Missing identity.
    let (status, body) = call(&app, "GET", "/conversations/preview/u1", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "access_denied");

    // Impersonation.
    let (status, _) = call(
        &app,
        "POST",
        "/messages",
        Some("u3"),
        Some(json!({ "senderId": "u1", "receiverId": "u2", "body": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Empty body, unknown type, reserved type, self conversation.
    for payload in [
        json!({ "senderId": "u1", "receiverId": "u2", "body": "   " }),
        json!({ "senderId": "u1", "receiverId": "u2", "type": "sticker", "body": "x" }),
        json!({ "senderId": "u1", "receiverId": "u2", "type": "deleted", "body": "x" }),
        json!({ "senderId": "u1", "receiverId": "u1", "body": "me" }),
        json!({ "senderId": "u1", "receiverId": "u2", "type": "image" }),
    ] {
        let (status, body) = call(&app, "POST", "/messages", Some("u1"), Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["error"], "validation");
    }

    // Undecodable JSON.
    let (status, body) = call(
        &app,
        "POST",
        "/messages",
        Some("u1"),
        Some(json!({ "receiverId": "u2" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    // Bad ids and missing records.
    let (status, _) = call(&app, "GET", "/messages/not-a-uuid", Some("u1"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = call(
        &app,
        "GET",
        "/messages/0192b6c4-0000-7000-8000-000000000000",
        Some("u1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn rapid_second_send_is_throttled() {
    let app = app_with(MessagingConfig {
        send_cooldown: Duration::from_secs(60),
        ack_timeout: Duration::from_millis(10),
        ..MessagingConfig::default()
    });
    send_text(&app, "u1", "u2", "one").await;

    let (status, body) = call(
        &app,
        "POST",
        "/messages",
        Some("u1"),
        Some(json!({ "senderId": "u1", "receiverId": "u2", "body": "two" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limited");

    // Other senders are unaffected.
    send_text(&app, "u2", "u1", "reply").await;
}

#[tokio::test]
async fn start_conversation_reports_creation() {
    let app = app();
    let payload = json!({
        "initiatorId": "u1",
        "counterpartId": "u2",
        "listingId": "L9",
        "listingTitle": "Bike",
    });

    let (status, created) = call(
        &app,
        "POST",
        "/conversations/start",
        Some("u1"),
        Some(payload.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["listing"]["listingId"], "L9");
    assert_eq!(created["listing"]["title"], "Bike");
    assert_eq!(created["preview"], Value::Null);

    let (status, found) = call(&app, "POST", "/conversations/start", Some("u1"), Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["id"], created["id"]);
}

#[tokio::test]
async fn paging_over_http() {
    let app = app();
    let mut conversation_id = String::new();
    for i in 0..7 {
        let message = send_text(&app, "u1", "u2", &format!("m{i}")).await;
        conversation_id = message["conversationId"].as_str().unwrap().to_string();
    }

    let (status, first) = call(
        &app,
        "GET",
        &format!("/messages/{conversation_id}?limit=4"),
        Some("u2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let bodies: Vec<_> = first["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["body"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(bodies, ["m3", "m4", "m5", "m6"]);
    assert_eq!(first["hasMore"], true);

    let cursor = first["nextBefore"].as_u64().unwrap();
    let (_, second) = call(
        &app,
        "GET",
        &format!("/messages/{conversation_id}?before={cursor}&limit=4"),
        Some("u2"),
        None,
    )
    .await;
    let bodies: Vec<_> = second["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["body"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(bodies, ["m0", "m1", "m2"]);
    assert_eq!(second["hasMore"], false);

    let (status, _) = call(
        &app,
        "GET",
        &format!("/messages/{conversation_id}?before=yesterday"),
        Some("u2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        "GET",
        &format!("/messages/{conversation_id}"),
        Some("u9"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn inbox_mark_read_and_deletes() {
    let app = app();
    let first = send_text(&app, "u1", "u2", "Hello").await;
    let second = send_text(&app, "u1", "u2", "Still there?").await;
    let conversation_id = first["conversationId"].as_str().unwrap().to_string();

    let (status, inbox) = call(&app, "GET", "/conversations/preview/u2", Some("u2"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox[0]["unread"], 2);
    assert_eq!(inbox[0]["counterpart"]["userId"], "u1");
    assert_eq!(inbox[0]["conversation"]["preview"]["lastMessage"], "Still there?");

    // Only the sender may delete for everyone.
    let second_id = second["id"].as_str().unwrap();
    let (status, _) = call(
        &app,
        "PUT",
        &format!("/messages/delete-everyone/{second_id}"),
        Some("u2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, deleted) = call(
        &app,
        "PUT",
        &format!("/messages/delete-everyone/{second_id}"),
        Some("u1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["type"], "deleted");
    assert_eq!(deleted["deletedEveryone"], true);

    let (_, inbox) = call(&app, "GET", "/conversations/u2", Some("u2"), None).await;
    assert_eq!(inbox[0]["conversation"]["preview"]["lastMessage"], "Hello");

    let first_id = first["id"].as_str().unwrap();
    let (status, body) = call(
        &app,
        "PUT",
        &format!("/messages/delete-me/{first_id}"),
        Some("u2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (status, marked) = call(
        &app,
        "PUT",
        &format!("/conversations/{conversation_id}/mark-read"),
        Some("u2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(marked["conversationId"], conversation_id.as_str());

    let (_, inbox) = call(&app, "GET", "/conversations/u2", Some("u2"), None).await;
    assert_eq!(inbox[0]["unread"], 0);

    let (status, removed) = call(
        &app,
        "DELETE",
        &format!("/conversations/{conversation_id}"),
        Some("u1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["deletedMessages"], 2);

    let (_, inbox) = call(&app, "GET", "/conversations/u2", Some("u2"), None).await;
    assert_eq!(inbox, json!([]));
}

#[tokio::test]
async fn presence_defaults_to_offline() {
    let app = app();
    let (status, body) = call(&app, "GET", "/presence/u2", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userId"], "u2");
    assert_eq!(body["online"], false);

    let (status, body) = call(&app, "GET", "/presence/u2/typing", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isTyping"], false);
}
