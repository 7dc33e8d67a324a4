//! Integration tests for presence and typing over the push channel.
//!
//! Verifies:
//! 1. Counterparts hear when a user comes online and goes offline.
//! 2. A user with two sessions stays online until both close.
//! 3. Typing signals reach the other user and are queryable.
//! 4. Non-participants cannot join a conversation room.
//! 5. Oversized frames are answered with an error, not a disconnect.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use souk_proto::message::{ConversationId, ListingId, UserId};
use souk_proto::presence::PresenceStatus;
use souk_proto::push::{self, ClientFrame, ServerFrame};
use souk_server::auth::{CALLER_HEADER, Caller};
use souk_server::config::MessagingConfig;
use souk_server::hub::Room;
use souk_server::server;
use souk_server::service::{ChatService, SendMessage};
use souk_server::store::InMemoryStore;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

type Ws = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn start_with(config: MessagingConfig) -> (SocketAddr, Arc<ChatService<InMemoryStore>>) {
    let svc = Arc::new(ChatService::new(Arc::new(InMemoryStore::new()), config));
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&svc))
        .await
        .expect("failed to start server");
    (addr, svc)
}

async fn start() -> (SocketAddr, Arc<ChatService<InMemoryStore>>) {
    start_with(MessagingConfig {
        send_cooldown: Duration::ZERO,
        ack_timeout: Duration::from_millis(50),
        ..MessagingConfig::default()
    })
    .await
}

async fn ws_send(ws: &mut Ws, frame: &ClientFrame) {
    let bytes = push::encode_client(frame).unwrap();
    ws.send(tungstenite::Message::Binary(bytes.into()))
        .await
        .unwrap();
}

async fn ws_recv_matching(ws: &mut Ws, pred: impl Fn(&ServerFrame) -> bool) -> ServerFrame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        let frame = push::decode_server(&msg.into_data()).unwrap();
        if pred(&frame) {
            return frame;
        }
    }
}

/// Upgrade request to `/ws`, carrying the gateway caller header if given.
fn ws_request(addr: SocketAddr, caller: Option<&str>) -> tungstenite::handshake::client::Request {
    let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
    if let Some(caller) = caller {
        request
            .headers_mut()
            .insert(CALLER_HEADER, caller.parse().unwrap());
    }
    request
}

async fn connect(addr: SocketAddr, user: &str) -> Ws {
    let (mut ws, _) = tokio_tungstenite::connect_async(ws_request(addr, Some(user)))
        .await
        .unwrap();
    ws_send(
        &mut ws,
        &ClientFrame::Hello {
            user_id: UserId::new(user),
        },
    )
    .await;
    ws_recv_matching(&mut ws, |f| matches!(f, ServerFrame::Welcome { .. })).await;
    ws
}

/// Polls `check` until it holds or a second passes.
async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

async fn converse(svc: &ChatService<InMemoryStore>, a: &str, b: &str) -> ConversationId {
    let outcome = svc
        .send(
            &Caller(UserId::new(a)),
            SendMessage {
                sender_id: UserId::new(a),
                receiver_id: UserId::new(b),
                kind: "text".into(),
                body: Some("Hello".into()),
                media_ref: None,
                listing_id: Some(ListingId::new("L1")),
                listing_title: None,
                listing_image: None,
                client_correlation_id: None,
            },
        )
        .await
        .unwrap();
    outcome.message.conversation_id
}

fn is_presence(user: &str, status: PresenceStatus) -> impl Fn(&ServerFrame) -> bool {
    let user = UserId::new(user);
    move |f| matches!(f, ServerFrame::Presence(update) if update.user_id == user && update.status == status)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn counterparts_hear_online_and_offline() {
    let (addr, svc) = start().await;
    converse(&svc, "u1", "u2").await;

    let mut alice = connect(addr, "u1").await;
    let mut bob = connect(addr, "u2").await;

    ws_recv_matching(&mut alice, is_presence("u2", PresenceStatus::Online)).await;
    let u2 = UserId::new("u2");
    assert!(eventually(|| svc.presence().is_online(&u2)).await);

    bob.close(None).await.unwrap();
    ws_recv_matching(&mut alice, is_presence("u2", PresenceStatus::Offline)).await;
    assert!(!svc.presence().is_online(&u2));
}

#[tokio::test]
async fn second_session_keeps_user_online() {
    let (addr, svc) = start().await;
    converse(&svc, "u1", "u2").await;
    let u2 = UserId::new("u2");

    let mut phone = connect(addr, "u2").await;
    let _laptop = connect(addr, "u2").await;
    assert!(eventually(|| svc.presence().is_online(&u2)).await);

    phone.close(None).await.unwrap();
    let hub = Arc::clone(svc.hub());
    for _ in 0..50 {
        if hub.members(&Room::User(u2.clone())).await.len() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(svc.presence().is_online(&u2));
}

#[tokio::test]
async fn typing_reaches_counterpart() {
    let (addr, svc) = start().await;
    converse(&svc, "u1", "u2").await;
    let mut alice = connect(addr, "u1").await;
    let mut bob = connect(addr, "u2").await;

    ws_send(
        &mut bob,
        &ClientFrame::Typing {
            to: UserId::new("u1"),
            is_typing: true,
        },
    )
    .await;
    let frame = ws_recv_matching(&mut alice, |f| matches!(f, ServerFrame::Typing { .. })).await;
    assert_eq!(
        frame,
        ServerFrame::Typing {
            from: UserId::new("u2"),
            is_typing: true,
        }
    );
    let status = svc.typing_status(&UserId::new("u2"), &UserId::new("u1"));
    assert!(status.is_typing_by(&UserId::new("u2")));

    ws_send(
        &mut bob,
        &ClientFrame::Typing {
            to: UserId::new("u1"),
            is_typing: false,
        },
    )
    .await;
    let frame = ws_recv_matching(&mut alice, |f| matches!(f, ServerFrame::Typing { .. })).await;
    assert_eq!(
        frame,
        ServerFrame::Typing {
            from: UserId::new("u2"),
            is_typing: false,
        }
    );
    assert!(!svc.typing_status(&UserId::new("u2"), &UserId::new("u1")).is_typing);
}

#[tokio::test]
async fn outsiders_cannot_join_a_conversation() {
    let (addr, svc) = start().await;
    let conversation_id = converse(&svc, "u1", "u2").await;
    let mut mallory = connect(addr, "u9").await;

    ws_send(&mut mallory, &ClientFrame::JoinConversation { conversation_id }).await;
    let frame = ws_recv_matching(&mut mallory, |f| matches!(f, ServerFrame::Error { .. })).await;
    let ServerFrame::Error { reason } = frame else {
        unreachable!()
    };
    assert!(reason.contains("access denied"), "{reason}");
    assert!(
        svc.hub()
            .members(&Room::Conversation(conversation_id))
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn oversized_frame_gets_an_error() {
    let (addr, svc) = start_with(MessagingConfig {
        send_cooldown: Duration::ZERO,
        max_frame_size: 64,
        ..MessagingConfig::default()
    })
    .await;
    let mut alice = connect(addr, "u1").await;

    ws_send(
        &mut alice,
        &ClientFrame::Typing {
            to: UserId::new("x".repeat(200)),
            is_typing: true,
        },
    )
    .await;
    let frame = ws_recv_matching(&mut alice, |f| matches!(f, ServerFrame::Error { .. })).await;
    let ServerFrame::Error { reason } = frame else {
        unreachable!()
    };
    assert!(reason.contains("frame too large"), "{reason}");

    // The session survives.
    ws_send(
        &mut alice,
        &ClientFrame::Typing {
            to: UserId::new("u2"),
            is_typing: true,
        },
    )
    .await;
    let (u1, u2) = (UserId::new("u1"), UserId::new("u2"));
    assert!(eventually(|| svc.typing_status(&u1, &u2).is_typing).await);
}
