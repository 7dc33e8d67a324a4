//! Integration tests for the send pipeline through [`ChatService`].
//!
//! Verifies:
//! 1. Conversations are keyed by the unordered pair plus the listing.
//! 2. Unread counters stay exact under concurrent sends from both sides.
//! 3. The inbox is ordered by last activity.
//! 4. A long thread pages back without gaps or overlap.
//! 5. A hard-deleted conversation is recreated fresh by the next send.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use souk_proto::message::{ListingId, MessageId, UserId};
use souk_server::auth::Caller;
use souk_server::config::MessagingConfig;
use souk_server::pagination::PageRequest;
use souk_server::service::{ChatService, SendMessage};
use souk_server::store::InMemoryStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn service() -> Arc<ChatService<InMemoryStore>> {
    let config = MessagingConfig {
        send_cooldown: Duration::ZERO,
        ack_timeout: Duration::from_millis(10),
        ..MessagingConfig::default()
    };
    Arc::new(ChatService::new(Arc::new(InMemoryStore::new()), config))
}

fn caller(id: &str) -> Caller {
    Caller(UserId::new(id))
}

fn text(from: &str, to: &str, listing: Option<&str>, body: &str) -> SendMessage {
    SendMessage {
        sender_id: UserId::new(from),
        receiver_id: UserId::new(to),
        kind: "text".into(),
        body: Some(body.into()),
        media_ref: None,
        listing_id: listing.map(ListingId::new),
        listing_title: listing.map(|l| format!("Listing {l}")),
        listing_image: None,
        client_correlation_id: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn listing_anchors_separate_threads() {
    let svc = service();

    let on_l1 = svc
        .send(&caller("u1"), text("u1", "u2", Some("L1"), "About the table"))
        .await
        .unwrap();
    let reply = svc
        .send(&caller("u2"), text("u2", "u1", Some("L1"), "Still available"))
        .await
        .unwrap();
    let on_l2 = svc
        .send(&caller("u1"), text("u1", "u2", Some("L2"), "And the chairs?"))
        .await
        .unwrap();
    let direct = svc
        .send(&caller("u1"), text("u1", "u2", None, "Unrelated"))
        .await
        .unwrap();

    assert!(on_l1.created);
    assert!(!reply.created);
    assert_eq!(on_l1.message.conversation_id, reply.message.conversation_id);
    assert!(on_l2.created);
    assert!(direct.created);

    let ids: HashSet<_> = [
        on_l1.message.conversation_id,
        on_l2.message.conversation_id,
        direct.message.conversation_id,
    ]
    .into_iter()
    .collect();
    assert_eq!(ids.len(), 3);

    assert_eq!(
        on_l2.conversation.listing_id(),
        Some(&ListingId::new("L2"))
    );
    assert!(direct.conversation.listing.is_none());
}

#[tokio::test]
async fn concurrent_sends_keep_counters_exact() {
    let svc = service();
    let first = svc
        .send(&caller("u1"), text("u1", "u2", Some("L1"), "opening"))
        .await
        .unwrap();
    let conversation_id = first.message.conversation_id;

    let mut tasks = Vec::new();
    for i in 0..20 {
        let svc = Arc::clone(&svc);
        tasks.push(tokio::spawn(async move {
            let (from, to) = if i % 2 == 0 { ("u1", "u2") } else { ("u2", "u1") };
            svc.send(&caller(from), text(from, to, Some("L1"), &format!("m{i}")))
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let conv = svc
        .conversation_for(&conversation_id, &UserId::new("u1"))
        .await
        .unwrap();
    assert_eq!(conv.unread_for(&UserId::new("u2")), 11);
    assert_eq!(conv.unread_for(&UserId::new("u1")), 10);

    assert_eq!(svc.mark_read(&caller("u2"), &conversation_id).await.unwrap(), 11);
    let conv = svc
        .conversation_for(&conversation_id, &UserId::new("u2"))
        .await
        .unwrap();
    assert_eq!(conv.unread_for(&UserId::new("u2")), 0);
    assert_eq!(conv.unread_for(&UserId::new("u1")), 10);
}

#[tokio::test]
async fn inbox_follows_latest_activity() {
    let svc = service();
    let with_u2 = svc
        .send(&caller("u1"), text("u1", "u2", Some("L1"), "to u2"))
        .await
        .unwrap();
    let with_u3 = svc
        .send(&caller("u1"), text("u1", "u3", Some("L1"), "to u3"))
        .await
        .unwrap();

    let inbox = svc.inbox(&caller("u1"), &UserId::new("u1"), None).await.unwrap();
    let order: Vec<_> = inbox.iter().map(|e| e.conversation.id).collect();
    assert_eq!(
        order,
        [with_u3.message.conversation_id, with_u2.message.conversation_id]
    );

    // A reply in the older thread moves it back to the top.
    svc.send(&caller("u2"), text("u2", "u1", Some("L1"), "reply"))
        .await
        .unwrap();
    let inbox = svc.inbox(&caller("u1"), &UserId::new("u1"), None).await.unwrap();
    assert_eq!(inbox[0].conversation.id, with_u2.message.conversation_id);
    assert_eq!(inbox[0].unread, 1);
    assert_eq!(inbox[0].last_message.as_ref().unwrap().body, "reply");
    assert_eq!(
        inbox[0].conversation.preview.as_ref().unwrap().text,
        "reply"
    );
}

#[tokio::test]
async fn long_thread_pages_back_cleanly() {
    let svc = service();
    let mut sent = Vec::new();
    for i in 0..45 {
        let (from, to) = if i % 3 == 0 { ("u2", "u1") } else { ("u1", "u2") };
        let outcome = svc
            .send(&caller(from), text(from, to, Some("L1"), &format!("#{i}")))
            .await
            .unwrap();
        sent.push(outcome.message);
    }
    let conversation_id = sent[0].conversation_id;

    let mut seen: Vec<MessageId> = Vec::new();
    let mut before = None;
    loop {
        let request = PageRequest::new(before, Some(20), svc.config());
        let page = svc
            .list_page(&caller("u1"), &conversation_id, request)
            .await
            .unwrap();
        assert!(
            page.messages
                .windows(2)
                .all(|w| w[0].created_at < w[1].created_at),
            "each page runs oldest to newest"
        );
        let mut ids: Vec<_> = page.messages.iter().map(|m| m.id).collect();
        ids.extend(seen);
        seen = ids;
        if !page.has_more {
            break;
        }
        before = page.next_before;
    }

    let expected: Vec<_> = sent.iter().map(|m| m.id).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn send_after_hard_delete_starts_fresh() {
    let svc = service();
    let first = svc
        .send(&caller("u1"), text("u1", "u2", Some("L1"), "Hello"))
        .await
        .unwrap();
    svc.hard_delete(&caller("u2"), &first.message.conversation_id)
        .await
        .unwrap();

    let again = svc
        .send(&caller("u1"), text("u1", "u2", Some("L1"), "Hello again"))
        .await
        .unwrap();
    assert!(again.created);
    assert_ne!(again.message.conversation_id, first.message.conversation_id);
    assert_eq!(again.conversation.unread_for(&UserId::new("u2")), 1);

    let page = svc
        .list_page(
            &caller("u2"),
            &again.message.conversation_id,
            PageRequest::new(None, None, svc.config()),
        )
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].body, "Hello again");
}
