//! Property-based tests for paging and unread bookkeeping.
//!
//! Uses proptest to verify:
//! 1. Chaining pages by `nextBefore` visits every visible message exactly
//!    once, oldest to newest, for any thread length, page size and hide set.
//! 2. After any sequence of sends, reads and deletions, each participant's
//!    unread counter equals the number of messages addressed to them that
//!    are unread and not hidden by them.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use souk_proto::message::{ConversationId, MessageContent, MessageId, UserId};
use souk_server::auth::Caller;
use souk_server::config::MessagingConfig;
use souk_server::pagination::{PageRequest, fetch_page};
use souk_server::service::{ChatService, SendMessage};
use souk_server::store::{InMemoryStore, MessageStore, NewMessage};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn config() -> MessagingConfig {
    MessagingConfig {
        send_cooldown: Duration::ZERO,
        ack_timeout: Duration::from_millis(1),
        ..MessagingConfig::default()
    }
}

// --- Paging ---

proptest! {
    #[test]
    fn page_chain_is_gap_and_overlap_free(
        hidden in prop::collection::vec(any::<bool>(), 0..60),
        limit in 1usize..25,
    ) {
        let rt = runtime();
        let (visible, walked) = rt.block_on(async {
            let store = InMemoryStore::new();
            let conversation = ConversationId::new();
            let viewer = UserId::new("u2");

            let mut visible = Vec::new();
            for (i, hide) in hidden.iter().enumerate() {
                let message = store
                    .insert_message(NewMessage {
                        id: MessageId::new(),
                        conversation_id: conversation,
                        sender_id: UserId::new("u1"),
                        receiver_id: viewer.clone(),
                        content: MessageContent::Text { body: format!("m{i}") },
                        client_correlation_id: None,
                    })
                    .await
                    .unwrap();
                if *hide {
                    store.hide_message(&message.id, &viewer).await.unwrap();
                } else {
                    visible.push(message.id);
                }
            }

            let config = config();
            let mut walked: Vec<MessageId> = Vec::new();
            let mut before = None;
            loop {
                let request = PageRequest::new(before, Some(limit), &config);
                let page = fetch_page(&store, &conversation, &viewer, request).await.unwrap();
                assert!(page.messages.len() <= limit);
                let mut ids: Vec<_> = page.messages.iter().map(|m| m.id).collect();
                ids.extend(walked);
                walked = ids;
                if !page.has_more {
                    break;
                }
                before = page.next_before;
            }
            (visible, walked)
        });

        prop_assert_eq!(walked, visible);
    }
}

// --- Unread bookkeeping ---

#[derive(Debug, Clone)]
enum Op {
    /// Send from participant 0 or 1.
    Send(bool),
    /// Mark read as participant 0 or 1.
    MarkRead(bool),
    /// Hide the n-th message (modulo thread length) for participant 0 or 1.
    HideForMe(usize, bool),
    /// Sender deletes the n-th message for everyone.
    DeleteForEveryone(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<bool>().prop_map(Op::Send),
        1 => any::<bool>().prop_map(Op::MarkRead),
        2 => (any::<usize>(), any::<bool>()).prop_map(|(n, who)| Op::HideForMe(n, who)),
        1 => any::<usize>().prop_map(Op::DeleteForEveryone),
    ]
}

fn participant(second: bool) -> UserId {
    UserId::new(if second { "seller" } else { "buyer" })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn unread_counter_matches_messages(ops in prop::collection::vec(arb_op(), 1..40)) {
        let rt = runtime();
        rt.block_on(async {
            let svc = Arc::new(ChatService::new(Arc::new(InMemoryStore::new()), config()));
            let opening = svc
                .send(
                    &Caller(participant(false)),
                    text(&participant(false), &participant(true)),
                )
                .await
                .unwrap();
            let conversation_id = opening.message.conversation_id;
            let mut sent = vec![opening.message.id];

            for op in &ops {
                match *op {
                    Op::Send(second) => {
                        let (from, to) = (participant(second), participant(!second));
                        let outcome = svc.send(&Caller(from.clone()), text(&from, &to)).await.unwrap();
                        sent.push(outcome.message.id);
                    }
                    Op::MarkRead(second) => {
                        svc.mark_read(&Caller(participant(second)), &conversation_id)
                            .await
                            .unwrap();
                    }
                    Op::HideForMe(n, second) => {
                        let id = sent[n % sent.len()];
                        svc.delete_for_me(&Caller(participant(second)), &id)
                            .await
                            .unwrap();
                    }
                    Op::DeleteForEveryone(n) => {
                        let id = sent[n % sent.len()];
                        let message = svc.store().message(&id).await.unwrap().unwrap();
                        svc.delete_for_everyone(&Caller(message.sender_id.clone()), &id)
                            .await
                            .unwrap();
                    }
                }
            }

            let conversation = svc
                .conversation_for(&conversation_id, &participant(false))
                .await
                .unwrap();
            for user in [participant(false), participant(true)] {
                let mut expected = 0u32;
                for id in &sent {
                    let message = svc.store().message(id).await.unwrap().unwrap();
                    if message.receiver_id == user && !message.is_read() && !message.is_hidden_for(&user) {
                        expected += 1;
                    }
                }
                assert_eq!(conversation.unread_for(&user), expected, "unread of {user}");
            }
        });
    }
}

fn text(from: &UserId, to: &UserId) -> SendMessage {
    SendMessage {
        sender_id: from.clone(),
        receiver_id: to.clone(),
        kind: "text".into(),
        body: Some("ping".into()),
        media_ref: None,
        listing_id: None,
        listing_title: None,
        listing_image: None,
        client_correlation_id: None,
    }
}
