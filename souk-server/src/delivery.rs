//! Delivery acknowledgment for freshly persisted messages.
//!
//! Runs as its own task so the send request never waits on it. The two
//! branches are explicit: an acknowledged push marks the message delivered
//! and tells the conversation room; anything else leaves it `sent`.

use std::sync::Arc;
use std::time::Duration;

use souk_proto::message::{ChatMessage, MessageView, Timestamp};
use souk_proto::push::ServerFrame;
use tokio::task::JoinHandle;

use crate::hub::{AckOutcome, PushHub, Room};
use crate::store::MessageStore;

/// How the delivery attempt for one message ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Acknowledged and recorded.
    Delivered { at: Timestamp },
    /// No acknowledgment; the message stays undelivered.
    Undelivered(AckOutcome),
    /// Acknowledged, but the message was already delivered or deleted.
    Unchanged,
    /// Acknowledged, but recording it failed.
    Failed(String),
}

/// Starts the acknowledgment wait for `message` in the background.
pub fn spawn_delivery<S>(
    store: Arc<S>,
    hub: Arc<PushHub>,
    message: ChatMessage,
    ack_timeout: Duration,
) -> JoinHandle<DeliveryOutcome>
where
    S: MessageStore + 'static,
{
    tokio::spawn(async move { deliver(store.as_ref(), &hub, &message, ack_timeout).await })
}

/// Pushes `message` to its receiver and records the acknowledgment.
pub async fn deliver<S: MessageStore>(
    store: &S,
    hub: &PushHub,
    message: &ChatMessage,
    ack_timeout: Duration,
) -> DeliveryOutcome {
    let view = MessageView::from(message);
    let session = match hub
        .emit_with_ack(&message.receiver_id, view, ack_timeout)
        .await
    {
        AckOutcome::Acknowledged(session) => session,
        other => {
            tracing::debug!(
                message_id = %message.id,
                receiver = %message.receiver_id,
                outcome = ?other,
                "message left undelivered"
            );
            return DeliveryOutcome::Undelivered(other);
        }
    };

    let at = Timestamp::now();
    match store.mark_delivered(&message.id, at).await {
        Ok(true) => {}
        Ok(false) => return DeliveryOutcome::Unchanged,
        Err(e) => {
            tracing::warn!(message_id = %message.id, error = %e, "failed to record delivery");
            return DeliveryOutcome::Failed(e.to_string());
        }
    }

    tracing::debug!(message_id = %message.id, session = %session, "message delivered");
    let event = ServerFrame::MessageDelivered {
        message_id: message.id,
        conversation_id: message.conversation_id,
        receiver_id: message.receiver_id.clone(),
        delivered_at: at,
    };
    hub.broadcast(&Room::Conversation(message.conversation_id), &event)
        .await;

    DeliveryOutcome::Delivered { at }
}
