//! The send pipeline, deletions and paged reads.

use serde::Deserialize;
use souk_proto::message::{
    ChatMessage, ConversationId, ListingId, MessageContent, MessageId, MessageKind, MessageView,
    Timestamp, UserId,
};
use souk_proto::push::ServerFrame;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::ChatService;
use crate::auth::Caller;
use crate::collaborators::{Notice, NoticeReason, is_callback_request};
use crate::delivery::{DeliveryOutcome, spawn_delivery};
use crate::error::ChatError;
use crate::hub::Room;
use crate::model::{Conversation, ListingSnapshot, ParticipantPair, Preview};
use crate::pagination::{Page, PageRequest, fetch_page};
use crate::store::{ConversationStore, MessageStore, NewMessage, StoreError};

/// Body of `POST /messages`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// Raw message type, checked against the closed set.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub body: Option<String>,
    pub media_ref: Option<String>,
    pub listing_id: Option<ListingId>,
    pub listing_title: Option<String>,
    pub listing_image: Option<String>,
    pub client_correlation_id: Option<String>,
}

fn default_kind() -> String {
    MessageKind::Text.as_str().to_string()
}

/// A persisted send plus its in-flight delivery attempt.
#[derive(Debug)]
pub struct SendOutcome {
    pub message: MessageView,
    /// The conversation after the send was recorded.
    pub conversation: Conversation,
    /// Whether the conversation was created by this send.
    pub created: bool,
    /// Resolves once the acknowledgment wait ends.
    pub delivery: JoinHandle<DeliveryOutcome>,
}

impl<S> ChatService<S>
where
    S: ConversationStore + MessageStore + 'static,
{
    /// Sends a message from the caller.
    ///
    /// Access, the rate guard and validation are checked before anything is
    /// stored. Once the message is persisted the send has succeeded: the push
    /// delivery and out-of-band notices run in the background and their
    /// failures are only logged.
    ///
    /// # Errors
    ///
    /// `AccessDenied`, `RateLimited`, `Validation`, or `Internal` if storage
    /// fails.
    pub async fn send(&self, caller: &Caller, request: SendMessage) -> Result<SendOutcome, ChatError> {
        caller.ensure_is(&request.sender_id)?;
        self.rate_guard.check(&request.sender_id)?;

        let kind: MessageKind = request.kind.parse()?;
        let content = MessageContent::from_parts(kind, request.body, request.media_ref)?;
        let pair = ParticipantPair::new(request.sender_id.clone(), request.receiver_id.clone())?;
        let listing = request.listing_id.map(|listing_id| ListingSnapshot {
            listing_id,
            title: request.listing_title,
            image: request.listing_image,
        });

        let (conversation, created) = self.store.find_or_create(pair, listing).await?;
        let first_message = created || conversation.preview.is_none();

        let message = self
            .store
            .insert_message(NewMessage {
                id: MessageId::new(),
                conversation_id: conversation.id,
                sender_id: request.sender_id,
                receiver_id: request.receiver_id,
                content,
                client_correlation_id: request.client_correlation_id,
            })
            .await?;

        let conversation = match self
            .store
            .touch_on_send(
                &conversation.id,
                &message.receiver_id,
                Preview::of(&message),
                message.created_at,
            )
            .await
        {
            Ok(conversation) => conversation,
            Err(e) => {
                // The conversation vanished (or the write failed) after the
                // message was stored; take the message back out.
                if let Err(undo) = self.store.remove_message(&message.id).await {
                    tracing::error!(message_id = %message.id, error = %undo, "failed to undo orphaned message");
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            message_id = %message.id,
            conversation_id = %conversation.id,
            kind = %message.content.kind(),
            "message sent"
        );

        let delivery = spawn_delivery(
            Arc::clone(&self.store),
            Arc::clone(&self.hub),
            message.clone(),
            self.config.ack_timeout,
        );
        self.dispatch_notices(&message, &conversation, first_message);

        Ok(SendOutcome {
            message: MessageView::from(&message),
            conversation,
            created,
            delivery,
        })
    }

    /// Replaces a message's content with a tombstone for both participants.
    ///
    /// If it was the conversation's preview, the preview is rebuilt from the
    /// latest remaining message. Deleting an already deleted message returns
    /// it unchanged.
    ///
    /// # Errors
    ///
    /// `NotFound` if the message is absent, `AccessDenied` unless the caller
    /// sent it.
    pub async fn delete_for_everyone(
        &self,
        caller: &Caller,
        message_id: &MessageId,
    ) -> Result<MessageView, ChatError> {
        let message = self.message_or_not_found(message_id).await?;
        if &message.sender_id != caller.id() {
            return Err(ChatError::denied("only the sender can delete a message for everyone"));
        }
        if message.is_deleted_for_everyone() {
            return Ok(MessageView::from(&message));
        }

        let now = Timestamp::now();
        let released = self.store.delete_for_everyone(message_id, now).await?;
        self.refresh_preview_after_delete(&message, now).await?;

        let event = ServerFrame::MessageDeletedEveryone {
            message_id: message.id,
            conversation_id: message.conversation_id,
        };
        self.hub
            .broadcast(&Room::Conversation(message.conversation_id), &event)
            .await;
        tracing::info!(message_id = %message.id, "message deleted for everyone");

        if let Some(media_ref) = released {
            self.release_media(&[media_ref]).await;
        }

        let updated = self.message_or_not_found(message_id).await?;
        Ok(MessageView::from(&updated))
    }

    /// Hides a message for the caller only. Repeating it changes nothing.
    ///
    /// Hiding an unread message addressed to the caller takes it off their
    /// unread counter.
    ///
    /// # Errors
    ///
    /// `NotFound` if the message is absent, `AccessDenied` unless the caller
    /// is one of its two participants.
    pub async fn delete_for_me(&self, caller: &Caller, message_id: &MessageId) -> Result<(), ChatError> {
        let viewer = caller.id();
        let message = self.message_or_not_found(message_id).await?;
        if &message.sender_id != viewer && &message.receiver_id != viewer {
            return Err(ChatError::denied("not a participant of this message"));
        }

        let newly_hidden = self.store.hide_message(message_id, viewer).await?;
        if newly_hidden && &message.receiver_id == viewer && !message.is_read() {
            match self
                .store
                .decrement_unread(&message.conversation_id, viewer)
                .await
            {
                Ok(()) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(message_id = %message_id, viewer = %viewer, newly_hidden, "message hidden");
        Ok(())
    }

    /// One page of a conversation the caller belongs to.
    ///
    /// # Errors
    ///
    /// `NotFound` / `AccessDenied` per [`ChatService::conversation_for`].
    pub async fn list_page(
        &self,
        caller: &Caller,
        conversation_id: &ConversationId,
        request: PageRequest,
    ) -> Result<Page, ChatError> {
        self.conversation_for(conversation_id, caller.id()).await?;
        Ok(fetch_page(self.store.as_ref(), conversation_id, caller.id(), request).await?)
    }

    async fn message_or_not_found(&self, id: &MessageId) -> Result<ChatMessage, ChatError> {
        self.store
            .message(id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("message {id}")))
    }

    async fn refresh_preview_after_delete(
        &self,
        deleted: &ChatMessage,
        at: Timestamp,
    ) -> Result<(), ChatError> {
        let Some(conversation) = self.store.conversation(&deleted.conversation_id).await? else {
            return Ok(());
        };
        let is_preview = conversation
            .preview
            .as_ref()
            .is_some_and(|p| p.message_id == deleted.id);
        if !is_preview {
            return Ok(());
        }

        let latest = self
            .store
            .latest_visible(&deleted.conversation_id, None)
            .await?;
        let replaced = self
            .store
            .replace_preview_if(
                &deleted.conversation_id,
                &deleted.id,
                latest.as_ref().map(Preview::of),
                at,
            )
            .await?;
        if !replaced {
            tracing::debug!(message_id = %deleted.id, "preview moved on before refresh");
        }
        Ok(())
    }

    fn dispatch_notices(&self, message: &ChatMessage, conversation: &Conversation, first_message: bool) {
        let mut reasons = Vec::new();
        if first_message {
            reasons.push(NoticeReason::FirstContact);
        }
        if is_callback_request(message.content.body()) {
            reasons.push(NoticeReason::CallbackRequest);
        }
        if reasons.is_empty() {
            return;
        }

        let notices: Vec<Notice> = reasons
            .into_iter()
            .map(|reason| Notice {
                reason,
                conversation_id: conversation.id,
                message_id: message.id,
                from: message.sender_id.clone(),
                to: message.receiver_id.clone(),
                listing: conversation.listing.clone(),
                preview: message.content.preview_text(),
            })
            .collect();

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            for notice in notices {
                let reason = notice.reason;
                if let Err(e) = notifier.notify(notice).await {
                    tracing::warn!(reason = ?reason, error = %e, "notice dispatch failed");
                }
            }
        });
    }
}
