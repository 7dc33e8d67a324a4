//! Conversation lifecycle: start, inbox, mark-read, hard delete.

use std::collections::BTreeSet;

use serde::Deserialize;
use souk_proto::message::{ConversationId, ListingId, MessageView, Timestamp, UserId};

use super::ChatService;
use crate::auth::Caller;
use crate::error::ChatError;
use crate::model::{Conversation, InboxEntry, ListingSnapshot, ParticipantPair, PublicProfile};
use crate::store::{ConversationStore, MessageStore};

/// Body of `POST /conversations/start`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConversation {
    pub initiator_id: UserId,
    pub counterpart_id: UserId,
    pub listing_id: Option<ListingId>,
    pub listing_title: Option<String>,
    pub listing_image: Option<String>,
}

impl StartConversation {
    fn listing(&self) -> Option<ListingSnapshot> {
        self.listing_id.clone().map(|listing_id| ListingSnapshot {
            listing_id,
            title: self.listing_title.clone(),
            image: self.listing_image.clone(),
        })
    }
}

impl<S> ChatService<S>
where
    S: ConversationStore + MessageStore + 'static,
{
    /// Finds or creates the conversation between the caller and a
    /// counterpart, optionally anchored to a listing.
    ///
    /// Returns the conversation and whether it was created.
    ///
    /// # Errors
    ///
    /// `AccessDenied` if the caller is not the initiator, `Validation` if
    /// both ids are the same user.
    pub async fn start_conversation(
        &self,
        caller: &Caller,
        request: StartConversation,
    ) -> Result<(Conversation, bool), ChatError> {
        caller.ensure_is(&request.initiator_id)?;
        let listing = request.listing();
        let pair = ParticipantPair::new(request.initiator_id, request.counterpart_id)?;

        let (conversation, created) = self.store.find_or_create(pair, listing).await?;
        if created {
            tracing::info!(conversation_id = %conversation.id, "conversation started");
        }
        Ok((conversation, created))
    }

    /// The inbox of `user`, most recently active first.
    ///
    /// Each entry carries the counterpart's profile and the latest message
    /// visible to `user`, read from the message store rather than the cached
    /// preview.
    ///
    /// # Errors
    ///
    /// `AccessDenied` if `user` is not the caller; store failures as `Internal`.
    pub async fn inbox(
        &self,
        caller: &Caller,
        user: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<InboxEntry>, ChatError> {
        caller.ensure_is(user)?;
        let conversations = self
            .store
            .conversations_for(user, limit.unwrap_or(usize::MAX))
            .await?;

        let mut entries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let counterpart = match conversation.participants.other(user) {
                Some(other) => self.public_profile(other).await,
                None => continue,
            };
            let last_message = self
                .store
                .latest_visible(&conversation.id, Some(user))
                .await?
                .as_ref()
                .map(MessageView::from);
            let unread = conversation.unread_for(user);
            entries.push(InboxEntry {
                conversation,
                counterpart,
                last_message,
                unread,
            });
        }
        Ok(entries)
    }

    /// The first few inbox entries, for badges and dropdowns.
    ///
    /// # Errors
    ///
    /// Same as [`ChatService::inbox`].
    pub async fn inbox_preview(
        &self,
        caller: &Caller,
        user: &UserId,
    ) -> Result<Vec<InboxEntry>, ChatError> {
        self.inbox(caller, user, Some(self.config.inbox_preview_size))
            .await
    }

    /// Zeroes the caller's unread counter and marks every message addressed
    /// to them read. Safe to repeat.
    ///
    /// Returns how many messages changed to read.
    ///
    /// # Errors
    ///
    /// `NotFound` / `AccessDenied` per [`ChatService::conversation_for`].
    pub async fn mark_read(
        &self,
        caller: &Caller,
        conversation_id: &ConversationId,
    ) -> Result<usize, ChatError> {
        let viewer = caller.id();
        self.conversation_for(conversation_id, viewer).await?;

        self.store.reset_unread(conversation_id, viewer).await?;
        let marked = self
            .store
            .mark_read_for(conversation_id, viewer, Timestamp::now())
            .await?;
        tracing::debug!(conversation_id = %conversation_id, viewer = %viewer, marked, "conversation read");
        Ok(marked)
    }

    /// Deletes the conversation and all of its messages.
    ///
    /// Returns the number of messages removed. Media of removed messages is
    /// released best-effort.
    ///
    /// # Errors
    ///
    /// `NotFound` / `AccessDenied` per [`ChatService::conversation_for`].
    pub async fn hard_delete(
        &self,
        caller: &Caller,
        conversation_id: &ConversationId,
    ) -> Result<usize, ChatError> {
        self.conversation_for(conversation_id, caller.id()).await?;

        // Conversation first: a send racing this delete then fails its
        // touch and removes its own message.
        self.store.remove_conversation(conversation_id).await?;
        let removed = self.store.remove_messages_of(conversation_id).await?;
        tracing::info!(
            conversation_id = %conversation_id,
            by = %caller.id(),
            messages = removed.len(),
            "conversation deleted"
        );

        let media: Vec<String> = removed
            .iter()
            .filter_map(|m| m.content.media_ref().map(str::to_string))
            .collect();
        self.release_media(&media).await;
        Ok(removed.len())
    }

    /// Everyone `user` has a conversation with.
    ///
    /// # Errors
    ///
    /// Store failures as `Internal`.
    pub async fn counterparts_of(&self, user: &UserId) -> Result<BTreeSet<UserId>, ChatError> {
        let conversations = self.store.conversations_for(user, usize::MAX).await?;
        Ok(conversations
            .iter()
            .filter_map(|c| c.participants.other(user).cloned())
            .collect())
    }

    async fn public_profile(&self, user: &UserId) -> PublicProfile {
        match self.directory.profile(user).await {
            Ok(Some(profile)) => profile,
            Ok(None) => PublicProfile::anonymous(user.clone()),
            Err(e) => {
                tracing::warn!(user = %user, error = %e, "profile lookup failed");
                PublicProfile::anonymous(user.clone())
            }
        }
    }

    pub(super) async fn release_media(&self, refs: &[String]) {
        for media_ref in refs {
            if let Err(e) = self.media.remove(media_ref).await {
                tracing::warn!(media_ref = %media_ref, error = %e, "media cleanup failed");
            }
        }
    }
}
