//! In-process implementation of the conversation and message stores.
//!
//! Data lives in two [`RwLock`]-guarded tables and is lost when the process
//! exits. Each trait method takes the relevant write lock exactly once, which
//! gives it the atomicity the traits promise.

use std::collections::{BTreeSet, HashMap};

use souk_proto::message::{ChatMessage, ConversationId, ListingId, MessageId, Timestamp, UserId};
use tokio::sync::RwLock;

use super::{ConversationStore, MessageStore, NewMessage, StoreError};
use crate::model::{Conversation, ListingSnapshot, ParticipantPair, Preview};

/// Lookup key of a conversation: the unordered pair plus the listing.
type ThreadKey = (ParticipantPair, Option<ListingId>);

#[derive(Default)]
struct ConversationTable {
    by_id: HashMap<ConversationId, Conversation>,
    by_key: HashMap<ThreadKey, ConversationId>,
    /// Last activity time handed out, across all conversations.
    last_activity: Option<Timestamp>,
}

impl ConversationTable {
    /// `at`, bumped past the previous activity so inbox order has no ties.
    fn stamp(&mut self, at: Timestamp) -> Timestamp {
        let ts = match self.last_activity {
            Some(last) if at <= last => last.next(),
            _ => at,
        };
        self.last_activity = Some(ts);
        ts
    }

    fn get_mut(&mut self, id: &ConversationId) -> Result<&mut Conversation, StoreError> {
        self.by_id.get_mut(id).ok_or_else(|| missing_conversation(id))
    }
}

#[derive(Default)]
struct MessageTable {
    by_id: HashMap<MessageId, ChatMessage>,
    /// Message ids per conversation in creation order.
    by_conversation: HashMap<ConversationId, Vec<MessageId>>,
    /// Last creation time handed out.
    last_created: Option<Timestamp>,
}

impl MessageTable {
    /// Wall-clock time, bumped past the previous value when the clock has
    /// not moved (or moved backwards).
    fn next_created_at(&mut self) -> Timestamp {
        let now = Timestamp::now();
        let ts = match self.last_created {
            Some(last) if now <= last => last.next(),
            _ => now,
        };
        self.last_created = Some(ts);
        ts
    }

    fn thread(&self, conversation: &ConversationId) -> impl DoubleEndedIterator<Item = &ChatMessage> {
        self.by_conversation
            .get(conversation)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
    }
}

/// Process-local store implementing both [`ConversationStore`] and
/// [`MessageStore`].
#[derive(Default)]
pub struct InMemoryStore {
    conversations: RwLock<ConversationTable>,
    messages: RwLock<MessageTable>,
}

impl InMemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently stored, across all conversations.
    pub async fn message_count(&self) -> usize {
        self.messages.read().await.by_id.len()
    }
}

fn missing_conversation(id: &ConversationId) -> StoreError {
    StoreError::NotFound(format!("conversation {id}"))
}

fn missing_message(id: &MessageId) -> StoreError {
    StoreError::NotFound(format!("message {id}"))
}

impl ConversationStore for InMemoryStore {
    async fn find_or_create(
        &self,
        participants: ParticipantPair,
        listing: Option<ListingSnapshot>,
    ) -> Result<(Conversation, bool), StoreError> {
        let key = (
            participants.clone(),
            listing.as_ref().map(|l| l.listing_id.clone()),
        );
        let mut table = self.conversations.write().await;

        if let Some(existing) = table.by_key.get(&key).and_then(|id| table.by_id.get(id)) {
            return Ok((existing.clone(), false));
        }

        let created_at = table.stamp(Timestamp::now());
        let conversation = Conversation::new(participants, listing, created_at);
        table.by_key.insert(key, conversation.id);
        table.by_id.insert(conversation.id, conversation.clone());
        drop(table);
        Ok((conversation, true))
    }

    async fn conversation(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        Ok(self.conversations.read().await.by_id.get(id).cloned())
    }

    async fn touch_on_send(
        &self,
        id: &ConversationId,
        receiver: &UserId,
        preview: Preview,
        at: Timestamp,
    ) -> Result<Conversation, StoreError> {
        let mut table = self.conversations.write().await;
        let stamped = table.stamp(at);
        let conversation = table.get_mut(id)?;

        if conversation
            .preview
            .as_ref()
            .is_none_or(|current| current.created_at <= preview.created_at)
        {
            conversation.preview = Some(preview);
        }
        let counter = conversation.unread_counts.entry(receiver.clone()).or_insert(0);
        *counter = counter.saturating_add(1);
        conversation.sort_timestamp = conversation.sort_timestamp.max(stamped);
        Ok(conversation.clone())
    }

    async fn reset_unread(&self, id: &ConversationId, viewer: &UserId) -> Result<(), StoreError> {
        let mut table = self.conversations.write().await;
        let conversation = table.get_mut(id)?;
        conversation.unread_counts.insert(viewer.clone(), 0);
        Ok(())
    }

    async fn decrement_unread(
        &self,
        id: &ConversationId,
        viewer: &UserId,
    ) -> Result<(), StoreError> {
        let mut table = self.conversations.write().await;
        let conversation = table.get_mut(id)?;
        if let Some(counter) = conversation.unread_counts.get_mut(viewer) {
            *counter = counter.saturating_sub(1);
        }
        Ok(())
    }

    async fn replace_preview_if(
        &self,
        id: &ConversationId,
        expected: &MessageId,
        preview: Option<Preview>,
        at: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut table = self.conversations.write().await;
        let shows_expected = table
            .get_mut(id)?
            .preview
            .as_ref()
            .is_some_and(|current| &current.message_id == expected);
        if !shows_expected {
            return Ok(false);
        }

        let stamped = table.stamp(at);
        let conversation = table.get_mut(id)?;
        conversation.preview = preview;
        conversation.sort_timestamp = conversation.sort_timestamp.max(stamped);
        Ok(true)
    }

    async fn conversations_for(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        let table = self.conversations.read().await;
        let mut found: Vec<Conversation> = table
            .by_id
            .values()
            .filter(|c| c.has_participant(user))
            .cloned()
            .collect();
        drop(table);

        found.sort_by(|a, b| {
            b.sort_timestamp
                .cmp(&a.sort_timestamp)
                .then_with(|| b.id.as_uuid().cmp(a.id.as_uuid()))
        });
        found.truncate(limit);
        Ok(found)
    }

    async fn remove_conversation(&self, id: &ConversationId) -> Result<bool, StoreError> {
        let mut table = self.conversations.write().await;
        let Some(removed) = table.by_id.remove(id) else {
            return Ok(false);
        };
        let key = (
            removed.participants,
            removed.listing.map(|l| l.listing_id),
        );
        table.by_key.remove(&key);
        Ok(true)
    }
}

impl MessageStore for InMemoryStore {
    async fn insert_message(&self, draft: NewMessage) -> Result<ChatMessage, StoreError> {
        let mut table = self.messages.write().await;
        if table.by_id.contains_key(&draft.id) {
            return Err(StoreError::WriteFailed(format!(
                "duplicate message id {}",
                draft.id
            )));
        }

        let message = ChatMessage {
            id: draft.id,
            conversation_id: draft.conversation_id,
            sender_id: draft.sender_id,
            receiver_id: draft.receiver_id,
            content: draft.content,
            client_correlation_id: draft.client_correlation_id,
            created_at: table.next_created_at(),
            delivered_at: None,
            read_at: None,
            deleted_for: BTreeSet::new(),
        };

        table
            .by_conversation
            .entry(message.conversation_id)
            .or_default()
            .push(message.id);
        table.by_id.insert(message.id, message.clone());
        drop(table);
        Ok(message)
    }

    async fn message(&self, id: &MessageId) -> Result<Option<ChatMessage>, StoreError> {
        Ok(self.messages.read().await.by_id.get(id).cloned())
    }

    async fn mark_delivered(&self, id: &MessageId, at: Timestamp) -> Result<bool, StoreError> {
        let mut table = self.messages.write().await;
        let message = table.by_id.get_mut(id).ok_or_else(|| missing_message(id))?;
        Ok(message.mark_delivered(at))
    }

    async fn mark_read_for(
        &self,
        conversation: &ConversationId,
        viewer: &UserId,
        at: Timestamp,
    ) -> Result<usize, StoreError> {
        let mut guard = self.messages.write().await;
        let table = &mut *guard;
        let Some(ids) = table.by_conversation.get(conversation) else {
            return Ok(0);
        };

        let mut changed = 0;
        for id in ids {
            if let Some(message) = table.by_id.get_mut(id)
                && message.receiver_id == *viewer
                && message.mark_read(at)
            {
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_for_everyone(
        &self,
        id: &MessageId,
        at: Timestamp,
    ) -> Result<Option<String>, StoreError> {
        let mut table = self.messages.write().await;
        let message = table.by_id.get_mut(id).ok_or_else(|| missing_message(id))?;
        Ok(message.delete_for_everyone(at))
    }

    async fn hide_message(&self, id: &MessageId, viewer: &UserId) -> Result<bool, StoreError> {
        let mut table = self.messages.write().await;
        let message = table.by_id.get_mut(id).ok_or_else(|| missing_message(id))?;
        Ok(message.hide_for(viewer))
    }

    async fn page_before(
        &self,
        conversation: &ConversationId,
        viewer: &UserId,
        before: Option<Timestamp>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let table = self.messages.read().await;
        let page = table
            .thread(conversation)
            .rev()
            .filter(|m| before.is_none_or(|bound| m.created_at < bound))
            .filter(|m| !m.is_hidden_for(viewer))
            .take(limit)
            .cloned()
            .collect();
        Ok(page)
    }

    async fn latest_visible(
        &self,
        conversation: &ConversationId,
        viewer: Option<&UserId>,
    ) -> Result<Option<ChatMessage>, StoreError> {
        let table = self.messages.read().await;
        let latest = table
            .thread(conversation)
            .rev()
            .find(|m| !m.is_deleted_for_everyone() && viewer.is_none_or(|v| !m.is_hidden_for(v)))
            .cloned();
        Ok(latest)
    }

    async fn remove_message(&self, id: &MessageId) -> Result<bool, StoreError> {
        let mut table = self.messages.write().await;
        let Some(removed) = table.by_id.remove(id) else {
            return Ok(false);
        };
        if let Some(ids) = table.by_conversation.get_mut(&removed.conversation_id) {
            ids.retain(|kept| kept != id);
        }
        Ok(true)
    }

    async fn remove_messages_of(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let mut table = self.messages.write().await;
        let ids = table.by_conversation.remove(conversation).unwrap_or_default();
        let removed = ids
            .iter()
            .filter_map(|id| table.by_id.remove(id))
            .collect();
        Ok(removed)
    }
}
