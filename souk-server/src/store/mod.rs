//! Persistence seam for conversations and messages.
//!
//! The service layer talks to storage only through [`ConversationStore`] and
//! [`MessageStore`]. Every mutation a trait method performs is atomic with
//! respect to other calls on the same store: counters are incremented or reset
//! inside the store, never read-modified-written by callers.
//!
//! Implementations:
//! - [`memory::InMemoryStore`]: process-local store, used by the binary and tests

pub mod memory;

use std::future::Future;

use souk_proto::message::{
    ChatMessage, ConversationId, MessageContent, MessageId, Timestamp, UserId,
};

use crate::model::{Conversation, ListingSnapshot, ParticipantPair, Preview};

pub use memory::InMemoryStore;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying storage is unavailable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write operation failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The record addressed by a mutation does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// A message about to be persisted. The store assigns `created_at`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: MessageContent,
    pub client_correlation_id: Option<String>,
}

/// Durable record of two-party threads.
pub trait ConversationStore: Send + Sync {
    /// Looks up the thread for the pair and listing, creating it if absent.
    ///
    /// Returns the conversation and `true` if it was created by this call.
    fn find_or_create(
        &self,
        participants: ParticipantPair,
        listing: Option<ListingSnapshot>,
    ) -> impl Future<Output = Result<(Conversation, bool), StoreError>> + Send;

    /// Fetches a conversation by id.
    fn conversation(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = Result<Option<Conversation>, StoreError>> + Send;

    /// Increments the receiver's unread counter by one and moves
    /// `sort_timestamp` forward to `at`.
    ///
    /// The preview is replaced only if `preview` is at least as recent as the
    /// current one, so sends finishing out of order keep the newest.
    fn touch_on_send(
        &self,
        id: &ConversationId,
        receiver: &UserId,
        preview: Preview,
        at: Timestamp,
    ) -> impl Future<Output = Result<Conversation, StoreError>> + Send;

    /// Sets `viewer`'s unread counter to zero.
    fn reset_unread(
        &self,
        id: &ConversationId,
        viewer: &UserId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Decrements `viewer`'s unread counter, saturating at zero.
    fn decrement_unread(
        &self,
        id: &ConversationId,
        viewer: &UserId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Replaces (or clears) the preview if it still shows `expected`, and
    /// then moves `sort_timestamp` forward to `at`.
    ///
    /// Returns `false`, changing nothing, if the preview has moved on.
    fn replace_preview_if(
        &self,
        id: &ConversationId,
        expected: &MessageId,
        preview: Option<Preview>,
        at: Timestamp,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Conversations `user` participates in, most recent activity first.
    fn conversations_for(
        &self,
        user: &UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Conversation>, StoreError>> + Send;

    /// Deletes a conversation record. Returns `false` if it did not exist.
    fn remove_conversation(
        &self,
        id: &ConversationId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// Append-mostly log of messages, scoped by conversation.
pub trait MessageStore: Send + Sync {
    /// Persists a new message, assigning its creation time.
    ///
    /// Creation times are strictly increasing across the store.
    fn insert_message(
        &self,
        draft: NewMessage,
    ) -> impl Future<Output = Result<ChatMessage, StoreError>> + Send;

    /// Fetches a message by id.
    fn message(
        &self,
        id: &MessageId,
    ) -> impl Future<Output = Result<Option<ChatMessage>, StoreError>> + Send;

    /// Records delivery. Returns `false` if it was already recorded.
    fn mark_delivered(
        &self,
        id: &MessageId,
        at: Timestamp,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Marks every message addressed to `viewer` in the conversation as read.
    ///
    /// Returns how many messages changed state.
    fn mark_read_for(
        &self,
        conversation: &ConversationId,
        viewer: &UserId,
        at: Timestamp,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// Turns the message into a tombstone.
    ///
    /// Returns the media reference that was cleared, if any.
    fn delete_for_everyone(
        &self,
        id: &MessageId,
        at: Timestamp,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Adds `viewer` to the message's hide set. Returns `true` if newly added.
    fn hide_message(
        &self,
        id: &MessageId,
        viewer: &UserId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Up to `limit` messages created strictly before `before` (unbounded if
    /// `None`) and not hidden by `viewer`, newest first.
    fn page_before(
        &self,
        conversation: &ConversationId,
        viewer: &UserId,
        before: Option<Timestamp>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, StoreError>> + Send;

    /// Most recent message that is not a tombstone and, if `viewer` is given,
    /// not hidden by that viewer.
    fn latest_visible(
        &self,
        conversation: &ConversationId,
        viewer: Option<&UserId>,
    ) -> impl Future<Output = Result<Option<ChatMessage>, StoreError>> + Send;

    /// Deletes a single message. Returns `false` if it did not exist.
    fn remove_message(
        &self,
        id: &MessageId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Deletes every message of a conversation, returning the removed records.
    fn remove_messages_of(
        &self,
        conversation: &ConversationId,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, StoreError>> + Send;
}
