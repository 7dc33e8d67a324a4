//! Conversation records and inbox shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use souk_proto::message::{
    ChatMessage, ConversationId, ListingId, MessageId, MessageKind, MessageView, Timestamp,
    UserId, ValidationError,
};

/// The unordered pair of users in a conversation, stored in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ParticipantPair([UserId; 2]);

impl ParticipantPair {
    /// Builds the pair for two distinct users, in either order.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::SelfConversation`] if both ids are equal.
    pub fn new(a: UserId, b: UserId) -> Result<Self, ValidationError> {
        match a.cmp(&b) {
            std::cmp::Ordering::Equal => Err(ValidationError::SelfConversation),
            std::cmp::Ordering::Less => Ok(Self([a, b])),
            std::cmp::Ordering::Greater => Ok(Self([b, a])),
        }
    }

    /// Returns `true` if `user` is one of the two participants.
    #[must_use]
    pub fn contains(&self, user: &UserId) -> bool {
        self.0.contains(user)
    }

    /// The participant that is not `user`, or `None` if `user` is not in the pair.
    #[must_use]
    pub fn other(&self, user: &UserId) -> Option<&UserId> {
        match &self.0 {
            [a, b] if a == user => Some(b),
            [a, b] if b == user => Some(a),
            _ => None,
        }
    }

    /// Both participants.
    #[must_use]
    pub const fn members(&self) -> &[UserId; 2] {
        &self.0
    }
}

/// Listing reference plus the title/image captured when the thread started.
///
/// The snapshot is never refreshed from the listings service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSnapshot {
    pub listing_id: ListingId,
    pub title: Option<String>,
    pub image: Option<String>,
}

/// Denormalized preview of the latest visible message.
///
/// This is a cache of the message store; [`Preview::of`] rebuilds it from a
/// message alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub message_id: MessageId,
    #[serde(rename = "lastMessage")]
    pub text: String,
    #[serde(rename = "lastMessageType")]
    pub kind: MessageKind,
    #[serde(rename = "lastSenderId")]
    pub sender_id: UserId,
    /// Creation time of the previewed message.
    #[serde(rename = "lastMessageAt")]
    pub created_at: Timestamp,
}

impl Preview {
    /// Preview of `msg`.
    #[must_use]
    pub fn of(msg: &ChatMessage) -> Self {
        Self {
            message_id: msg.id,
            text: msg.content.preview_text(),
            kind: msg.content.kind(),
            sender_id: msg.sender_id.clone(),
            created_at: msg.created_at,
        }
    }
}

/// A two-party thread, optionally anchored to a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: ParticipantPair,
    pub listing: Option<ListingSnapshot>,
    pub preview: Option<Preview>,
    /// One entry per participant.
    pub unread_counts: BTreeMap<UserId, u32>,
    /// Last activity; drives inbox ordering.
    pub sort_timestamp: Timestamp,
    pub created_at: Timestamp,
}

impl Conversation {
    /// A fresh conversation with both unread counters at zero.
    #[must_use]
    pub fn new(participants: ParticipantPair, listing: Option<ListingSnapshot>, at: Timestamp) -> Self {
        let unread_counts = participants
            .members()
            .iter()
            .map(|user| (user.clone(), 0))
            .collect();
        Self {
            id: ConversationId::new(),
            participants,
            listing,
            preview: None,
            unread_counts,
            sort_timestamp: at,
            created_at: at,
        }
    }

    /// The listing this conversation is anchored to, if any.
    #[must_use]
    pub fn listing_id(&self) -> Option<&ListingId> {
        self.listing.as_ref().map(|l| &l.listing_id)
    }

    /// Unread counter of `user` (zero for non-participants).
    #[must_use]
    pub fn unread_for(&self, user: &UserId) -> u32 {
        self.unread_counts.get(user).copied().unwrap_or(0)
    }

    /// Returns `true` if `user` belongs to this conversation.
    #[must_use]
    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participants.contains(user)
    }
}

/// Public profile snapshot of a user, served by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub user_id: UserId,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

impl PublicProfile {
    /// Profile carrying only the id, used when the directory has no entry.
    #[must_use]
    pub const fn anonymous(user_id: UserId) -> Self {
        Self {
            user_id,
            display_name: None,
            avatar: None,
        }
    }
}

/// One row of a user's inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxEntry {
    pub conversation: Conversation,
    pub counterpart: PublicProfile,
    /// Latest message visible to the inbox owner, recomputed from the store.
    pub last_message: Option<MessageView>,
    pub unread: u32,
}
