//! Message data model shared by the server and push-channel clients.
//!
//! The stored record is [`ChatMessage`], whose content is the tagged union
//! [`MessageContent`]. Clients never see that union directly: HTTP responses
//! and push frames carry the flat [`MessageView`] rendering instead.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of a text body or media caption, in characters.
pub const MAX_BODY_CHARS: usize = 2000;

/// Display body rendered in place of a message deleted for everyone.
pub const DELETED_PLACEHOLDER: &str = "This message was deleted";

/// Opaque identifier of a marketplace user, issued by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Wraps an identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Wraps an identifier string, rejecting blank values.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyUserId`] if the string is empty or
    /// whitespace only.
    pub fn parse(id: &str) -> Result<Self, ValidationError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyUserId);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque reference to a listing owned by the listings service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ListingId(String);

impl ListingId {
    /// Wraps a listing reference.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ListingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a message, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new time-ordered message identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parses a message identifier from its textual form.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidId`] if `raw` is not a UUID.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| ValidationError::InvalidId(raw.to_string()))
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a two-party conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(Uuid);

impl ConversationId {
    /// Creates a new conversation identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parses a conversation identifier from its textual form.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidId`] if `raw` is not a UUID.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| ValidationError::InvalidId(raw.to_string()))
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns the timestamp one millisecond later.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// The closed set of message types accepted at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    /// Only ever produced by a delete-for-everyone; never accepted as input.
    Deleted,
}

impl MessageKind {
    /// Returns the media kind for media types, `None` otherwise.
    #[must_use]
    pub const fn media_kind(self) -> Option<MediaKind> {
        match self {
            Self::Image => Some(MediaKind::Image),
            Self::Video => Some(MediaKind::Video),
            Self::Audio => Some(MediaKind::Audio),
            Self::Document => Some(MediaKind::Document),
            Self::Text | Self::Deleted => None,
        }
    }

    /// Lowercase wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            "deleted" => Ok(Self::Deleted),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// Kind of a media attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    /// Inbox preview text for a media message without a caption.
    #[must_use]
    pub const fn placeholder(self) -> &'static str {
        match self {
            Self::Image => "[image]",
            Self::Video => "[video]",
            Self::Audio => "[audio]",
            Self::Document => "[document]",
        }
    }

    /// The [`MessageKind`] this media kind is sent as.
    #[must_use]
    pub const fn message_kind(self) -> MessageKind {
        match self {
            Self::Image => MessageKind::Image,
            Self::Video => MessageKind::Video,
            Self::Audio => MessageKind::Audio,
            Self::Document => MessageKind::Document,
        }
    }
}

/// Content of a chat message.
///
/// Type-dependent fields live on their variant, so a text message can never
/// carry a media reference and a deleted message can never carry a body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text.
    Text { body: String },
    /// A media attachment stored externally, with an optional caption.
    Media {
        kind: MediaKind,
        media_ref: String,
        caption: Option<String>,
    },
    /// Tombstone left by a delete-for-everyone.
    Deleted { at: Timestamp },
}

impl MessageContent {
    /// Builds validated content from the flat request fields.
    ///
    /// Text needs a non-blank body of at most [`MAX_BODY_CHARS`] characters
    /// and must not carry a media reference. Media kinds need a non-blank
    /// media reference; a body, if present, becomes the caption.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] the fields violate.
    pub fn from_parts(
        kind: MessageKind,
        body: Option<String>,
        media_ref: Option<String>,
    ) -> Result<Self, ValidationError> {
        let body = body.filter(|b| !b.trim().is_empty());
        let media_ref = media_ref.filter(|m| !m.trim().is_empty());

        if let Some(ref text) = body {
            let len = text.chars().count();
            if len > MAX_BODY_CHARS {
                return Err(ValidationError::TooLong {
                    len,
                    max: MAX_BODY_CHARS,
                });
            }
        }

        match kind {
            MessageKind::Deleted => Err(ValidationError::ReservedKind),
            MessageKind::Text => {
                if media_ref.is_some() {
                    return Err(ValidationError::UnexpectedMedia);
                }
                body.map(|body| Self::Text { body })
                    .ok_or(ValidationError::Empty)
            }
            MessageKind::Image | MessageKind::Video | MessageKind::Audio | MessageKind::Document => {
                let media_kind = kind.media_kind().ok_or(ValidationError::ReservedKind)?;
                let media_ref = media_ref.ok_or(ValidationError::MissingMedia(kind))?;
                Ok(Self::Media {
                    kind: media_kind,
                    media_ref,
                    caption: body,
                })
            }
        }
    }

    /// The flat message type of this content.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Media { kind, .. } => kind.message_kind(),
            Self::Deleted { .. } => MessageKind::Deleted,
        }
    }

    /// Text body, caption, or empty for media without caption and tombstones.
    #[must_use]
    pub fn body(&self) -> &str {
        match self {
            Self::Text { body } => body,
            Self::Media { caption, .. } => caption.as_deref().unwrap_or_default(),
            Self::Deleted { .. } => "",
        }
    }

    /// External storage reference, present only on media content.
    #[must_use]
    pub fn media_ref(&self) -> Option<&str> {
        match self {
            Self::Media { media_ref, .. } => Some(media_ref),
            Self::Text { .. } | Self::Deleted { .. } => None,
        }
    }

    /// Text shown in the inbox preview for this content.
    #[must_use]
    pub fn preview_text(&self) -> String {
        match self {
            Self::Text { body } => body.clone(),
            Self::Media { kind, caption, .. } => caption
                .clone()
                .unwrap_or_else(|| kind.placeholder().to_string()),
            Self::Deleted { .. } => DELETED_PLACEHOLDER.to_string(),
        }
    }
}

/// A persisted message with its delivery, read and deletion state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: MessageContent,
    /// Sender-supplied token echoed back unchanged for optimistic UI.
    pub client_correlation_id: Option<String>,
    pub created_at: Timestamp,
    pub delivered_at: Option<Timestamp>,
    pub read_at: Option<Timestamp>,
    /// Viewers who hid this message for themselves only.
    pub deleted_for: BTreeSet<UserId>,
}

impl ChatMessage {
    /// Returns `true` once a positive delivery acknowledgment was recorded.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }

    /// Returns `true` once the receiver marked the conversation read.
    #[must_use]
    pub const fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    /// Returns `true` if the sender deleted this message for everyone.
    #[must_use]
    pub const fn is_deleted_for_everyone(&self) -> bool {
        matches!(self.content, MessageContent::Deleted { .. })
    }

    /// Returns `true` if `viewer` hid this message for themselves.
    #[must_use]
    pub fn is_hidden_for(&self, viewer: &UserId) -> bool {
        self.deleted_for.contains(viewer)
    }

    /// Records delivery. Returns `false` if already delivered or deleted.
    pub fn mark_delivered(&mut self, at: Timestamp) -> bool {
        if self.is_delivered() || self.is_deleted_for_everyone() {
            return false;
        }
        self.delivered_at = Some(at);
        true
    }

    /// Records the read receipt without checking delivery first.
    ///
    /// Tombstones take read receipts too: read state belongs to the
    /// transport, not the content. Returns `false` if already read.
    pub fn mark_read(&mut self, at: Timestamp) -> bool {
        if self.is_read() {
            return false;
        }
        self.read_at = Some(at);
        true
    }

    /// Replaces the content with a tombstone.
    ///
    /// Returns the media reference that was cleared, if any, so the caller
    /// can release it from external storage. Deleting twice is a no-op.
    pub fn delete_for_everyone(&mut self, at: Timestamp) -> Option<String> {
        if self.is_deleted_for_everyone() {
            return None;
        }
        let previous = std::mem::replace(&mut self.content, MessageContent::Deleted { at });
        match previous {
            MessageContent::Media { media_ref, .. } => Some(media_ref),
            MessageContent::Text { .. } | MessageContent::Deleted { .. } => None,
        }
    }

    /// Hides the message for `viewer`. Returns `true` if newly hidden.
    pub fn hide_for(&mut self, viewer: &UserId) -> bool {
        self.deleted_for.insert(viewer.clone())
    }
}

/// Client-facing rendering of a [`ChatMessage`].
///
/// Tombstones render as [`MessageKind::Deleted`] with the fixed
/// [`DELETED_PLACEHOLDER`] body and their deletion time; delivery and read
/// state pass through unchanged. Other viewers' hide sets are not exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub body: String,
    pub media_ref: Option<String>,
    pub client_correlation_id: Option<String>,
    pub created_at: Timestamp,
    pub delivered: bool,
    pub delivered_at: Option<Timestamp>,
    pub read: bool,
    pub read_at: Option<Timestamp>,
    pub deleted_everyone: bool,
    pub deleted_at: Option<Timestamp>,
}

impl From<&ChatMessage> for MessageView {
    fn from(msg: &ChatMessage) -> Self {
        let (body, deleted_at) = match msg.content {
            MessageContent::Deleted { at } => (DELETED_PLACEHOLDER.to_string(), Some(at)),
            ref content => (content.body().to_string(), None),
        };
        Self {
            id: msg.id,
            conversation_id: msg.conversation_id,
            sender_id: msg.sender_id.clone(),
            receiver_id: msg.receiver_id.clone(),
            kind: msg.content.kind(),
            body,
            media_ref: msg.content.media_ref().map(str::to_string),
            client_correlation_id: msg.client_correlation_id.clone(),
            created_at: msg.created_at,
            delivered: msg.is_delivered(),
            delivered_at: msg.delivered_at,
            read: msg.is_read(),
            read_at: msg.read_at,
            deleted_everyone: deleted_at.is_some(),
            deleted_at,
        }
    }
}

/// Error returned when message input fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Text message without a body.
    #[error("message body is empty")]
    Empty,
    /// Body or caption longer than the limit.
    #[error("message body too long ({len} characters, max {max})")]
    TooLong {
        /// Actual length in characters.
        len: usize,
        /// Maximum allowed length in characters.
        max: usize,
    },
    /// Media type sent without a media reference.
    #[error("{0} message requires a media reference")]
    MissingMedia(MessageKind),
    /// Text message carrying a media reference.
    #[error("text message must not carry a media reference")]
    UnexpectedMedia,
    /// `deleted` supplied as an input type.
    #[error("message type `deleted` cannot be sent")]
    ReservedKind,
    /// Type outside the closed set.
    #[error("unknown message type `{0}`")]
    UnknownKind(String),
    /// Identifier that does not parse.
    #[error("invalid identifier `{0}`")]
    InvalidId(String),
    /// Pagination bound that is not a millisecond timestamp.
    #[error("invalid page cursor `{0}`")]
    InvalidCursor(String),
    /// Blank user identifier.
    #[error("user identifier is empty")]
    EmptyUserId,
    /// Both participants are the same user.
    #[error("a conversation needs two distinct participants")]
    SelfConversation,
}
