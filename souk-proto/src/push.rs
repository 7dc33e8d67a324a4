//! Push-channel wire protocol.
//!
//! Frames are postcard-encoded and carried in binary WebSocket messages.
//! A client opens with [`ClientFrame::Hello`] and the server answers
//! [`ServerFrame::Welcome`]; after that both sides exchange frames freely.
//! Every [`ServerFrame::MessageNew`] carries an `ack_id` the receiving client
//! echoes back in a [`ClientFrame::Ack`] once the message is on screen.

use serde::{Deserialize, Serialize};

use crate::message::{ConversationId, MessageId, MessageView, Timestamp, UserId};
use crate::presence::PresenceUpdate;

/// Frames sent by a client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientFrame {
    /// Identifies the session's user. Must be the first frame.
    Hello {
        /// The authenticated user opening the session.
        user_id: UserId,
    },

    /// Positive acknowledgment of a `MessageNew` frame.
    Ack {
        /// The `ack_id` of the acknowledged frame.
        ack_id: u64,
    },

    /// Start or stop typing towards another user.
    Typing {
        /// The user being typed to.
        to: UserId,
        /// `true` on keystrokes, `false` when the composer is cleared.
        is_typing: bool,
    },

    /// Subscribe the session to a conversation's room events.
    JoinConversation {
        /// Conversation to follow.
        conversation_id: ConversationId,
    },

    /// Unsubscribe the session from a conversation's room events.
    LeaveConversation {
        /// Conversation to stop following.
        conversation_id: ConversationId,
    },
}

/// Frames sent by the server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerFrame {
    /// Session accepted.
    Welcome {
        /// The user the session is bound to (echoed back for confirmation).
        user_id: UserId,
    },

    /// A new message addressed to the session's user (`message:new`).
    MessageNew {
        /// Token to echo in [`ClientFrame::Ack`].
        ack_id: u64,
        /// Full message payload, including the client correlation id.
        message: MessageView,
    },

    /// The receiver acknowledged a message (`message:delivered`).
    MessageDelivered {
        /// The delivered message.
        message_id: MessageId,
        /// Conversation the message belongs to.
        conversation_id: ConversationId,
        /// The user who acknowledged it.
        receiver_id: UserId,
        /// When the acknowledgment was recorded.
        delivered_at: Timestamp,
    },

    /// The sender deleted a message for everyone (`message:deleted-everyone`).
    MessageDeletedEveryone {
        /// The deleted message.
        message_id: MessageId,
        /// Conversation the message belongs to.
        conversation_id: ConversationId,
    },

    /// A counterpart started or stopped typing.
    Typing {
        /// The user typing.
        from: UserId,
        /// Whether they are typing.
        is_typing: bool,
    },

    /// A counterpart came online or went offline.
    Presence(PresenceUpdate),

    /// The server rejected a client frame.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

impl ServerFrame {
    /// Event name of the frame as exposed to client applications.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "session:welcome",
            Self::MessageNew { .. } => "message:new",
            Self::MessageDelivered { .. } => "message:delivered",
            Self::MessageDeletedEveryone { .. } => "message:deleted-everyone",
            Self::Typing { .. } => "typing",
            Self::Presence(_) => "presence",
            Self::Error { .. } => "error",
        }
    }
}

/// Error type for frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Serialization or deserialization failed.
    #[error("frame serialization error: {0}")]
    Serialization(String),
}

/// Encodes a [`ClientFrame`] into bytes.
///
/// # Errors
///
/// Returns [`FrameError::Serialization`] if the frame cannot be serialized.
pub fn encode_client(frame: &ClientFrame) -> Result<Vec<u8>, FrameError> {
    postcard::to_allocvec(frame).map_err(|e| FrameError::Serialization(e.to_string()))
}

/// Decodes a [`ClientFrame`] from bytes.
///
/// # Errors
///
/// Returns [`FrameError::Serialization`] if the bytes are not a valid frame.
pub fn decode_client(bytes: &[u8]) -> Result<ClientFrame, FrameError> {
    postcard::from_bytes(bytes).map_err(|e| FrameError::Serialization(e.to_string()))
}

/// Encodes a [`ServerFrame`] into bytes.
///
/// # Errors
///
/// Returns [`FrameError::Serialization`] if the frame cannot be serialized.
pub fn encode_server(frame: &ServerFrame) -> Result<Vec<u8>, FrameError> {
    postcard::to_allocvec(frame).map_err(|e| FrameError::Serialization(e.to_string()))
}

/// Decodes a [`ServerFrame`] from bytes.
///
/// # Errors
///
/// Returns [`FrameError::Serialization`] if the bytes are not a valid frame.
pub fn decode_server(bytes: &[u8]) -> Result<ServerFrame, FrameError> {
    postcard::from_bytes(bytes).map_err(|e| FrameError::Serialization(e.to_string()))
}
