//! Typing indicator types.

use serde::{Deserialize, Serialize};

use crate::message::UserId;

/// Current typing state between two users, as reported to a querying peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingStatus {
    /// Who last signalled, if anyone signalled within the staleness window.
    pub from: Option<UserId>,
    /// Whether `from` is currently typing.
    pub is_typing: bool,
}

impl TypingStatus {
    /// Status reported when nobody is typing (or the entry went stale).
    #[must_use]
    pub const fn idle() -> Self {
        Self {
            from: None,
            is_typing: false,
        }
    }

    /// Returns `true` if `user` is the one typing.
    #[must_use]
    pub fn is_typing_by(&self, user: &UserId) -> bool {
        self.is_typing && self.from.as_ref() == Some(user)
    }
}
