//! Presence status types for online/offline tracking.

use serde::{Deserialize, Serialize};

use crate::message::{Timestamp, UserId};

/// Presence status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// At least one push-channel session is connected.
    Online,
    /// No session is connected.
    Offline,
}

impl PresenceStatus {
    /// Maps an online flag to a status.
    #[must_use]
    pub const fn from_online(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A presence change pushed to a user's counterparts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    /// The user whose presence changed.
    pub user_id: UserId,
    /// The new presence status.
    pub status: PresenceStatus,
    /// When the status changed.
    pub timestamp: Timestamp,
}
