//! Interfaces to services outside the messaging core.
//!
//! The core only calls these after the send has been persisted (or, for media
//! cleanup, after the deletion), and every failure is logged and swallowed by
//! the caller. Default implementations keep the server self-contained.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use souk_proto::message::{ConversationId, MessageId, UserId};

use crate::model::{ListingSnapshot, PublicProfile};

/// Failure reported by an external collaborator.
#[derive(Debug, thiserror::Error)]
#[error("{service} unavailable: {reason}")]
pub struct CollaboratorError {
    /// Which collaborator failed.
    pub service: &'static str,
    /// What went wrong.
    pub reason: String,
}

/// Source of public profile snapshots for inbox enrichment.
pub trait ProfileDirectory: Send + Sync {
    /// Profile of `user`, `None` if the directory does not know them.
    fn profile<'a>(
        &'a self,
        user: &'a UserId,
    ) -> BoxFuture<'a, Result<Option<PublicProfile>, CollaboratorError>>;
}

/// Profiles held in memory. Unknown users resolve to `None`.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    profiles: RwLock<HashMap<UserId, PublicProfile>>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a profile.
    pub fn upsert(&self, profile: PublicProfile) {
        self.profiles.write().insert(profile.user_id.clone(), profile);
    }
}

impl ProfileDirectory for InMemoryDirectory {
    fn profile<'a>(
        &'a self,
        user: &'a UserId,
    ) -> BoxFuture<'a, Result<Option<PublicProfile>, CollaboratorError>> {
        let found = self.profiles.read().get(user).cloned();
        Box::pin(async move { Ok(found) })
    }
}

/// Why the receiver should be told about a message out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeReason {
    /// First message of a newly created conversation.
    FirstContact,
    /// The text asks the counterpart to call back.
    CallbackRequest,
}

/// Out-of-band notice about a message (email, SMS).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub reason: NoticeReason,
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub from: UserId,
    pub to: UserId,
    pub listing: Option<ListingSnapshot>,
    pub preview: String,
}

/// Dispatcher of out-of-band notices.
pub trait Notifier: Send + Sync {
    /// Hands the notice to the delivery service.
    fn notify(&self, notice: Notice) -> BoxFuture<'_, Result<(), CollaboratorError>>;
}

/// Notifier that only logs.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) -> BoxFuture<'_, Result<(), CollaboratorError>> {
        Box::pin(async move {
            tracing::info!(
                reason = ?notice.reason,
                conversation_id = %notice.conversation_id,
                message_id = %notice.message_id,
                to = %notice.to,
                "notice dispatched"
            );
            Ok(())
        })
    }
}

/// Phrases that read as a request to be called back.
const CALLBACK_PHRASES: &[&str] = &[
    "call me",
    "call back",
    "callback",
    "give me a call",
    "give me a ring",
    "ring me",
    "phone me",
    "my number is",
    "can you call",
    "please call",
];

/// Returns `true` if `text` asks the counterpart to call back.
#[must_use]
pub fn is_callback_request(text: &str) -> bool {
    let lowered = text.to_lowercase();
    CALLBACK_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

/// External blob storage holding message media.
pub trait MediaStorage: Send + Sync {
    /// Deletes the object behind `media_ref`.
    fn remove<'a>(&'a self, media_ref: &'a str) -> BoxFuture<'a, Result<(), CollaboratorError>>;
}

/// Media storage that only logs removals.
#[derive(Debug, Default)]
pub struct LogMediaStorage;

impl MediaStorage for LogMediaStorage {
    fn remove<'a>(&'a self, media_ref: &'a str) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            tracing::debug!(media_ref, "media removed");
            Ok(())
        })
    }
}
