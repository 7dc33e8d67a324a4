//! The messaging operations, independent of transport.
//!
//! [`ChatService`] ties the stores to the push hub, presence tracker, rate
//! guard and external collaborators. The HTTP and WebSocket layers are thin
//! adapters over it.

mod conversations;
mod messages;

use std::sync::Arc;

use souk_proto::message::{ConversationId, Timestamp, UserId};
use souk_proto::presence::{PresenceStatus, PresenceUpdate};
use souk_proto::push::ServerFrame;
use souk_proto::typing::TypingStatus;

pub use conversations::StartConversation;
pub use messages::{SendMessage, SendOutcome};

use crate::collaborators::{
    InMemoryDirectory, LogMediaStorage, LogNotifier, MediaStorage, Notifier, ProfileDirectory,
};
use crate::config::MessagingConfig;
use crate::error::ChatError;
use crate::hub::{PushHub, Room, SessionId};
use crate::model::Conversation;
use crate::presence::PresenceTracker;
use crate::rate_guard::RateGuard;
use crate::store::{ConversationStore, MessageStore};

/// Messaging core over a store `S`.
pub struct ChatService<S> {
    store: Arc<S>,
    hub: Arc<PushHub>,
    presence: Arc<PresenceTracker>,
    rate_guard: RateGuard,
    directory: Arc<dyn ProfileDirectory>,
    notifier: Arc<dyn Notifier>,
    media: Arc<dyn MediaStorage>,
    config: MessagingConfig,
}

impl<S> ChatService<S>
where
    S: ConversationStore + MessageStore + 'static,
{
    /// Service with process-local presence and logging collaborators.
    #[must_use]
    pub fn new(store: Arc<S>, config: MessagingConfig) -> Self {
        Self {
            store,
            hub: Arc::new(PushHub::new()),
            presence: Arc::new(PresenceTracker::new(config.typing_ttl)),
            rate_guard: RateGuard::new(config.send_cooldown),
            directory: Arc::new(InMemoryDirectory::new()),
            notifier: Arc::new(LogNotifier),
            media: Arc::new(LogMediaStorage),
            config,
        }
    }

    /// Replaces the profile directory.
    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn ProfileDirectory>) -> Self {
        self.directory = directory;
        self
    }

    /// Replaces the notice dispatcher.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replaces the media storage.
    #[must_use]
    pub fn with_media_storage(mut self, media: Arc<dyn MediaStorage>) -> Self {
        self.media = media;
        self
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The push hub shared with WebSocket sessions.
    #[must_use]
    pub const fn hub(&self) -> &Arc<PushHub> {
        &self.hub
    }

    /// The presence and typing tracker.
    #[must_use]
    pub const fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    /// Active tunables.
    #[must_use]
    pub const fn config(&self) -> &MessagingConfig {
        &self.config
    }

    /// Drops expired ephemeral entries.
    pub fn sweep_ephemeral(&self) -> usize {
        self.rate_guard.sweep() + self.presence.sweep()
    }

    /// Loads a conversation the caller belongs to.
    ///
    /// # Errors
    ///
    /// [`ChatError::NotFound`] if absent, [`ChatError::AccessDenied`] if the
    /// caller is not a participant.
    pub async fn conversation_for(
        &self,
        id: &ConversationId,
        caller: &UserId,
    ) -> Result<Conversation, ChatError> {
        let conversation = self
            .store
            .conversation(id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("conversation {id}")))?;
        if !conversation.has_participant(caller) {
            return Err(ChatError::denied(format!(
                "{caller} is not a participant of conversation {id}"
            )));
        }
        Ok(conversation)
    }

    /// Records a typing signal and forwards it to the other user's sessions.
    pub async fn typing(&self, from: &UserId, to: &UserId, is_typing: bool) {
        self.presence.set_typing(from, to, is_typing);
        let frame = ServerFrame::Typing {
            from: from.clone(),
            is_typing,
        };
        self.hub.broadcast(&Room::User(to.clone()), &frame).await;
    }

    /// Whether `of` is typing to `to`, after applying the staleness window.
    #[must_use]
    pub fn typing_status(&self, of: &UserId, to: &UserId) -> TypingStatus {
        let status = self.presence.typing_status(of, to);
        if status.is_typing_by(of) {
            status
        } else {
            TypingStatus::idle()
        }
    }

    /// Marks the user online for a freshly opened push session.
    ///
    /// Counterparts are told when the user goes from offline to online.
    pub async fn session_opened(&self, user: &UserId, session: SessionId) {
        if self.presence.set_online(user, session) {
            self.announce_presence(user, PresenceStatus::Online).await;
        }
    }

    /// Updates presence after a push session closed.
    ///
    /// Must run after the session left the hub. The user stays online while
    /// another of their sessions is still connected.
    pub async fn session_closed(&self, user: &UserId, session: SessionId) {
        let remaining = self.hub.members(&Room::User(user.clone())).await;
        if let Some(next) = remaining.first() {
            if self.presence.session_of(user) == Some(session) {
                self.presence.set_online(user, *next);
            }
            return;
        }
        if self.presence.set_offline(user, session) {
            self.announce_presence(user, PresenceStatus::Offline).await;
        }
    }

    async fn announce_presence(&self, user: &UserId, status: PresenceStatus) {
        let counterparts = match self.counterparts_of(user).await {
            Ok(counterparts) => counterparts,
            Err(e) => {
                tracing::warn!(user = %user, error = %e, "presence announcement skipped");
                return;
            }
        };

        let frame = ServerFrame::Presence(PresenceUpdate {
            user_id: user.clone(),
            status,
            timestamp: Timestamp::now(),
        });
        for counterpart in &counterparts {
            self.hub
                .broadcast(&Room::User(counterpart.clone()), &frame)
                .await;
        }
        tracing::debug!(user = %user, %status, notified = counterparts.len(), "presence announced");
    }
}
