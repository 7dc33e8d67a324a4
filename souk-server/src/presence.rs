//! Who is online, and who is typing to whom.
//!
//! Both maps live in an [`EphemeralStore`] and are never persisted. Typing
//! entries carry the staleness window as their TTL, so a lost stop-typing
//! signal reads as "not typing" once the window has passed.

use std::sync::Arc;
use std::time::Duration;

use souk_proto::message::UserId;
use souk_proto::typing::TypingStatus;

use crate::ephemeral::{EphemeralStore, LocalEphemeral};
use crate::hub::SessionId;

/// Online map and typing map of the process.
pub struct PresenceTracker {
    online: Arc<dyn EphemeralStore<SessionId>>,
    typing: Arc<dyn EphemeralStore<TypingStatus>>,
    typing_ttl: Duration,
}

fn online_key(user: &UserId) -> String {
    format!("online:{user}")
}

/// Key of the unordered pair `{a, b}`. The length prefix keeps
/// `("ab", "c")` and `("a", "bc")` apart.
fn typing_key(a: &UserId, b: &UserId) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("typing:{}:{lo}{hi}", lo.as_str().len())
}

impl PresenceTracker {
    /// Tracker backed by process-local maps.
    #[must_use]
    pub fn new(typing_ttl: Duration) -> Self {
        Self::with_stores(
            typing_ttl,
            Arc::new(LocalEphemeral::new()),
            Arc::new(LocalEphemeral::new()),
        )
    }

    /// Tracker backed by the given stores.
    #[must_use]
    pub fn with_stores(
        typing_ttl: Duration,
        online: Arc<dyn EphemeralStore<SessionId>>,
        typing: Arc<dyn EphemeralStore<TypingStatus>>,
    ) -> Self {
        Self {
            online,
            typing,
            typing_ttl,
        }
    }

    /// Points `user` at `session`. Returns `true` if the user was offline.
    pub fn set_online(&self, user: &UserId, session: SessionId) -> bool {
        let key = online_key(user);
        let was_offline = self.online.get(&key).is_none();
        self.online.set(&key, session, None);
        was_offline
    }

    /// Clears `user` if it still points at `session`. Returns `true` if cleared.
    ///
    /// A newer session that has since overwritten the entry is left alone.
    pub fn set_offline(&self, user: &UserId, session: SessionId) -> bool {
        self.online
            .remove_if(&online_key(user), &|current| *current == session)
    }

    /// Returns `true` if `user` has an active session.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.online.get(&online_key(user)).is_some()
    }

    /// The session currently recorded for `user`.
    #[must_use]
    pub fn session_of(&self, user: &UserId) -> Option<SessionId> {
        self.online.get(&online_key(user))
    }

    /// Records that `from` started or stopped typing to `to`.
    pub fn set_typing(&self, from: &UserId, to: &UserId, is_typing: bool) {
        let status = TypingStatus {
            from: Some(from.clone()),
            is_typing,
        };
        self.typing
            .set(&typing_key(from, to), status, Some(self.typing_ttl));
    }

    /// Typing state between `a` and `b`, in either direction.
    ///
    /// Entries older than the staleness window are evicted and read as idle.
    #[must_use]
    pub fn typing_status(&self, a: &UserId, b: &UserId) -> TypingStatus {
        self.typing
            .get(&typing_key(a, b))
            .unwrap_or_else(TypingStatus::idle)
    }

    /// Returns `true` if `from` is currently typing to `to`.
    #[must_use]
    pub fn is_typing_to(&self, from: &UserId, to: &UserId) -> bool {
        self.typing_status(from, to).is_typing_by(from)
    }

    /// Drops expired typing and online entries.
    pub fn sweep(&self) -> usize {
        self.typing.purge_expired() + self.online.purge_expired()
    }
}
