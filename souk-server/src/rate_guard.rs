//! Per-sender send cooldown.

use std::sync::Arc;
use std::time::Duration;

use souk_proto::message::UserId;

use crate::ephemeral::{EphemeralStore, LocalEphemeral};
use crate::error::ChatError;

/// Rejects a sender's attempt while its previous accepted attempt is younger
/// than the cooldown. Bursts are rejected, not smoothed.
pub struct RateGuard {
    stamps: Arc<dyn EphemeralStore<()>>,
    cooldown: Duration,
}

impl RateGuard {
    /// Guard backed by a process-local map.
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self::with_store(cooldown, Arc::new(LocalEphemeral::new()))
    }

    /// Guard backed by the given ephemeral store.
    #[must_use]
    pub fn with_store(cooldown: Duration, stamps: Arc<dyn EphemeralStore<()>>) -> Self {
        Self { stamps, cooldown }
    }

    /// Records an attempt by `sender` if the cooldown has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::RateLimited`] with the time left otherwise.
    pub fn check(&self, sender: &UserId) -> Result<(), ChatError> {
        if self.cooldown.is_zero() {
            return Ok(());
        }

        let key = format!("send:{sender}");
        if self.stamps.set_if_absent(&key, (), Some(self.cooldown)) {
            return Ok(());
        }

        let left = self.stamps.remaining_ttl(&key).unwrap_or(self.cooldown);
        let retry_after_ms = u64::try_from(left.as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(sender = %sender, retry_after_ms, "send rate limited");
        Err(ChatError::RateLimited { retry_after_ms })
    }

    /// Drops stamps whose cooldown has passed.
    pub fn sweep(&self) -> usize {
        self.stamps.purge_expired()
    }
}
