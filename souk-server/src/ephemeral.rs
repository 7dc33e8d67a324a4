//! Short-lived key-value state: rate-guard stamps, online sessions, typing.
//!
//! The trait mirrors the small command set of a TTL-capable key-value server
//! (get, set with expiry, set-if-absent, compare-and-delete) so the in-process
//! [`LocalEphemeral`] can be swapped for a shared store when the server runs
//! as several instances. Expired entries read as absent and are evicted on
//! access.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// TTL-capable key-value store for ephemeral state.
pub trait EphemeralStore<V>: Send + Sync {
    /// Current value, or `None` if absent or expired.
    fn get(&self, key: &str) -> Option<V>;

    /// Stores `value`, replacing any previous one. `None` never expires.
    fn set(&self, key: &str, value: V, ttl: Option<Duration>);

    /// Stores `value` only if no live entry exists. Returns `true` if stored.
    fn set_if_absent(&self, key: &str, value: V, ttl: Option<Duration>) -> bool;

    /// Time left before the entry under `key` expires.
    fn remaining_ttl(&self, key: &str) -> Option<Duration>;

    /// Removes the entry, returning its value if it was live.
    fn remove(&self, key: &str) -> Option<V>;

    /// Removes the entry only if its live value satisfies `matches`.
    fn remove_if(&self, key: &str, matches: &dyn Fn(&V) -> bool) -> bool;

    /// Drops every expired entry. Returns how many were dropped.
    fn purge_expired(&self) -> usize;
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Process-local [`EphemeralStore`].
#[derive(Debug)]
pub struct LocalEphemeral<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V> Default for LocalEphemeral<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> LocalEphemeral<V> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

fn expiry(now: Instant, ttl: Option<Duration>) -> Option<Instant> {
    ttl.map(|ttl| now + ttl)
}

impl<V: Clone + Send> EphemeralStore<V> for LocalEphemeral<V> {
    fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let expires_at = expiry(Instant::now(), ttl);
        self.entries
            .lock()
            .insert(key.to_string(), Entry { value, expires_at });
    }

    fn set_if_absent(&self, key: &str, value: V, ttl: Option<Duration>) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return false;
        }
        let expires_at = expiry(now, ttl);
        entries.insert(key.to_string(), Entry { value, expires_at });
        true
    }

    fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.lock();
        let entry = entries.get(key).filter(|entry| entry.is_live(now))?;
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    fn remove(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.entries
            .lock()
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value)
    }

    fn remove_if(&self, key: &str, matches: &dyn Fn(&V) -> bool) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let hit = entries
            .get(key)
            .is_some_and(|entry| entry.is_live(now) && matches(&entry.value));
        if hit {
            entries.remove(key);
        }
        hit
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }
}
