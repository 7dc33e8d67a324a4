//! Push-channel session registry and room fan-out.
//!
//! Every connected WebSocket is a session with its own outbound channel. A
//! session always sits in its user's room and may additionally follow
//! conversation rooms. Frames sent to a room go to every session in it.
//!
//! [`PushHub::emit_with_ack`] implements the acknowledged half of the
//! protocol: the frame carries a fresh `ack_id`, and the first matching
//! [`ClientFrame::Ack`](souk_proto::push::ClientFrame::Ack) from one of the
//! receiver's sessions completes the wait.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use souk_proto::message::{ConversationId, MessageView, UserId};
use souk_proto::push::ServerFrame;
use tokio::sync::{RwLock, mpsc, oneshot};

/// Identifies one push-channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A fan-out target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    /// All sessions of one user.
    User(UserId),
    /// Sessions following a conversation.
    Conversation(ConversationId),
}

impl std::fmt::Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(user) => write!(f, "user:{user}"),
            Self::Conversation(id) => write!(f, "conversation:{id}"),
        }
    }
}

/// Result of waiting for a delivery acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// A receiver session acknowledged the frame.
    Acknowledged(SessionId),
    /// The frame went out but no acknowledgment arrived in time.
    TimedOut,
    /// The receiver had no connected session.
    NoReceiver,
}

struct Session {
    user: UserId,
    sender: mpsc::UnboundedSender<ServerFrame>,
    rooms: BTreeSet<String>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, Session>,
    rooms: HashMap<String, BTreeSet<SessionId>>,
}

impl Registry {
    fn join(&mut self, session: SessionId, room: &Room) -> bool {
        let Some(entry) = self.sessions.get_mut(&session) else {
            return false;
        };
        let name = room.to_string();
        entry.rooms.insert(name.clone());
        self.rooms.entry(name).or_default().insert(session)
    }

    fn leave(&mut self, session: SessionId, name: &str) -> bool {
        if let Some(entry) = self.sessions.get_mut(&session) {
            entry.rooms.remove(name);
        }
        let Some(members) = self.rooms.get_mut(name) else {
            return false;
        };
        let removed = members.remove(&session);
        if members.is_empty() {
            self.rooms.remove(name);
        }
        removed
    }
}

struct PendingAck {
    receiver: UserId,
    done: oneshot::Sender<SessionId>,
}

/// Shared registry of push sessions, rooms and in-flight acknowledgments.
#[derive(Default)]
pub struct PushHub {
    registry: RwLock<Registry>,
    pending: Mutex<HashMap<u64, PendingAck>>,
    next_session: AtomicU64,
    next_ack: AtomicU64,
}

impl PushHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session for `user` and places it in the user's room.
    ///
    /// Returns the session id and the receiving end of its outbound channel.
    pub async fn register(&self, user: &UserId) -> (SessionId, mpsc::UnboundedReceiver<ServerFrame>) {
        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut registry = self.registry.write().await;
        registry.sessions.insert(
            id,
            Session {
                user: user.clone(),
                sender: tx,
                rooms: BTreeSet::new(),
            },
        );
        registry.join(id, &Room::User(user.clone()));
        drop(registry);

        tracing::debug!(session = %id, user = %user, "push session registered");
        (id, rx)
    }

    /// Closes a session and removes it from every room.
    ///
    /// Returns the session's user if it was registered.
    pub async fn unregister(&self, session: SessionId) -> Option<UserId> {
        let mut registry = self.registry.write().await;
        let entry = registry.sessions.remove(&session)?;
        for name in &entry.rooms {
            if let Some(members) = registry.rooms.get_mut(name) {
                members.remove(&session);
                if members.is_empty() {
                    registry.rooms.remove(name);
                }
            }
        }
        drop(registry);

        tracing::debug!(session = %session, user = %entry.user, "push session unregistered");
        Some(entry.user)
    }

    /// Adds a session to a room. Returns `true` if newly joined.
    pub async fn join(&self, session: SessionId, room: &Room) -> bool {
        self.registry.write().await.join(session, room)
    }

    /// Removes a session from a room. Returns `true` if it was a member.
    pub async fn leave(&self, session: SessionId, room: &Room) -> bool {
        self.registry
            .write()
            .await
            .leave(session, &room.to_string())
    }

    /// Sessions currently in `room`.
    pub async fn members(&self, room: &Room) -> Vec<SessionId> {
        self.registry
            .read()
            .await
            .rooms
            .get(&room.to_string())
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if `user` has at least one open session.
    pub async fn is_connected(&self, user: &UserId) -> bool {
        !self.members(&Room::User(user.clone())).await.is_empty()
    }

    /// Sends a frame to a single session. Returns `false` if it is gone.
    pub async fn send_to(&self, session: SessionId, frame: ServerFrame) -> bool {
        let registry = self.registry.read().await;
        registry
            .sessions
            .get(&session)
            .is_some_and(|entry| entry.sender.send(frame).is_ok())
    }

    /// Sends a frame to every session in `room`. Returns how many got it.
    pub async fn broadcast(&self, room: &Room, frame: &ServerFrame) -> usize {
        let registry = self.registry.read().await;
        let Some(members) = registry.rooms.get(&room.to_string()) else {
            return 0;
        };

        let mut sent = 0;
        for id in members {
            if let Some(entry) = registry.sessions.get(id)
                && entry.sender.send(frame.clone()).is_ok()
            {
                sent += 1;
            }
        }
        tracing::trace!(room = %room, event = frame.event_name(), sent, "room broadcast");
        sent
    }

    /// Pushes `message:new` to the receiver's room and waits up to `timeout`
    /// for the first acknowledgment from one of the receiver's sessions.
    pub async fn emit_with_ack(
        &self,
        receiver: &UserId,
        message: MessageView,
        timeout: Duration,
    ) -> AckOutcome {
        let ack_id = self.next_ack.fetch_add(1, Ordering::Relaxed) + 1;
        let (done, wait) = oneshot::channel();
        self.pending.lock().insert(
            ack_id,
            PendingAck {
                receiver: receiver.clone(),
                done,
            },
        );

        let frame = ServerFrame::MessageNew { ack_id, message };
        let sent = self.broadcast(&Room::User(receiver.clone()), &frame).await;
        if sent == 0 {
            self.pending.lock().remove(&ack_id);
            return AckOutcome::NoReceiver;
        }

        let outcome = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(session)) => AckOutcome::Acknowledged(session),
            Ok(Err(_)) | Err(_) => AckOutcome::TimedOut,
        };
        self.pending.lock().remove(&ack_id);
        outcome
    }

    /// Completes the wait for `ack_id` on behalf of `session`.
    ///
    /// Only a session of the addressed receiver can acknowledge. Returns
    /// `true` if this was the first valid acknowledgment.
    pub async fn acknowledge(&self, session: SessionId, ack_id: u64) -> bool {
        let user = {
            let registry = self.registry.read().await;
            match registry.sessions.get(&session) {
                Some(entry) => entry.user.clone(),
                None => return false,
            }
        };

        let mut pending = self.pending.lock();
        let matches = pending
            .get(&ack_id)
            .is_some_and(|entry| entry.receiver == user);
        if !matches {
            return false;
        }
        pending
            .remove(&ack_id)
            .is_some_and(|entry| entry.done.send(session).is_ok())
    }

    /// Number of acknowledgments still being waited for.
    #[must_use]
    pub fn pending_acks(&self) -> usize {
        self.pending.lock().len()
    }
}
