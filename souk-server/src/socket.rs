//! WebSocket side of the push channel.
//!
//! The upgrade request carries the gateway's caller header like any other
//! route; a socket without it is refused before the upgrade.
//!
//! Connection lifecycle:
//! 1. Wait for a `Hello` frame naming the caller. Any other user id is
//!    answered with an `Error` frame and the socket is closed.
//! 2. Register a hub session (joining `user:<id>`) and answer `Welcome`.
//! 3. Mark the user online and tell their counterparts.
//! 4. Forward hub frames to the socket while handling client frames.
//! 5. On disconnect, leave the hub and update presence.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use souk_proto::message::UserId;
use souk_proto::push::{self, ClientFrame, ServerFrame};

use crate::auth::Caller;
use crate::hub::{Room, SessionId};
use crate::http::AppState;
use crate::service::ChatService;
use crate::store::{ConversationStore, MessageStore};

/// axum handler that upgrades an HTTP request to a push-channel connection.
pub async fn ws_handler<S>(
    caller: Caller,
    ws: WebSocketUpgrade,
    State(svc): State<AppState<S>>,
) -> impl IntoResponse
where
    S: ConversationStore + MessageStore + 'static,
{
    ws.on_upgrade(move |socket| handle_socket(socket, svc, caller))
}

/// Runs one push-channel connection for `caller` to completion.
pub async fn handle_socket<S>(socket: WebSocket, svc: Arc<ChatService<S>>, caller: Caller)
where
    S: ConversationStore + MessageStore + 'static,
{
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some(user) = wait_for_hello(&mut ws_receiver).await else {
        tracing::warn!(caller = %caller.id(), "connection closed before hello");
        return;
    };
    if let Err(e) = caller.ensure_is(&user) {
        tracing::warn!(caller = %caller.id(), claimed = %user, "hello names another user");
        let err = ServerFrame::Error {
            reason: e.to_string(),
        };
        if let Err(e) = send_frame(&mut ws_sender, &err).await {
            tracing::debug!(error = %e, "failed to send hello rejection");
        }
        if let Err(e) = ws_sender.close().await {
            tracing::debug!(error = %e, "failed to close rejected socket");
        }
        return;
    }

    let hub = Arc::clone(svc.hub());
    let (session, mut rx) = hub.register(&user).await;

    let welcome = ServerFrame::Welcome {
        user_id: user.clone(),
    };
    if let Err(e) = send_frame(&mut ws_sender, &welcome).await {
        tracing::error!(user = %user, error = %e, "failed to send welcome");
        hub.unregister(session).await;
        return;
    }
    tracing::info!(user = %user, session = %session, "push session opened");

    svc.session_opened(&user, session).await;

    // Writer: hub frames -> socket.
    let writer_user = user.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = send_frame(&mut ws_sender, &frame).await {
                tracing::warn!(user = %writer_user, error = %e, "push write failed");
                break;
            }
        }
    });

    // Reader: client frames -> service.
    let reader_user = user.clone();
    let reader_svc = Arc::clone(&svc);
    let mut read_task = tokio::spawn(async move {
        let max_frame_size = reader_svc.config().max_frame_size;
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    if data.len() > max_frame_size {
                        tracing::warn!(
                            user = %reader_user,
                            size = data.len(),
                            max = max_frame_size,
                            "frame exceeds size limit"
                        );
                        let err = ServerFrame::Error {
                            reason: format!(
                                "frame too large: {} bytes (max {max_frame_size})",
                                data.len()
                            ),
                        };
                        reader_svc.hub().send_to(session, err).await;
                        continue;
                    }
                    handle_client_frame(&reader_svc, &reader_user, session, &data).await;
                }
                Message::Close(_) => {
                    tracing::debug!(user = %reader_user, "received close frame");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    hub.unregister(session).await;
    svc.session_closed(&user, session).await;
    tracing::info!(user = %user, session = %session, "push session closed");
}

/// Waits for the opening `Hello` frame and returns the user it names.
async fn wait_for_hello(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<UserId> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => {
                return match push::decode_client(&data) {
                    Ok(ClientFrame::Hello { user_id }) if !user_id.as_str().trim().is_empty() => {
                        Some(user_id)
                    }
                    Ok(ClientFrame::Hello { .. }) => {
                        tracing::warn!("hello with empty user id");
                        None
                    }
                    Ok(other) => {
                        tracing::warn!(frame = ?other, "expected hello");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to decode hello");
                        None
                    }
                };
            }
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

async fn handle_client_frame<S>(svc: &Arc<ChatService<S>>, user: &UserId, session: SessionId, data: &[u8])
where
    S: ConversationStore + MessageStore + 'static,
{
    let frame = match push::decode_client(data) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(user = %user, error = %e, "failed to decode client frame");
            return;
        }
    };

    match frame {
        ClientFrame::Ack { ack_id } => {
            if !svc.hub().acknowledge(session, ack_id).await {
                tracing::debug!(user = %user, ack_id, "late or foreign ack ignored");
            }
        }
        ClientFrame::Typing { to, is_typing } => {
            if &to == user {
                return;
            }
            svc.typing(user, &to, is_typing).await;
        }
        ClientFrame::JoinConversation { conversation_id } => {
            match svc.conversation_for(&conversation_id, user).await {
                Ok(_) => {
                    svc.hub()
                        .join(session, &Room::Conversation(conversation_id))
                        .await;
                }
                Err(e) => {
                    let err = ServerFrame::Error {
                        reason: e.to_string(),
                    };
                    svc.hub().send_to(session, err).await;
                }
            }
        }
        ClientFrame::LeaveConversation { conversation_id } => {
            svc.hub()
                .leave(session, &Room::Conversation(conversation_id))
                .await;
        }
        ClientFrame::Hello { .. } => {
            tracing::warn!(user = %user, "duplicate hello ignored");
        }
    }
}

/// Encodes and sends a frame directly on a WebSocket sender.
async fn send_frame(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    frame: &ServerFrame,
) -> Result<(), String> {
    let bytes = push::encode_server(frame).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}
