//! JSON request surface.
//!
//! Handlers parse identifiers, pull the [`Caller`] from the request and hand
//! off to [`ChatService`]. Every failure renders through
//! [`ChatError`]'s `IntoResponse`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use souk_proto::message::{ConversationId, MessageId, MessageView, UserId};
use souk_proto::typing::TypingStatus;

use crate::auth::Caller;
use crate::error::ChatError;
use crate::model::{Conversation, InboxEntry};
use crate::pagination::{Page, PageQuery, PageRequest};
use crate::service::{ChatService, SendMessage, StartConversation};
use crate::store::{ConversationStore, MessageStore};

/// Shared handler state.
pub type AppState<S> = Arc<ChatService<S>>;

/// Routes of the JSON API.
pub fn routes<S>() -> Router<AppState<S>>
where
    S: ConversationStore + MessageStore + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/conversations/start", post(start_conversation::<S>))
        .route("/conversations/preview/{user_id}", get(inbox_preview::<S>))
        .route(
            "/conversations/{id}",
            get(inbox::<S>).delete(delete_conversation::<S>),
        )
        .route("/conversations/{id}/mark-read", put(mark_read::<S>))
        .route("/messages", post(send_message::<S>))
        .route("/messages/{conversation_id}", get(list_messages::<S>))
        .route(
            "/messages/delete-everyone/{message_id}",
            put(delete_for_everyone::<S>),
        )
        .route("/messages/delete-me/{message_id}", put(delete_for_me::<S>))
        .route("/presence/{user_id}", get(presence::<S>))
        .route("/presence/{user_id}/typing", get(typing::<S>))
}

fn parse_user(raw: &str) -> Result<UserId, ChatError> {
    Ok(UserId::parse(raw)?)
}

fn parse_conversation(raw: &str) -> Result<ConversationId, ChatError> {
    Ok(ConversationId::parse(raw)?)
}

fn parse_message(raw: &str) -> Result<MessageId, ChatError> {
    Ok(MessageId::parse(raw)?)
}

async fn health() -> &'static str {
    "ok"
}

async fn start_conversation<S>(
    State(svc): State<AppState<S>>,
    caller: Caller,
    body: Result<Json<StartConversation>, JsonRejection>,
) -> Result<(StatusCode, Json<Conversation>), ChatError>
where
    S: ConversationStore + MessageStore + 'static,
{
    let Json(request) = body?;
    let (conversation, created) = svc.start_conversation(&caller, request).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(conversation)))
}

async fn inbox<S>(
    State(svc): State<AppState<S>>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<InboxEntry>>, ChatError>
where
    S: ConversationStore + MessageStore + 'static,
{
    let user = parse_user(&user_id)?;
    Ok(Json(svc.inbox(&caller, &user, None).await?))
}

async fn inbox_preview<S>(
    State(svc): State<AppState<S>>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<InboxEntry>>, ChatError>
where
    S: ConversationStore + MessageStore + 'static,
{
    let user = parse_user(&user_id)?;
    Ok(Json(svc.inbox_preview(&caller, &user).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadResponse {
    conversation_id: ConversationId,
    marked: usize,
}

async fn mark_read<S>(
    State(svc): State<AppState<S>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<MarkReadResponse>, ChatError>
where
    S: ConversationStore + MessageStore + 'static,
{
    let conversation_id = parse_conversation(&id)?;
    let marked = svc.mark_read(&caller, &conversation_id).await?;
    Ok(Json(MarkReadResponse {
        conversation_id,
        marked,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteConversationResponse {
    conversation_id: ConversationId,
    deleted_messages: usize,
}

async fn delete_conversation<S>(
    State(svc): State<AppState<S>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<DeleteConversationResponse>, ChatError>
where
    S: ConversationStore + MessageStore + 'static,
{
    let conversation_id = parse_conversation(&id)?;
    let deleted_messages = svc.hard_delete(&caller, &conversation_id).await?;
    Ok(Json(DeleteConversationResponse {
        conversation_id,
        deleted_messages,
    }))
}

async fn send_message<S>(
    State(svc): State<AppState<S>>,
    caller: Caller,
    body: Result<Json<SendMessage>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageView>), ChatError>
where
    S: ConversationStore + MessageStore + 'static,
{
    let Json(request) = body?;
    let outcome = svc.send(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(outcome.message)))
}

async fn list_messages<S>(
    State(svc): State<AppState<S>>,
    caller: Caller,
    Path(conversation_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page>, ChatError>
where
    S: ConversationStore + MessageStore + 'static,
{
    let conversation_id = parse_conversation(&conversation_id)?;
    let request = PageRequest::from_query(&query, svc.config())?;
    Ok(Json(svc.list_page(&caller, &conversation_id, request).await?))
}

async fn delete_for_everyone<S>(
    State(svc): State<AppState<S>>,
    caller: Caller,
    Path(message_id): Path<String>,
) -> Result<Json<MessageView>, ChatError>
where
    S: ConversationStore + MessageStore + 'static,
{
    let message_id = parse_message(&message_id)?;
    Ok(Json(svc.delete_for_everyone(&caller, &message_id).await?))
}

async fn delete_for_me<S>(
    State(svc): State<AppState<S>>,
    caller: Caller,
    Path(message_id): Path<String>,
) -> Result<StatusCode, ChatError>
where
    S: ConversationStore + MessageStore + 'static,
{
    let message_id = parse_message(&message_id)?;
    svc.delete_for_me(&caller, &message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresenceResponse {
    user_id: UserId,
    online: bool,
}

async fn presence<S>(
    State(svc): State<AppState<S>>,
    _caller: Caller,
    Path(user_id): Path<String>,
) -> Result<Json<PresenceResponse>, ChatError>
where
    S: ConversationStore + MessageStore + 'static,
{
    let user_id = parse_user(&user_id)?;
    let online = svc.presence().is_online(&user_id);
    Ok(Json(PresenceResponse { user_id, online }))
}

/// Whether `user_id` is typing to the caller.
async fn typing<S>(
    State(svc): State<AppState<S>>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ChatError>
where
    S: ConversationStore + MessageStore + 'static,
{
    let user_id = parse_user(&user_id)?;
    let status: TypingStatus = svc.typing_status(&user_id, caller.id());
    Ok(Json(status))
}
