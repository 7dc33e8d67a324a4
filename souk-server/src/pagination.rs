//! Backward pagination over a conversation's messages.
//!
//! A page holds the newest messages created strictly before the cursor,
//! returned oldest-to-newest so a chat window can prepend it as a block.
//! Passing the oldest `createdAt` of a page as the next `before` yields the
//! next older page without gaps or overlap, because creation times within a
//! store are unique.

use serde::{Deserialize, Serialize};
use souk_proto::message::{ConversationId, MessageView, Timestamp, UserId, ValidationError};

use crate::config::MessagingConfig;
use crate::store::{MessageStore, StoreError};

/// Raw `?before=&limit=` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub before: Option<String>,
    pub limit: Option<String>,
}

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Exclusive upper bound on creation time; `None` is unbounded.
    pub before: Option<Timestamp>,
    /// Number of messages, within `[1, max_page_size]`.
    pub limit: usize,
}

impl PageRequest {
    /// Clamps `limit` into range, substituting the default when absent.
    #[must_use]
    pub fn new(before: Option<Timestamp>, limit: Option<usize>, config: &MessagingConfig) -> Self {
        let max = config.max_page_size.max(1);
        let limit = limit.unwrap_or(config.default_page_size).clamp(1, max);
        Self { before, limit }
    }

    /// Parses the query string form. Blank values count as absent and an
    /// unparsable limit falls back to the default.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidCursor`] if `before` is not a
    /// millisecond timestamp.
    pub fn from_query(query: &PageQuery, config: &MessagingConfig) -> Result<Self, ValidationError> {
        let before = match query.before.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<u64>()
                    .map(Timestamp::from_millis)
                    .map_err(|_| ValidationError::InvalidCursor(raw.to_string()))?,
            ),
        };
        let limit = query
            .limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<usize>().ok());
        Ok(Self::new(before, limit, config))
    }
}

/// One page of messages, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub messages: Vec<MessageView>,
    /// `true` if older messages exist beyond this page.
    pub has_more: bool,
    /// Cursor for the next older page.
    pub next_before: Option<Timestamp>,
}

/// Reads one page of `conversation` as seen by `viewer`.
///
/// Messages the viewer hid are skipped; messages deleted for everyone are
/// included as redacted placeholders.
///
/// # Errors
///
/// Propagates [`StoreError`] from the message store.
pub async fn fetch_page<S: MessageStore>(
    store: &S,
    conversation: &ConversationId,
    viewer: &UserId,
    request: PageRequest,
) -> Result<Page, StoreError> {
    let mut newest_first = store
        .page_before(conversation, viewer, request.before, request.limit + 1)
        .await?;

    let has_more = newest_first.len() > request.limit;
    newest_first.truncate(request.limit);
    newest_first.reverse();

    let next_before = if has_more {
        newest_first.first().map(|m| m.created_at)
    } else {
        None
    };

    Ok(Page {
        messages: newest_first.iter().map(MessageView::from).collect(),
        has_more,
        next_before,
    })
}
