//! Authenticated caller extraction.
//!
//! Authentication itself happens upstream; the gateway forwards the verified
//! user id in the [`CALLER_HEADER`] header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use souk_proto::message::UserId;

use crate::error::ChatError;

/// Header carrying the authenticated user id.
pub const CALLER_HEADER: &str = "x-user-id";

/// The authenticated user on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub UserId);

impl Caller {
    /// The caller's user id.
    #[must_use]
    pub const fn id(&self) -> &UserId {
        &self.0
    }

    /// Fails with `AccessDenied` unless the caller is `claimed`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::AccessDenied`] on mismatch.
    pub fn ensure_is(&self, claimed: &UserId) -> Result<(), ChatError> {
        if &self.0 == claimed {
            Ok(())
        } else {
            Err(ChatError::denied(format!(
                "caller {} cannot act as {claimed}",
                self.0
            )))
        }
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ChatError::denied("missing caller identity"))?;

        UserId::parse(raw)
            .map(Self)
            .map_err(|_| ChatError::denied("blank caller identity"))
    }
}
