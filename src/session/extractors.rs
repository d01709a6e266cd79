//! Axum extractors for sessions verified by the middleware.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::container::SessionContainer;
use super::errors::SessionError;
use super::response::PendingHeaders;

/// Extractor for routes behind `require_session` with a required session.
/// Rejects with 401 if the middleware did not bind a session.
pub struct Session(pub SessionContainer);

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = SessionError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContainer>()
            .cloned()
            .map(Session)
            .ok_or_else(|| SessionError::unauthorised("no session bound to this request"))
    }
}

/// Optional session extractor - never fails.
pub struct MaybeSession(pub Option<SessionContainer>);

impl<S> FromRequestParts<S> for MaybeSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeSession(parts.extensions.get::<SessionContainer>().cloned()))
    }
}

/// Yields the middleware's pending response changes, or a fresh set on
/// routes without the middleware. Return it as part of the response.
impl<S> FromRequestParts<S> for PendingHeaders
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<PendingHeaders>()
            .cloned()
            .unwrap_or_default())
    }
}
