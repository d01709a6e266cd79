//! Request-scoped handle to one verified session.

use crate::JsonMap;
use crate::authority::{SessionInformation, SessionSummary};
use crate::recipe::SessionRecipe;
use crate::session::errors::{ErrorKind, SessionError};
use crate::session::response::{
    PendingHeaders, attach_access_token, clear_session, set_front_token,
};

/// A verified session bound to the response of the current request.
///
/// Identity and payload are read from the verified access token. Session
/// data and timestamps live at the core and are fetched on each call.
#[derive(Clone)]
pub struct SessionContainer {
    recipe: SessionRecipe,
    pending: PendingHeaders,
    handle: String,
    user_id: String,
    jwt_payload: JsonMap,
    access_token: String,
}

impl std::fmt::Debug for SessionContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContainer")
            .field("handle", &self.handle)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl SessionContainer {
    pub(crate) fn new(
        recipe: SessionRecipe,
        pending: PendingHeaders,
        session: SessionSummary,
        access_token: String,
    ) -> Self {
        Self {
            recipe,
            pending,
            handle: session.handle,
            user_id: session.user_id,
            jwt_payload: session.user_data_in_jwt,
            access_token,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn access_token_payload(&self) -> &JsonMap {
        &self.jwt_payload
    }

    pub fn jwt_payload(&self) -> &JsonMap {
        self.access_token_payload()
    }

    /// The access token currently attached to the response, or the one the
    /// request came with if nothing was reissued.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Clear the session cookies when the core no longer knows this session.
    fn guard<T>(&self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        if let Err(e) = &result {
            if e.kind() == ErrorKind::Unauthorised {
                clear_session(self.recipe.config(), &self.pending);
            }
        }
        result
    }

    pub async fn session_information(&self) -> Result<SessionInformation, SessionError> {
        let result = self
            .recipe
            .authority()
            .get_session_information(&self.handle)
            .await;
        self.guard(result)
    }

    pub async fn session_data(&self) -> Result<JsonMap, SessionError> {
        Ok(self.session_information().await?.session_data)
    }

    /// Replace the session data. `None` stores an empty object.
    pub async fn update_session_data(
        &self,
        session_data: Option<JsonMap>,
    ) -> Result<(), SessionError> {
        let result = self
            .recipe
            .authority()
            .update_session_data(&self.handle, &session_data.unwrap_or_default())
            .await;
        self.guard(result)
    }

    /// Replace the access token payload. `None` stores an empty object.
    ///
    /// When the core reissues the access token, the new one replaces the
    /// current token on the response.
    pub async fn update_jwt_payload(
        &mut self,
        jwt_payload: Option<JsonMap>,
    ) -> Result<(), SessionError> {
        let jwt_payload = jwt_payload.unwrap_or_default();
        let result = self
            .recipe
            .authority()
            .regenerate_session(&self.access_token, &jwt_payload)
            .await;
        let regenerated = self.guard(result)?;

        self.jwt_payload = regenerated.session.user_data_in_jwt;
        if let Some(token) = regenerated.access_token {
            attach_access_token(self.recipe.config(), &self.pending, &token);
            set_front_token(&self.pending, &self.user_id, token.expiry, &self.jwt_payload);
            self.access_token = token.token;
        }
        Ok(())
    }

    /// Unix milliseconds.
    pub async fn time_created(&self) -> Result<u64, SessionError> {
        Ok(self.session_information().await?.time_created)
    }

    /// Unix milliseconds.
    pub async fn expiry(&self) -> Result<u64, SessionError> {
        Ok(self.session_information().await?.expiry)
    }

    /// Revoke this session at the core and clear its cookies. A session the
    /// core had already forgotten counts as revoked.
    pub async fn revoke_session(&self) -> Result<(), SessionError> {
        let revoked = self.recipe.authority().revoke_session(&self.handle).await?;
        if !revoked {
            tracing::debug!(session_handle = %self.handle, "Session was already gone");
        }
        clear_session(self.recipe.config(), &self.pending);
        Ok(())
    }
}
