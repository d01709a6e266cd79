//! The session recipe: configuration, core client and signing key cache
//! bundled into one cheaply cloneable handle.

use std::sync::Arc;

use thiserror::Error;

use crate::JsonMap;
use crate::authority::{AuthorityClient, SessionInformation, SigningKeyMaterial, TransportError};
use crate::config::{ConfigError, SessionConfig};
use crate::session::cookie::{ANTI_CSRF_HEADER, RID_HEADER};
use crate::session::response::attach_session_tokens;
use crate::session::{PendingHeaders, SessionContainer, SessionError};
use crate::token::SigningKeyCache;

/// Errors building a `SessionRecipe`.
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build core client: {0}")]
    Client(#[from] TransportError),
}

struct RecipeInner {
    config: SessionConfig,
    authority: AuthorityClient,
    keys: SigningKeyCache,
}

#[derive(Clone)]
pub struct SessionRecipe {
    inner: Arc<RecipeInner>,
}

impl SessionRecipe {
    pub fn new(config: SessionConfig) -> Result<Self, RecipeError> {
        config.validate()?;
        let authority = AuthorityClient::new(&config)?;

        Ok(Self {
            inner: Arc::new(RecipeInner {
                config,
                authority,
                keys: SigningKeyCache::default(),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn authority(&self) -> &AuthorityClient {
        &self.inner.authority
    }

    pub(crate) fn keys(&self) -> &SigningKeyCache {
        &self.inner.keys
    }

    /// Request headers a CORS layer in front of the app must allow.
    pub fn cors_headers(&self) -> Vec<&'static str> {
        vec![ANTI_CSRF_HEADER, RID_HEADER]
    }

    /// Cache key material attached to a core response, if any.
    pub(crate) fn remember_key(&self, signing: &SigningKeyMaterial) {
        if let (Some(material), Some(expires_at)) = (
            &signing.jwt_signing_public_key,
            signing.jwt_signing_public_key_expiry_time,
        ) {
            self.keys().store(material, expires_at);
        }
    }

    /// Fetch the current signing key from the core and cache it.
    pub async fn refresh_signing_key(&self) -> Result<(), SessionError> {
        let handshake = self.authority().handshake().await?;
        self.keys().store(
            &handshake.jwt_signing_public_key,
            handshake.jwt_signing_public_key_expiry_time,
        );
        tracing::debug!(
            expires_at = handshake.jwt_signing_public_key_expiry_time,
            "Fetched signing key"
        );
        Ok(())
    }

    /// Start a session for `user_id` and record its cookies on `pending`.
    pub async fn create_new_session(
        &self,
        pending: &PendingHeaders,
        user_id: &str,
        jwt_payload: Option<JsonMap>,
        session_data: Option<JsonMap>,
    ) -> Result<SessionContainer, SessionError> {
        let jwt_payload = jwt_payload.unwrap_or_default();
        let session_data = session_data.unwrap_or_default();

        let tokens = self
            .authority()
            .create_session(
                user_id,
                &jwt_payload,
                &session_data,
                self.config().anti_csrf.enabled(),
            )
            .await?;

        self.remember_key(&tokens.signing);
        attach_session_tokens(self.config(), pending, &tokens);
        tracing::debug!(session_handle = %tokens.session.handle, "Created session");

        Ok(SessionContainer::new(
            self.clone(),
            pending.clone(),
            tokens.session,
            tokens.access_token.token,
        ))
    }

    pub async fn get_session_information(
        &self,
        session_handle: &str,
    ) -> Result<SessionInformation, SessionError> {
        self.authority().get_session_information(session_handle).await
    }

    /// `None` stores an empty object.
    pub async fn update_session_data(
        &self,
        session_handle: &str,
        session_data: Option<JsonMap>,
    ) -> Result<(), SessionError> {
        self.authority()
            .update_session_data(session_handle, &session_data.unwrap_or_default())
            .await
    }

    /// Replace the stored payload. `None` stores an empty object. Tokens
    /// already issued keep the old payload until their next refresh.
    pub async fn update_jwt_payload(
        &self,
        session_handle: &str,
        jwt_payload: Option<JsonMap>,
    ) -> Result<(), SessionError> {
        self.authority()
            .update_jwt_payload(session_handle, &jwt_payload.unwrap_or_default())
            .await
    }

    pub async fn revoke_session(&self, session_handle: &str) -> Result<bool, SessionError> {
        self.authority().revoke_session(session_handle).await
    }

    pub async fn revoke_multiple_sessions(
        &self,
        session_handles: &[String],
    ) -> Result<Vec<String>, SessionError> {
        self.authority()
            .revoke_multiple_sessions(session_handles)
            .await
    }

    pub async fn revoke_all_sessions_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<String>, SessionError> {
        self.authority().revoke_all_sessions_for_user(user_id).await
    }

    pub async fn get_all_session_handles_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<String>, SessionError> {
        self.authority()
            .get_all_session_handles_for_user(user_id)
            .await
    }
}
