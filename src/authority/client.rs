//! HTTP transport and one method per core operation.

use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use thiserror::Error;

use super::types::{
    CreateRequest, HandshakeInfo, JwtDataRequest, RefreshRequest, RegenerateRequest,
    RegeneratedSession, RemoveRequest, RevokedHandles, SessionDataRequest, SessionHandles,
    SessionInformation, SessionInformationBody, SessionTokens, VerifiedSession, VerifyRequest,
};
use crate::JsonMap;
use crate::config::SessionConfig;
use crate::session::SessionError;

/// Core driver interface version this client speaks.
pub const CDI_VERSION: &str = "2.9";

const USER_AGENT: &str = concat!("sessionward/", env!("CARGO_PKG_VERSION"));

/// Failures talking to the core that are not auth decisions.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to core failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("core returned HTTP {status} for {path}: {body}")]
    Status {
        path: &'static str,
        status: u16,
        body: String,
    },
    #[error("core returned an unreadable body for {path}: {source}")]
    Body {
        path: &'static str,
        source: serde_json::Error,
    },
    #[error("core returned unexpected status {status:?} for {path}")]
    UnexpectedStatus { path: &'static str, status: String },
}

#[derive(Deserialize)]
struct Envelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    session: Option<serde_json::Value>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct TheftSession {
    handle: String,
    user_id: String,
}

/// Typed client for the core service.
#[derive(Clone)]
pub struct AuthorityClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AuthorityClient {
    pub fn new(config: &SessionConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config
                .connection_uri
                .as_str()
                .trim_end_matches('/')
                .to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header("cdi-version", CDI_VERSION)
            .header("rid", "session");
        if let Some(api_key) = &self.api_key {
            builder = builder.header("api-key", api_key);
        }
        builder
    }

    /// Send a request and sort the reply into success, auth outcome or transport failure.
    async fn execute<T: DeserializeOwned>(
        &self,
        path: &'static str,
        builder: RequestBuilder,
    ) -> Result<T, SessionError> {
        let response = builder.send().await.map_err(TransportError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                path,
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let bytes = response.bytes().await.map_err(TransportError::from)?;
        let envelope: Envelope = serde_json::from_slice(&bytes)
            .map_err(|source| TransportError::Body { path, source })?;

        match envelope.status.as_str() {
            "OK" => serde_json::from_slice(&bytes)
                .map_err(|source| TransportError::Body { path, source }.into()),
            "UNAUTHORISED" => Err(SessionError::unauthorised(
                envelope
                    .message
                    .unwrap_or_else(|| "session does not exist or has expired".to_string()),
            )),
            "TRY_REFRESH_TOKEN" => Err(SessionError::TryRefreshToken {
                message: envelope
                    .message
                    .unwrap_or_else(|| "access token needs a refresh".to_string()),
            }),
            "TOKEN_THEFT_DETECTED" => {
                let theft = envelope
                    .session
                    .and_then(|session| serde_json::from_value::<TheftSession>(session).ok())
                    .unwrap_or_else(|| {
                        tracing::warn!(path, "Theft reported without a session");
                        TheftSession::default()
                    });
                Err(SessionError::TokenTheftDetected {
                    session_handle: theft.handle,
                    user_id: theft.user_id,
                })
            }
            other => Err(TransportError::UnexpectedStatus {
                path,
                status: other.to_string(),
            }
            .into()),
        }
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        user_data_in_jwt: &JsonMap,
        session_data: &JsonMap,
        enable_anti_csrf: bool,
    ) -> Result<SessionTokens, SessionError> {
        const PATH: &str = "/recipe/session";
        let body = CreateRequest {
            user_id,
            user_data_in_jwt,
            session_data,
            enable_anti_csrf,
        };
        self.execute(PATH, self.request(Method::POST, PATH).json(&body))
            .await
    }

    pub async fn verify_session(
        &self,
        access_token: &str,
        anti_csrf_token: Option<&str>,
        do_anti_csrf_check: bool,
        enable_anti_csrf: bool,
    ) -> Result<VerifiedSession, SessionError> {
        const PATH: &str = "/recipe/session/verify";
        let body = VerifyRequest {
            access_token,
            anti_csrf_token,
            do_anti_csrf_check,
            enable_anti_csrf,
        };
        self.execute(PATH, self.request(Method::POST, PATH).json(&body))
            .await
    }

    pub async fn refresh_session(
        &self,
        refresh_token: &str,
        anti_csrf_token: Option<&str>,
        enable_anti_csrf: bool,
    ) -> Result<SessionTokens, SessionError> {
        const PATH: &str = "/recipe/session/refresh";
        let body = RefreshRequest {
            refresh_token,
            anti_csrf_token,
            enable_anti_csrf,
        };
        self.execute(PATH, self.request(Method::POST, PATH).json(&body))
            .await
    }

    /// Replace the payload of the session behind `access_token`, possibly
    /// receiving a new access token that carries it.
    pub async fn regenerate_session(
        &self,
        access_token: &str,
        user_data_in_jwt: &JsonMap,
    ) -> Result<RegeneratedSession, SessionError> {
        const PATH: &str = "/recipe/session/regenerate";
        let body = RegenerateRequest {
            access_token,
            user_data_in_jwt,
        };
        self.execute(PATH, self.request(Method::POST, PATH).json(&body))
            .await
    }

    pub async fn get_session_information(
        &self,
        session_handle: &str,
    ) -> Result<SessionInformation, SessionError> {
        const PATH: &str = "/recipe/session";
        let body: SessionInformationBody = self
            .execute(
                PATH,
                self.request(Method::GET, PATH)
                    .query(&[("sessionHandle", session_handle)]),
            )
            .await?;

        Ok(SessionInformation {
            session_handle: session_handle.to_string(),
            user_id: body.user_id,
            session_data: body.session_data,
            user_data_in_jwt: body.user_data_in_jwt,
            time_created: body.time_created,
            expiry: body.expiry,
        })
    }

    pub async fn update_session_data(
        &self,
        session_handle: &str,
        session_data: &JsonMap,
    ) -> Result<(), SessionError> {
        const PATH: &str = "/recipe/session/data";
        let body = SessionDataRequest {
            session_handle,
            session_data,
        };
        let _: IgnoredAny = self
            .execute(PATH, self.request(Method::PUT, PATH).json(&body))
            .await?;
        Ok(())
    }

    /// Replace the payload stored for a session. Tokens already issued keep
    /// their old payload until they are refreshed or regenerated.
    pub async fn update_jwt_payload(
        &self,
        session_handle: &str,
        user_data_in_jwt: &JsonMap,
    ) -> Result<(), SessionError> {
        const PATH: &str = "/recipe/jwt/data";
        let body = JwtDataRequest {
            session_handle,
            user_data_in_jwt,
        };
        let _: IgnoredAny = self
            .execute(PATH, self.request(Method::PUT, PATH).json(&body))
            .await?;
        Ok(())
    }

    /// Revoke one session. Returns false if the core did not know the handle.
    pub async fn revoke_session(&self, session_handle: &str) -> Result<bool, SessionError> {
        let revoked = self
            .revoke_multiple_sessions(&[session_handle.to_string()])
            .await?;
        Ok(revoked.iter().any(|handle| handle == session_handle))
    }

    pub async fn revoke_multiple_sessions(
        &self,
        session_handles: &[String],
    ) -> Result<Vec<String>, SessionError> {
        self.remove(RemoveRequest {
            session_handles: Some(session_handles),
            user_id: None,
        })
        .await
    }

    pub async fn revoke_all_sessions_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<String>, SessionError> {
        self.remove(RemoveRequest {
            session_handles: None,
            user_id: Some(user_id),
        })
        .await
    }

    async fn remove(&self, body: RemoveRequest<'_>) -> Result<Vec<String>, SessionError> {
        const PATH: &str = "/recipe/session/remove";
        let revoked: RevokedHandles = self
            .execute(PATH, self.request(Method::POST, PATH).json(&body))
            .await?;
        Ok(revoked.session_handles_revoked)
    }

    pub async fn get_all_session_handles_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<String>, SessionError> {
        const PATH: &str = "/recipe/session/user";
        let handles: SessionHandles = self
            .execute(
                PATH,
                self.request(Method::GET, PATH).query(&[("userId", user_id)]),
            )
            .await?;
        Ok(handles.session_handles)
    }

    /// Fetch the current signing key material.
    pub async fn handshake(&self) -> Result<HandshakeInfo, SessionError> {
        const PATH: &str = "/recipe/handshake";
        self.execute(PATH, self.request(Method::POST, PATH).json(&serde_json::json!({})))
            .await
    }
}
