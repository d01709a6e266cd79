//! Session verification and refresh.
//!
//! A request moves through `NoToken`, `ValidatingAccess` and `NeedsRefresh`
//! until it ends authenticated, without a session, or with an error. Every
//! terminal auth failure clears the session cookies on the pending response.
//! Transport failures leave the response untouched.

use axum::http::{HeaderMap, Method};

use super::container::SessionContainer;
use super::cookie::{
    ACCESS_TOKEN_COOKIE, ANTI_CSRF_HEADER, REFRESH_TOKEN_COOKIE, get_cookie, get_header,
};
use super::errors::{ErrorKind, SessionError};
use super::response::{
    PendingHeaders, attach_access_token, attach_session_tokens, clear_session, set_front_token,
};
use crate::authority::SessionSummary;
use crate::recipe::SessionRecipe;
use crate::token::{
    AccessTokenPayload, TokenError, decode_access_token, now_millis, verify_signature,
};

/// Per-call verification switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Without a session the call fails instead of yielding `None`
    pub session_required: bool,
    /// Force the anti-CSRF check on or off. By default it runs for every
    /// method except GET, HEAD and OPTIONS.
    pub anti_csrf_check: Option<bool>,
}

impl VerifyOptions {
    pub fn required() -> Self {
        Self {
            session_required: true,
            anti_csrf_check: None,
        }
    }

    pub fn optional() -> Self {
        Self {
            session_required: false,
            anti_csrf_check: None,
        }
    }

    pub fn with_anti_csrf_check(mut self, check: bool) -> Self {
        self.anti_csrf_check = Some(check);
        self
    }
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self::required()
    }
}

enum Step<'a> {
    NoToken,
    ValidatingAccess(&'a str),
    /// Carries the payload of the rejected access token when it was readable
    NeedsRefresh(Option<AccessTokenPayload>),
}

/// Session-bearing parts of one request.
struct Credentials<'a> {
    access_token: Option<&'a str>,
    refresh_token: Option<&'a str>,
    anti_csrf: Option<&'a str>,
}

impl<'a> Credentials<'a> {
    fn from_headers(headers: &'a HeaderMap) -> Self {
        Self {
            access_token: get_cookie(headers, ACCESS_TOKEN_COOKIE),
            refresh_token: get_cookie(headers, REFRESH_TOKEN_COOKIE),
            anti_csrf: get_header(headers, ANTI_CSRF_HEADER),
        }
    }
}

fn anti_csrf_mismatch() -> SessionError {
    SessionError::unauthorised("anti-csrf check failed")
}

impl SessionRecipe {
    /// Verify the session carried by a request.
    ///
    /// Expired access tokens are exchanged inline when a refresh token is
    /// present; the new tokens are recorded on `pending`. Returns `Ok(None)`
    /// when no session is present and `options.session_required` is false.
    pub async fn get_session(
        &self,
        headers: &HeaderMap,
        method: &Method,
        pending: &PendingHeaders,
        options: VerifyOptions,
    ) -> Result<Option<SessionContainer>, SessionError> {
        let credentials = Credentials::from_headers(headers);
        let check_anti_csrf = self.anti_csrf_required(method, &options);

        let outcome = self
            .run(&credentials, check_anti_csrf, pending, &options)
            .await;
        match self.settle(outcome, pending) {
            // Theft and transport failures surface even for optional sessions.
            Err(e)
                if !options.session_required
                    && !matches!(
                        e.kind(),
                        ErrorKind::TokenTheftDetected | ErrorKind::Transport
                    ) =>
            {
                tracing::debug!(error = %e, "Continuing without session");
                Ok(None)
            }
            other => other,
        }
    }

    /// Exchange the refresh token carried by a request for a new token set.
    pub async fn refresh_session(
        &self,
        headers: &HeaderMap,
        pending: &PendingHeaders,
    ) -> Result<SessionContainer, SessionError> {
        let credentials = Credentials::from_headers(headers);

        let outcome = match credentials.refresh_token {
            Some(refresh_token) => {
                // The stale access token, expired or not, pins the anti-CSRF value.
                let stale = credentials.access_token.and_then(|raw| {
                    match decode_access_token(raw, now_millis()) {
                        Ok(payload) => Some(payload),
                        Err(TokenError::Expired(payload)) => Some(*payload),
                        Err(_) => None,
                    }
                });
                self.exchange_refresh_token(
                    refresh_token,
                    stale.as_ref(),
                    credentials.anti_csrf,
                    self.config().anti_csrf.enabled(),
                    pending,
                )
                .await
            }
            None => Err(SessionError::unauthorised("refresh token missing")),
        };

        self.settle(outcome, pending)
    }

    async fn run(
        &self,
        credentials: &Credentials<'_>,
        check_anti_csrf: bool,
        pending: &PendingHeaders,
        options: &VerifyOptions,
    ) -> Result<Option<SessionContainer>, SessionError> {
        let mut step = match (credentials.access_token, credentials.refresh_token) {
            (Some(access_token), _) => Step::ValidatingAccess(access_token),
            (None, Some(_)) => Step::NeedsRefresh(None),
            (None, None) => Step::NoToken,
        };

        loop {
            step = match step {
                Step::NoToken => {
                    if options.session_required {
                        return Err(SessionError::unauthorised("no session tokens in request"));
                    }
                    return Ok(None);
                }
                Step::ValidatingAccess(raw) => match decode_access_token(raw, now_millis()) {
                    Ok(payload) => {
                        match self
                            .validate_access_token(
                                raw,
                                &payload,
                                credentials.anti_csrf,
                                check_anti_csrf,
                                pending,
                            )
                            .await
                        {
                            Err(e)
                                if e.kind() == ErrorKind::TryRefreshToken
                                    && credentials.refresh_token.is_some() =>
                            {
                                Step::NeedsRefresh(Some(payload))
                            }
                            Err(SessionError::TryRefreshToken { message }) => {
                                return Err(SessionError::Unauthorised { message });
                            }
                            other => return other.map(Some),
                        }
                    }
                    Err(TokenError::Expired(payload)) if credentials.refresh_token.is_some() => {
                        Step::NeedsRefresh(Some(*payload))
                    }
                    Err(TokenError::Malformed(_)) if credentials.refresh_token.is_some() => {
                        Step::NeedsRefresh(None)
                    }
                    Err(e) => return Err(SessionError::unauthorised(e.to_string())),
                },
                Step::NeedsRefresh(stale) => {
                    let Some(refresh_token) = credentials.refresh_token else {
                        return Err(SessionError::unauthorised("refresh token missing"));
                    };
                    return self
                        .exchange_refresh_token(
                            refresh_token,
                            stale.as_ref(),
                            credentials.anti_csrf,
                            check_anti_csrf,
                            pending,
                        )
                        .await
                        .map(Some);
                }
            };
        }
    }

    /// Check a decoded, unexpired access token.
    async fn validate_access_token(
        &self,
        raw: &str,
        payload: &AccessTokenPayload,
        anti_csrf: Option<&str>,
        check_anti_csrf: bool,
        pending: &PendingHeaders,
    ) -> Result<SessionContainer, SessionError> {
        if check_anti_csrf {
            if let Some(expected) = payload.anti_csrf_token.as_deref() {
                if anti_csrf != Some(expected) {
                    return Err(anti_csrf_mismatch());
                }
            }
        }

        if self.config().local_verification {
            if let Some(key) = self.keys().current(now_millis()) {
                // Tokens signed with a newer key than the cached one fail here too.
                verify_signature(raw, key.decoding_key()).map_err(|e| {
                    SessionError::TryRefreshToken {
                        message: e.to_string(),
                    }
                })?;
                return Ok(SessionContainer::new(
                    self.clone(),
                    pending.clone(),
                    SessionSummary {
                        handle: payload.session_handle.clone(),
                        user_id: payload.user_id.clone(),
                        user_data_in_jwt: payload.user_data.clone(),
                    },
                    raw.to_string(),
                ));
            }
        }

        let verified = self
            .authority()
            .verify_session(
                raw,
                anti_csrf,
                check_anti_csrf,
                self.config().anti_csrf.enabled(),
            )
            .await?;
        self.remember_key(&verified.signing);

        let access_token = match verified.access_token {
            Some(token) => {
                tracing::debug!(
                    session_handle = %verified.session.handle,
                    "Core reissued access token"
                );
                attach_access_token(self.config(), pending, &token);
                set_front_token(
                    pending,
                    &verified.session.user_id,
                    token.expiry,
                    &verified.session.user_data_in_jwt,
                );
                token.token
            }
            None => raw.to_string(),
        };

        Ok(SessionContainer::new(
            self.clone(),
            pending.clone(),
            verified.session,
            access_token,
        ))
    }

    /// Trade a refresh token for a new token set.
    ///
    /// `stale` is the payload of the access token sent alongside, if any.
    async fn exchange_refresh_token(
        &self,
        refresh_token: &str,
        stale: Option<&AccessTokenPayload>,
        anti_csrf: Option<&str>,
        check_anti_csrf: bool,
        pending: &PendingHeaders,
    ) -> Result<SessionContainer, SessionError> {
        if check_anti_csrf {
            match stale {
                Some(payload) => {
                    if let Some(expected) = payload.anti_csrf_token.as_deref() {
                        if anti_csrf != Some(expected) {
                            return Err(anti_csrf_mismatch());
                        }
                    }
                }
                None if anti_csrf.is_none() => {
                    return Err(SessionError::unauthorised("anti-csrf header missing"));
                }
                None => {}
            }
        }

        let tokens = match self
            .authority()
            .refresh_session(refresh_token, anti_csrf, self.config().anti_csrf.enabled())
            .await
        {
            Ok(tokens) => tokens,
            Err(SessionError::TokenTheftDetected {
                session_handle,
                user_id,
            }) => {
                tracing::warn!(
                    session_handle = %session_handle,
                    user_id = %user_id,
                    "Refresh token reuse detected, revoking session"
                );
                if !session_handle.is_empty() {
                    if let Err(e) = self.authority().revoke_session(&session_handle).await {
                        tracing::warn!(
                            session_handle = %session_handle,
                            error = %e,
                            "Failed to revoke stolen session"
                        );
                    }
                }
                return Err(SessionError::TokenTheftDetected {
                    session_handle,
                    user_id,
                });
            }
            Err(e) => return Err(e),
        };

        self.remember_key(&tokens.signing);
        attach_session_tokens(self.config(), pending, &tokens);
        tracing::debug!(session_handle = %tokens.session.handle, "Refreshed session");

        Ok(SessionContainer::new(
            self.clone(),
            pending.clone(),
            tokens.session,
            tokens.access_token.token,
        ))
    }

    /// Clear cookies for every outcome that ends the session client-side.
    fn settle<T>(
        &self,
        outcome: Result<T, SessionError>,
        pending: &PendingHeaders,
    ) -> Result<T, SessionError> {
        if let Err(e) = &outcome {
            if e.clears_session() {
                clear_session(self.config(), pending);
            }
        }
        outcome
    }

    fn anti_csrf_required(&self, method: &Method, options: &VerifyOptions) -> bool {
        if !self.config().anti_csrf.enabled() {
            return false;
        }
        options.anti_csrf_check.unwrap_or_else(|| {
            !(method == Method::GET || method == Method::HEAD || method == Method::OPTIONS)
        })
    }
}
