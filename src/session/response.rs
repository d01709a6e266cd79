//! Response mutations recorded while a request is being verified.
//!
//! Verification runs before the handler produces a response, so cookie and
//! header changes are collected in a `PendingHeaders` shared by the
//! middleware, the session container and the handler, then written onto
//! whatever response comes out. The latest value per cookie or header wins.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use axum::response::{IntoResponseParts, ResponseParts};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;

use super::cookie::{
    ACCESS_TOKEN_COOKIE, ANTI_CSRF_HEADER, FRONT_TOKEN_HEADER, ID_REFRESH_TOKEN_COOKIE,
    ID_REFRESH_TOKEN_HEADER, REFRESH_TOKEN_COOKIE, REMOVE_HEADER_VALUE, clear_cookie,
    session_cookie,
};
use crate::JsonMap;
use crate::authority::{SessionTokens, TokenInfo};
use crate::config::SessionConfig;
use crate::token::now_millis;

#[derive(Debug, Default)]
struct Pending {
    /// Cookie name to full `Set-Cookie` value
    cookies: BTreeMap<String, String>,
    /// `None` removes the header from the response
    headers: BTreeMap<&'static str, Option<String>>,
}

/// Shared, request-scoped set of cookie and header changes.
#[derive(Debug, Clone, Default)]
pub struct PendingHeaders {
    inner: Arc<Mutex<Pending>>,
}

impl PendingHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_cookie(&self, name: &str, set_cookie: String) {
        self.lock().cookies.insert(name.to_string(), set_cookie);
    }

    pub fn set_header(&self, name: &'static str, value: String) {
        self.lock().headers.insert(name, Some(value));
    }

    pub fn remove_header(&self, name: &'static str) {
        self.lock().headers.insert(name, None);
    }

    /// The `Set-Cookie` value currently recorded for `name`.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.lock().cookies.get(name).cloned()
    }

    /// The value currently recorded for header `name`.
    pub fn header(&self, name: &str) -> Option<String> {
        self.lock().headers.get(name).cloned().flatten()
    }

    pub fn is_empty(&self) -> bool {
        let pending = self.lock();
        pending.cookies.is_empty() && pending.headers.is_empty()
    }

    /// Write the recorded changes into `headers` and forget them.
    pub fn apply(&self, headers: &mut HeaderMap) {
        let pending = std::mem::take(&mut *self.lock());

        for (name, set_cookie) in pending.cookies {
            match HeaderValue::from_str(&set_cookie) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(_) => tracing::warn!(cookie = %name, "Dropping unencodable cookie"),
            }
        }

        let mut exposed = Vec::new();
        for (name, value) in pending.headers {
            let header_name = HeaderName::from_static(name);
            match value {
                Some(value) => match HeaderValue::from_str(&value) {
                    Ok(value) => {
                        headers.insert(header_name, value);
                        exposed.push(name);
                    }
                    Err(_) => tracing::warn!(header = %name, "Dropping unencodable header"),
                },
                None => {
                    headers.remove(header_name);
                }
            }
        }

        if !exposed.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&exposed.join(", ")) {
                headers.append(header::ACCESS_CONTROL_EXPOSE_HEADERS, value);
            }
        }
    }
}

impl IntoResponseParts for PendingHeaders {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        self.apply(res.headers_mut());
        Ok(res)
    }
}

/// Non-sensitive session metadata readable by front-end code.
#[derive(Serialize)]
struct FrontToken<'a> {
    uid: &'a str,
    ate: u64,
    up: &'a JsonMap,
}

pub fn attach_access_token(config: &SessionConfig, pending: &PendingHeaders, token: &TokenInfo) {
    pending.set_cookie(
        ACCESS_TOKEN_COOKIE,
        session_cookie(
            config,
            ACCESS_TOKEN_COOKIE,
            &token.token,
            &config.access_token_path,
            token.expiry,
            now_millis(),
        ),
    );
}

pub fn attach_refresh_token(config: &SessionConfig, pending: &PendingHeaders, token: &TokenInfo) {
    pending.set_cookie(
        REFRESH_TOKEN_COOKIE,
        session_cookie(
            config,
            REFRESH_TOKEN_COOKIE,
            &token.token,
            &config.refresh_token_path,
            token.expiry,
            now_millis(),
        ),
    );
}

/// The id refresh token goes out as a cookie and as `token;expiry` in a header.
pub fn attach_id_refresh_token(
    config: &SessionConfig,
    pending: &PendingHeaders,
    token: &TokenInfo,
) {
    pending.set_cookie(
        ID_REFRESH_TOKEN_COOKIE,
        session_cookie(
            config,
            ID_REFRESH_TOKEN_COOKIE,
            &token.token,
            &config.access_token_path,
            token.expiry,
            now_millis(),
        ),
    );
    pending.set_header(
        ID_REFRESH_TOKEN_HEADER,
        format!("{};{}", token.token, token.expiry),
    );
}

pub fn set_anti_csrf(pending: &PendingHeaders, anti_csrf_token: &str) {
    pending.set_header(ANTI_CSRF_HEADER, anti_csrf_token.to_string());
}

pub fn set_front_token(
    pending: &PendingHeaders,
    user_id: &str,
    access_token_expiry: u64,
    payload: &JsonMap,
) {
    let front_token = FrontToken {
        uid: user_id,
        ate: access_token_expiry,
        up: payload,
    };
    match serde_json::to_vec(&front_token) {
        Ok(json) => pending.set_header(FRONT_TOKEN_HEADER, STANDARD.encode(json)),
        Err(e) => tracing::warn!(error = %e, "Failed to encode front token"),
    }
}

/// Record a freshly issued token set (session creation or refresh).
pub fn attach_session_tokens(
    config: &SessionConfig,
    pending: &PendingHeaders,
    tokens: &SessionTokens,
) {
    attach_access_token(config, pending, &tokens.access_token);
    attach_refresh_token(config, pending, &tokens.refresh_token);
    attach_id_refresh_token(config, pending, &tokens.id_refresh_token);
    set_front_token(
        pending,
        &tokens.session.user_id,
        tokens.access_token.expiry,
        &tokens.session.user_data_in_jwt,
    );
    match &tokens.anti_csrf_token {
        Some(anti_csrf_token) => set_anti_csrf(pending, anti_csrf_token),
        None => pending.remove_header(ANTI_CSRF_HEADER),
    }
}

/// Replace everything recorded for the session with removals.
pub fn clear_session(config: &SessionConfig, pending: &PendingHeaders) {
    pending.set_cookie(
        ACCESS_TOKEN_COOKIE,
        clear_cookie(config, ACCESS_TOKEN_COOKIE, &config.access_token_path),
    );
    pending.set_cookie(
        REFRESH_TOKEN_COOKIE,
        clear_cookie(config, REFRESH_TOKEN_COOKIE, &config.refresh_token_path),
    );
    pending.set_cookie(
        ID_REFRESH_TOKEN_COOKIE,
        clear_cookie(config, ID_REFRESH_TOKEN_COOKIE, &config.access_token_path),
    );
    pending.set_header(FRONT_TOKEN_HEADER, REMOVE_HEADER_VALUE.to_string());
    pending.set_header(ID_REFRESH_TOKEN_HEADER, REMOVE_HEADER_VALUE.to_string());
    pending.remove_header(ANTI_CSRF_HEADER);
}
