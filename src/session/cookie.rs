//! Cookie and header names, parsing and `Set-Cookie` formatting.

use axum::http::{HeaderMap, header};

use crate::config::SessionConfig;

/// Cookie carrying the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "sAccessToken";

/// Cookie carrying the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "sRefreshToken";

/// Cookie letting the front end detect that a session exists.
pub const ID_REFRESH_TOKEN_COOKIE: &str = "sIdRefreshToken";

/// Request and response header carrying the anti-CSRF token.
pub const ANTI_CSRF_HEADER: &str = "anti-csrf";

/// Response header with non-sensitive session metadata for the front end.
pub const FRONT_TOKEN_HEADER: &str = "front-token";

/// Response header mirroring the id refresh token cookie.
pub const ID_REFRESH_TOKEN_HEADER: &str = "id-refresh-token";

/// Request header front-end SDKs send to identify the recipe.
pub const RID_HEADER: &str = "rid";

/// Value of the front token and id refresh token headers when the session ends.
pub const REMOVE_HEADER_VALUE: &str = "remove";

const EXPIRED_DATE: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = cookie_header.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                if key.trim() == name {
                    let value = value.trim();
                    if value.is_empty() {
                        return None;
                    }
                    return Some(value);
                }
            }
        }
    }
    None
}

/// Extract a non-empty request header value.
pub fn get_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn attributes(config: &SessionConfig, path: &str) -> String {
    let mut attrs = format!(
        "Path={}; HttpOnly; SameSite={}",
        path,
        config.cookie_same_site.as_str()
    );
    if let Some(domain) = &config.cookie_domain {
        attrs.push_str("; Domain=");
        attrs.push_str(domain);
    }
    if config.cookie_secure {
        attrs.push_str("; Secure");
    }
    attrs
}

/// `Set-Cookie` value for a token expiring at `expires_at` (Unix ms).
pub fn session_cookie(
    config: &SessionConfig,
    name: &str,
    value: &str,
    path: &str,
    expires_at: u64,
    now_ms: u64,
) -> String {
    let max_age = expires_at.saturating_sub(now_ms) / 1000;
    format!(
        "{}={}; {}; Max-Age={}",
        name,
        value,
        attributes(config, path),
        max_age
    )
}

/// `Set-Cookie` value removing a cookie: empty value with a past expiry.
pub fn clear_cookie(config: &SessionConfig, name: &str, path: &str) -> String {
    format!(
        "{}=; {}; Expires={}; Max-Age=0",
        name,
        attributes(config, path),
        EXPIRED_DATE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SameSite;
    use axum::http::HeaderValue;
    use url::Url;

    fn config() -> SessionConfig {
        SessionConfig::new(Url::parse("http://localhost:3567").unwrap())
    }

    #[test]
    fn test_get_cookie_simple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("sAccessToken=abc123"),
        );

        assert_eq!(get_cookie(&headers, ACCESS_TOKEN_COOKIE), Some("abc123"));
    }

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; sAccessToken=abc123; sRefreshToken=xyz789"),
        );

        assert_eq!(get_cookie(&headers, ACCESS_TOKEN_COOKIE), Some("abc123"));
        assert_eq!(get_cookie(&headers, REFRESH_TOKEN_COOKIE), Some("xyz789"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
    }

    #[test]
    fn test_get_cookie_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("foo=bar"));
        headers.append(
            header::COOKIE,
            HeaderValue::from_static("sRefreshToken=xyz789"),
        );

        assert_eq!(get_cookie(&headers, REFRESH_TOKEN_COOKIE), Some("xyz789"));
    }

    #[test]
    fn test_get_cookie_not_found() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("foo=bar"));

        assert_eq!(get_cookie(&headers, ACCESS_TOKEN_COOKIE), None);
    }

    #[test]
    fn test_get_cookie_no_header() {
        let headers = HeaderMap::new();
        assert_eq!(get_cookie(&headers, ACCESS_TOKEN_COOKIE), None);
    }

    #[test]
    fn test_get_cookie_with_spaces() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("  sAccessToken = abc123  ; foo=bar"),
        );

        assert_eq!(get_cookie(&headers, ACCESS_TOKEN_COOKIE), Some("abc123"));
    }

    #[test]
    fn test_get_cookie_empty_value_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("sAccessToken="));

        assert_eq!(get_cookie(&headers, ACCESS_TOKEN_COOKIE), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let mut config = config();
        config.cookie_domain = Some("example.com".to_string());
        config.cookie_secure = true;
        config.cookie_same_site = SameSite::None;

        let cookie = session_cookie(&config, ACCESS_TOKEN_COOKIE, "tok", "/", 61_500, 1_000);
        assert_eq!(
            cookie,
            "sAccessToken=tok; Path=/; HttpOnly; SameSite=None; Domain=example.com; Secure; Max-Age=60"
        );
    }

    #[test]
    fn test_session_cookie_in_the_past_has_zero_max_age() {
        let cookie = session_cookie(&config(), ACCESS_TOKEN_COOKIE, "tok", "/", 1_000, 5_000);
        assert!(cookie.ends_with("Max-Age=0"));
    }

    #[test]
    fn test_clear_cookie() {
        let cookie = clear_cookie(&config(), REFRESH_TOKEN_COOKIE, "/");
        assert_eq!(
            cookie,
            "sRefreshToken=; Path=/; HttpOnly; SameSite=Lax; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0"
        );
    }
}
