//! Session recipe configuration.
//!
//! Built once at startup (see `cli::build_config`) and shared by reference
//! through `SessionRecipe`. Nothing here is global.

use std::time::Duration;
use url::Url;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `SameSite` attribute for session cookies.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// How cross-site request forgery is prevented.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntiCsrf {
    /// Rely on `SameSite` cookies only
    None,
    /// Embed a token in the access token and require it in the `anti-csrf` header
    ViaToken,
}

impl AntiCsrf {
    /// Cross-site cookies need an explicit token; same-site cookies do not.
    pub fn default_for(same_site: SameSite) -> Self {
        match same_site {
            SameSite::None => AntiCsrf::ViaToken,
            SameSite::Strict | SameSite::Lax => AntiCsrf::None,
        }
    }

    pub fn enabled(&self) -> bool {
        matches!(self, AntiCsrf::ViaToken)
    }
}

/// Configuration errors reported at startup.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Invalid(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(key, reason) => {
                write!(f, "invalid configuration {}: {}", key, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the core service
    pub connection_uri: Url,
    /// Sent as `api-key` on every core request when set
    pub api_key: Option<String>,
    /// Prefix for the built-in refresh and sign-out routes (e.g. "/auth")
    pub api_base_path: String,
    pub cookie_domain: Option<String>,
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    pub access_token_path: String,
    /// Path of the refresh token cookie. Must cover every route behind the
    /// session middleware, since expired access tokens are refreshed inline.
    pub refresh_token_path: String,
    pub anti_csrf: AntiCsrf,
    /// Trust locally verified signatures instead of asking the core on every
    /// request. Revocations then only take effect once the access token expires.
    pub local_verification: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl SessionConfig {
    /// Configuration with the defaults for a core at `connection_uri`.
    pub fn new(connection_uri: Url) -> Self {
        let cookie_same_site = SameSite::default();
        Self {
            connection_uri,
            api_key: None,
            api_base_path: "/auth".to_string(),
            cookie_domain: None,
            cookie_secure: false,
            cookie_same_site,
            access_token_path: "/".to_string(),
            refresh_token_path: "/".to_string(),
            anti_csrf: AntiCsrf::default_for(cookie_same_site),
            local_verification: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    fn api_path(&self, route: &str) -> String {
        format!("{}{}", self.api_base_path.trim_end_matches('/'), route)
    }

    /// Path of the built-in refresh route.
    pub fn refresh_api_path(&self) -> String {
        self.api_path("/session/refresh")
    }

    /// Path of the built-in sign-out route.
    pub fn signout_api_path(&self) -> String {
        self.api_path("/signout")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.connection_uri.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(
                "connection_uri",
                format!("unsupported scheme {}", self.connection_uri.scheme()),
            ));
        }

        for (key, path) in [
            ("api_base_path", &self.api_base_path),
            ("access_token_path", &self.access_token_path),
            ("refresh_token_path", &self.refresh_token_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid(key, format!("must start with '/': {}", path)));
            }
        }

        if self.api_base_path.len() > 1 && self.api_base_path.ends_with('/') {
            return Err(ConfigError::Invalid(
                "api_base_path",
                format!("must not end with '/': {}", self.api_base_path),
            ));
        }

        if self.cookie_same_site == SameSite::None && !self.cookie_secure {
            return Err(ConfigError::Invalid(
                "cookie_same_site",
                "SameSite=None cookies must be Secure".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout",
                "must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
