//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use clap::Parser;
use tracing::error;
use url::Url;

use crate::config::{AntiCsrf, SameSite, SessionConfig};

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sessionward",
    about = "Cookie sessions backed by a remote session core"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7291")]
    pub port: u16,

    /// Base URL of the session core
    #[arg(long, env = "SESSION_CONNECTION_URI", default_value = "http://localhost:3567")]
    pub connection_uri: String,

    /// API key for the session core. Prefer the environment variable
    #[arg(long, env = "SESSION_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Prefix for the refresh and sign-out routes
    #[arg(long, env = "SESSION_API_BASE_PATH", default_value = "/auth", value_parser = validate_base_path)]
    pub api_base_path: String,

    /// Domain attribute for session cookies
    #[arg(long, env = "SESSION_COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    /// Set the Secure flag on session cookies (required with --cookie-same-site none)
    #[arg(long, env = "SESSION_COOKIE_SECURE")]
    pub cookie_secure: bool,

    /// SameSite attribute for session cookies
    #[arg(long, env = "SESSION_COOKIE_SAME_SITE", default_value = "lax")]
    pub cookie_same_site: SameSite,

    /// Path of the refresh token cookie
    #[arg(long, env = "SESSION_REFRESH_TOKEN_PATH", default_value = "/", value_parser = validate_cookie_path)]
    pub refresh_token_path: String,

    /// Anti-CSRF mode. Defaults to via-token for SameSite=None, none otherwise
    #[arg(long, env = "SESSION_ANTI_CSRF")]
    pub anti_csrf: Option<AntiCsrf>,

    /// Verify access token signatures locally once the core has issued a key
    #[arg(long, env = "SESSION_LOCAL_VERIFICATION")]
    pub local_verification: bool,

    /// Timeout for establishing a connection to the core, in seconds
    #[arg(long, default_value = "5")]
    pub connect_timeout: u64,

    /// Timeout for a whole core request, in seconds
    #[arg(long, default_value = "10")]
    pub request_timeout: u64,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_base_path(s: &str) -> Result<String, String> {
    if !s.starts_with('/') {
        return Err(format!("Base path must start with '/': {}", s));
    }

    if s.len() > 1 && s.ends_with('/') {
        return Err(format!("Base path must not end with '/': {}", s));
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace()) {
        return Err(format!("Base path contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

fn validate_cookie_path(s: &str) -> Result<String, String> {
    if !s.starts_with('/') {
        return Err(format!("Cookie path must start with '/': {}", s));
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace() || c == ';') {
        return Err(format!("Cookie path contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Build SessionConfig from arguments.
/// Returns None and logs an error if the result is not usable.
pub fn build_config(args: &Args) -> Option<SessionConfig> {
    let connection_uri = match Url::parse(&args.connection_uri) {
        Ok(url) => url,
        Err(e) => {
            error!(uri = %args.connection_uri, error = %e, "Invalid connection URI");
            return None;
        }
    };

    let mut config = SessionConfig::new(connection_uri);
    config.api_key = args.api_key.clone();
    config.api_base_path = args.api_base_path.clone();
    config.cookie_domain = args.cookie_domain.clone();
    config.cookie_secure = args.cookie_secure;
    config.cookie_same_site = args.cookie_same_site;
    config.refresh_token_path = args.refresh_token_path.clone();
    config.anti_csrf = args
        .anti_csrf
        .unwrap_or_else(|| AntiCsrf::default_for(args.cookie_same_site));
    config.local_verification = args.local_verification;
    config.connect_timeout = Duration::from_secs(args.connect_timeout);
    config.request_timeout = Duration::from_secs(args.request_timeout);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid session configuration");
        return None;
    }

    Some(config)
}
