//! Access token decoding and signature verification.
//!
//! Access tokens are compact JWS values issued by the core service. Decoding
//! reads the payload without touching the network; signature checks need key
//! material the core handed out earlier and are optional.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::JsonMap;

/// Claims carried inside an access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenPayload {
    pub session_handle: String,
    pub user_id: String,
    /// Custom claims set by the application (`userDataInJWT` at the core)
    #[serde(default)]
    pub user_data: JsonMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_csrf_token: Option<String>,
    /// Expiry (Unix milliseconds)
    pub expiry_time: u64,
    /// Issue time (Unix milliseconds)
    pub time_created: u64,
}

/// Errors that can occur while decoding an access token.
#[derive(Debug)]
pub enum TokenError {
    /// The value is not a three-part token or the payload is unreadable
    Malformed(&'static str),
    /// The token decoded fine but its expiry has passed
    Expired(Box<AccessTokenPayload>),
    /// The signature does not match the key material
    InvalidSignature(jsonwebtoken::errors::Error),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed(reason) => write!(f, "Malformed access token: {}", reason),
            TokenError::Expired(payload) => {
                write!(f, "Access token expired at {}", payload.expiry_time)
            }
            TokenError::InvalidSignature(e) => write!(f, "Invalid token signature: {}", e),
        }
    }
}

impl std::error::Error for TokenError {}

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Decode an access token payload and check its expiry.
///
/// The signature is not checked here.
pub fn decode_access_token(raw: &str, now_ms: u64) -> Result<AccessTokenPayload, TokenError> {
    let mut parts = raw.split('.');
    let (Some(_header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed("expected three dot-separated parts"));
    };

    if payload.is_empty() || signature.is_empty() {
        return Err(TokenError::Malformed("empty payload or signature"));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::Malformed("payload is not base64url"))?;

    let payload: AccessTokenPayload = serde_json::from_slice(&bytes)
        .map_err(|_| TokenError::Malformed("payload is not a session claim set"))?;

    if payload.session_handle.is_empty() || payload.user_id.is_empty() {
        return Err(TokenError::Malformed("missing session handle or user id"));
    }

    if payload.expiry_time <= now_ms {
        return Err(TokenError::Expired(Box::new(payload)));
    }

    Ok(payload)
}

/// Verify the RS256 signature of an access token against a core-issued key.
pub fn verify_signature(raw: &str, key: &DecodingKey) -> Result<(), TokenError> {
    let mut validation = Validation::new(Algorithm::RS256);
    // Expiry is checked by `decode_access_token` against millisecond claims.
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation.leeway = 0;

    jsonwebtoken::decode::<AccessTokenPayload>(raw, key, &validation)
        .map(|_| ())
        .map_err(TokenError::InvalidSignature)
}

/// Public key handed out by the core for local signature checks.
pub struct SigningKey {
    key: DecodingKey,
    /// Unix milliseconds after which the key must not be trusted
    pub expires_at: u64,
}

impl SigningKey {
    /// Parse the key the core sends.
    ///
    /// The core sends the base64 body of an SPKI public key without PEM armour;
    /// full PEM documents are accepted as well.
    pub fn from_core(material: &str, expires_at: u64) -> Result<Self, TokenError> {
        let material = material.trim();
        let pem = if material.starts_with("-----BEGIN") {
            material.to_string()
        } else {
            let body: Vec<u8> = material
                .bytes()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            let lines: Vec<&str> = body
                .chunks(64)
                .filter_map(|line| std::str::from_utf8(line).ok())
                .collect();
            format!(
                "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n",
                lines.join("\n")
            )
        };
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|_| TokenError::Malformed("signing key is not an RSA public key"))?;
        Ok(Self { key, expires_at })
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

/// Most recent signing key seen in a core response.
#[derive(Default)]
pub struct SigningKeyCache {
    current: RwLock<Option<Arc<SigningKey>>>,
}

impl SigningKeyCache {
    /// Replace the cached key. Unparseable material is dropped with a warning.
    pub fn store(&self, material: &str, expires_at: u64) {
        match SigningKey::from_core(material, expires_at) {
            Ok(key) => {
                *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(key));
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring signing key from core"),
        }
    }

    /// The cached key, unless it has expired.
    pub fn current(&self, now_ms: u64) -> Option<Arc<SigningKey>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|key| key.expires_at > now_ms)
            .cloned()
    }
}
