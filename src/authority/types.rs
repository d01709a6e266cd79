//! Request and response bodies exchanged with the core service.

use serde::{Deserialize, Serialize};

use crate::JsonMap;

/// A token value and its lifetime, as issued by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub token: String,
    /// Unix milliseconds
    pub expiry: u64,
    /// Unix milliseconds
    #[serde(default)]
    pub created_time: u64,
}

/// Session identity returned alongside issued tokens.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub handle: String,
    pub user_id: String,
    #[serde(default, rename = "userDataInJWT")]
    pub user_data_in_jwt: JsonMap,
}

/// Signing key material the core may attach to any session response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningKeyMaterial {
    #[serde(default)]
    pub jwt_signing_public_key: Option<String>,
    #[serde(default)]
    pub jwt_signing_public_key_expiry_time: Option<u64>,
}

/// Full token set issued on session creation and on refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub session: SessionSummary,
    pub access_token: TokenInfo,
    pub refresh_token: TokenInfo,
    pub id_refresh_token: TokenInfo,
    #[serde(default)]
    pub anti_csrf_token: Option<String>,
    #[serde(flatten)]
    pub signing: SigningKeyMaterial,
}

/// Result of a successful verification. The core may rotate the access token
/// when the payload changed since it was issued.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedSession {
    pub session: SessionSummary,
    #[serde(default)]
    pub access_token: Option<TokenInfo>,
    #[serde(flatten)]
    pub signing: SigningKeyMaterial,
}

/// Result of regenerating an access token with a new payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegeneratedSession {
    pub session: SessionSummary,
    #[serde(default)]
    pub access_token: Option<TokenInfo>,
}

/// Authoritative session record.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInformation {
    pub session_handle: String,
    pub user_id: String,
    pub session_data: JsonMap,
    pub user_data_in_jwt: JsonMap,
    /// Unix milliseconds
    pub time_created: u64,
    /// Unix milliseconds
    pub expiry: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SessionInformationBody {
    pub user_id: String,
    #[serde(default)]
    pub session_data: JsonMap,
    #[serde(default, rename = "userDataInJWT")]
    pub user_data_in_jwt: JsonMap,
    pub time_created: u64,
    pub expiry: u64,
}

/// Key material returned by the handshake call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeInfo {
    pub jwt_signing_public_key: String,
    pub jwt_signing_public_key_expiry_time: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RevokedHandles {
    pub session_handles_revoked: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SessionHandles {
    pub session_handles: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateRequest<'a> {
    pub user_id: &'a str,
    #[serde(rename = "userDataInJWT")]
    pub user_data_in_jwt: &'a JsonMap,
    pub session_data: &'a JsonMap,
    pub enable_anti_csrf: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct VerifyRequest<'a> {
    pub access_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anti_csrf_token: Option<&'a str>,
    pub do_anti_csrf_check: bool,
    pub enable_anti_csrf: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anti_csrf_token: Option<&'a str>,
    pub enable_anti_csrf: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RegenerateRequest<'a> {
    pub access_token: &'a str,
    #[serde(rename = "userDataInJWT")]
    pub user_data_in_jwt: &'a JsonMap,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SessionDataRequest<'a> {
    pub session_handle: &'a str,
    pub session_data: &'a JsonMap,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct JwtDataRequest<'a> {
    pub session_handle: &'a str,
    #[serde(rename = "userDataInJWT")]
    pub user_data_in_jwt: &'a JsonMap,
}

/// Revocation is either by explicit handles or by user; exactly one is set.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RemoveRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_handles: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<&'a str>,
}
