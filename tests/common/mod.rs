#![allow(dead_code)]

//! In-process stand-in for the session core, plus helpers for driving the
//! app with `tower::ServiceExt::oneshot`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, Request, State},
    http::{Response, StatusCode, header},
    middleware::{self, Next},
    response::IntoResponse,
    routing::{get, post, put},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};
use sessionward::token::{
    AccessTokenPayload, SigningKey, TokenError, decode_access_token, now_millis, verify_signature,
};
use sessionward::{JsonMap, SessionConfig, SessionRecipe};
use tokio::net::TcpListener;
use url::Url;

const PRIVATE_KEY: &[u8] = include_bytes!("../fixtures/signing_private.pem");
const PUBLIC_KEY: &str = include_str!("../fixtures/signing_public.pem");

/// 2100-01-01
const KEY_EXPIRY: u64 = 4_102_444_800_000;
const REFRESH_TTL_MS: u64 = 100 * 24 * 3_600_000;
const DEFAULT_ACCESS_TTL_MS: i64 = 3_600_000;

struct StoredSession {
    user_id: String,
    session_data: JsonMap,
    jwt_payload: JsonMap,
    anti_csrf: Option<String>,
    refresh_token: String,
    time_created: u64,
}

#[derive(Default)]
struct Store {
    sessions: HashMap<String, StoredSession>,
    /// Every refresh token ever issued, mapped to its session handle
    refresh_tokens: HashMap<String, String>,
}

pub struct CoreState {
    store: Mutex<Store>,
    calls: Mutex<HashMap<String, usize>>,
    access_ttl_ms: AtomicI64,
    failing: AtomicBool,
    signing_key: EncodingKey,
}

/// A running fake core.
pub struct FakeCore {
    pub url: String,
    state: Arc<CoreState>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for FakeCore {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakeCore {
    pub async fn start() -> Self {
        let state = Arc::new(CoreState {
            store: Mutex::new(Store::default()),
            calls: Mutex::new(HashMap::new()),
            access_ttl_ms: AtomicI64::new(DEFAULT_ACCESS_TTL_MS),
            failing: AtomicBool::new(false),
            signing_key: EncodingKey::from_rsa_pem(PRIVATE_KEY).unwrap(),
        });

        let app = Router::new()
            .route("/recipe/session", post(create).get(information))
            .route("/recipe/session/verify", post(verify))
            .route("/recipe/session/refresh", post(refresh))
            .route("/recipe/session/regenerate", post(regenerate))
            .route("/recipe/session/data", put(update_session_data))
            .route("/recipe/jwt/data", put(update_jwt_data))
            .route("/recipe/session/remove", post(remove))
            .route("/recipe/session/user", get(handles_for_user))
            .route("/recipe/handshake", post(handshake))
            .layer(middleware::from_fn_with_state(state.clone(), count_and_fail))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            url: format!("http://{}", addr),
            state,
            handle,
        }
    }

    pub fn config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(Url::parse(&self.url).unwrap());
        config.api_key = Some("test-api-key".to_string());
        config
    }

    pub fn recipe(&self) -> SessionRecipe {
        SessionRecipe::new(self.config()).unwrap()
    }

    pub fn recipe_with(&self, configure: impl FnOnce(&mut SessionConfig)) -> SessionRecipe {
        let mut config = self.config();
        configure(&mut config);
        SessionRecipe::new(config).unwrap()
    }

    /// Number of requests the core received for `path`.
    pub fn calls(&self, path: &str) -> usize {
        self.state
            .calls
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.calls.lock().unwrap().values().sum()
    }

    /// Lifetime of access tokens issued from now on. Negative values issue
    /// tokens that are already expired.
    pub fn set_access_ttl_ms(&self, ttl: i64) {
        self.state.access_ttl_ms.store(ttl, Ordering::SeqCst);
    }

    /// Answer every request with HTTP 500.
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    pub fn session_exists(&self, handle: &str) -> bool {
        self.state.store.lock().unwrap().sessions.contains_key(handle)
    }

    /// Issue an access token for an existing session, signed like the core does.
    pub fn mint_access_token(&self, handle: &str, ttl_ms: i64) -> String {
        let store = self.state.store.lock().unwrap();
        let session = &store.sessions[handle];
        let payload = AccessTokenPayload {
            session_handle: handle.to_string(),
            user_id: session.user_id.clone(),
            user_data: session.jwt_payload.clone(),
            anti_csrf_token: session.anti_csrf.clone(),
            expiry_time: expiry_after(ttl_ms),
            time_created: now_millis(),
        };
        sign(&self.state.signing_key, &payload)
    }
}

async fn count_and_fail(
    State(state): State<Arc<CoreState>>,
    request: Request,
    next: Next,
) -> axum::response::Response {
    *state
        .calls
        .lock()
        .unwrap()
        .entry(request.uri().path().to_string())
        .or_default() += 1;

    if state.failing.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "core unavailable").into_response();
    }

    next.run(request).await
}

fn expiry_after(ttl_ms: i64) -> u64 {
    (now_millis() as i64 + ttl_ms).max(1) as u64
}

fn sign(key: &EncodingKey, payload: &AccessTokenPayload) -> String {
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), payload, key).unwrap()
}

/// The SPKI body without PEM armour, as the core sends it.
pub fn public_key_material() -> String {
    PUBLIC_KEY
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect()
}

fn with_key(mut body: Value) -> Value {
    body["jwtSigningPublicKey"] = json!(public_key_material());
    body["jwtSigningPublicKeyExpiryTime"] = json!(KEY_EXPIRY);
    body
}

fn ok(mut body: Value) -> Json<Value> {
    body["status"] = json!("OK");
    Json(body)
}

fn status(status: &str) -> Json<Value> {
    Json(json!({ "status": status }))
}

fn token_info(token: &str, expiry: u64) -> Value {
    json!({ "token": token, "expiry": expiry, "createdTime": now_millis() })
}

fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn as_map(value: &Value) -> JsonMap {
    value.as_object().cloned().unwrap_or_default()
}

impl CoreState {
    fn access_token_for(&self, handle: &str, session: &StoredSession) -> Value {
        let expiry = expiry_after(self.access_ttl_ms.load(Ordering::SeqCst));
        let payload = AccessTokenPayload {
            session_handle: handle.to_string(),
            user_id: session.user_id.clone(),
            user_data: session.jwt_payload.clone(),
            anti_csrf_token: session.anti_csrf.clone(),
            expiry_time: expiry,
            time_created: now_millis(),
        };
        token_info(&sign(&self.signing_key, &payload), expiry)
    }

    fn issue(&self, handle: &str, session: &StoredSession) -> Value {
        let refresh_expiry = now_millis() + REFRESH_TTL_MS;
        let mut body = json!({
            "session": {
                "handle": handle,
                "userId": session.user_id,
                "userDataInJWT": session.jwt_payload,
            },
            "accessToken": self.access_token_for(handle, session),
            "refreshToken": token_info(&session.refresh_token, refresh_expiry),
            "idRefreshToken": token_info(&new_token(), refresh_expiry),
        });
        if let Some(anti_csrf) = &session.anti_csrf {
            body["antiCsrfToken"] = json!(anti_csrf);
        }
        with_key(body)
    }
}

fn summary(handle: &str, session: &StoredSession) -> Value {
    json!({
        "handle": handle,
        "userId": session.user_id,
        "userDataInJWT": session.jwt_payload,
    })
}

async fn create(State(state): State<Arc<CoreState>>, Json(body): Json<Value>) -> Json<Value> {
    let handle = uuid::Uuid::new_v4().to_string();
    let session = StoredSession {
        user_id: body["userId"].as_str().unwrap_or_default().to_string(),
        session_data: as_map(&body["sessionData"]),
        jwt_payload: as_map(&body["userDataInJWT"]),
        anti_csrf: body["enableAntiCsrf"]
            .as_bool()
            .unwrap_or(false)
            .then(new_token),
        refresh_token: new_token(),
        time_created: now_millis(),
    };

    let response = state.issue(&handle, &session);
    let mut store = state.store.lock().unwrap();
    store
        .refresh_tokens
        .insert(session.refresh_token.clone(), handle.clone());
    store.sessions.insert(handle, session);
    ok(response)
}

fn payload_of(token: &str) -> Result<AccessTokenPayload, TokenError> {
    match decode_access_token(token, 0) {
        Ok(payload) => Ok(payload),
        Err(TokenError::Expired(payload)) => Ok(*payload),
        Err(e) => Err(e),
    }
}

fn signed_by_core(token: &str) -> bool {
    let key = SigningKey::from_core(PUBLIC_KEY, u64::MAX).unwrap();
    verify_signature(token, key.decoding_key()).is_ok()
}

async fn verify(State(state): State<Arc<CoreState>>, Json(body): Json<Value>) -> Json<Value> {
    let token = body["accessToken"].as_str().unwrap_or_default();
    let Ok(payload) = payload_of(token) else {
        return status("UNAUTHORISED");
    };
    if !signed_by_core(token) {
        return status("TRY_REFRESH_TOKEN");
    }
    if payload.expiry_time <= now_millis() {
        return status("TRY_REFRESH_TOKEN");
    }

    let store = state.store.lock().unwrap();
    let Some(session) = store.sessions.get(&payload.session_handle) else {
        return status("UNAUTHORISED");
    };

    if body["doAntiCsrfCheck"].as_bool().unwrap_or(false) {
        if let Some(expected) = &payload.anti_csrf_token {
            if body["antiCsrfToken"].as_str() != Some(expected.as_str()) {
                return status("TRY_REFRESH_TOKEN");
            }
        }
    }

    let mut response = json!({ "session": summary(&payload.session_handle, session) });
    // The payload changed since this token was issued.
    if session.jwt_payload != payload.user_data {
        response["accessToken"] = state.access_token_for(&payload.session_handle, session);
    }
    ok(with_key(response))
}

async fn refresh(State(state): State<Arc<CoreState>>, Json(body): Json<Value>) -> Json<Value> {
    let refresh_token = body["refreshToken"].as_str().unwrap_or_default();

    let mut store = state.store.lock().unwrap();
    let Some(handle) = store.refresh_tokens.get(refresh_token).cloned() else {
        return status("UNAUTHORISED");
    };
    let Some(session) = store.sessions.get_mut(&handle) else {
        return status("UNAUTHORISED");
    };

    if session.refresh_token != refresh_token {
        let user_id = session.user_id.clone();
        store.sessions.remove(&handle);
        return Json(json!({
            "status": "TOKEN_THEFT_DETECTED",
            "session": { "handle": handle, "userId": user_id },
        }));
    }

    if body["enableAntiCsrf"].as_bool().unwrap_or(false) {
        if let Some(expected) = &session.anti_csrf {
            if body["antiCsrfToken"].as_str() != Some(expected.as_str()) {
                return status("UNAUTHORISED");
            }
        }
    }

    session.refresh_token = new_token();
    let new_refresh = session.refresh_token.clone();
    let response = state.issue(&handle, session);
    store.refresh_tokens.insert(new_refresh, handle);
    ok(response)
}

async fn regenerate(State(state): State<Arc<CoreState>>, Json(body): Json<Value>) -> Json<Value> {
    let Ok(payload) = payload_of(body["accessToken"].as_str().unwrap_or_default()) else {
        return status("UNAUTHORISED");
    };

    let mut store = state.store.lock().unwrap();
    let Some(session) = store.sessions.get_mut(&payload.session_handle) else {
        return status("UNAUTHORISED");
    };
    session.jwt_payload = as_map(&body["userDataInJWT"]);

    ok(json!({
        "session": summary(&payload.session_handle, session),
        "accessToken": state.access_token_for(&payload.session_handle, session),
    }))
}

async fn information(
    State(state): State<Arc<CoreState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let handle = query.get("sessionHandle").cloned().unwrap_or_default();
    let store = state.store.lock().unwrap();
    let Some(session) = store.sessions.get(&handle) else {
        return status("UNAUTHORISED");
    };

    ok(json!({
        "userId": session.user_id,
        "sessionData": session.session_data,
        "userDataInJWT": session.jwt_payload,
        "timeCreated": session.time_created,
        "expiry": session.time_created + REFRESH_TTL_MS,
    }))
}

async fn update_session_data(
    State(state): State<Arc<CoreState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let handle = body["sessionHandle"].as_str().unwrap_or_default();
    let mut store = state.store.lock().unwrap();
    match store.sessions.get_mut(handle) {
        Some(session) => {
            session.session_data = as_map(&body["sessionData"]);
            status("OK")
        }
        None => status("UNAUTHORISED"),
    }
}

async fn update_jwt_data(
    State(state): State<Arc<CoreState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let handle = body["sessionHandle"].as_str().unwrap_or_default();
    let mut store = state.store.lock().unwrap();
    match store.sessions.get_mut(handle) {
        Some(session) => {
            session.jwt_payload = as_map(&body["userDataInJWT"]);
            status("OK")
        }
        None => status("UNAUTHORISED"),
    }
}

async fn remove(State(state): State<Arc<CoreState>>, Json(body): Json<Value>) -> Json<Value> {
    let mut store = state.store.lock().unwrap();

    let targets: Vec<String> = match (body["sessionHandles"].as_array(), body["userId"].as_str()) {
        (Some(handles), _) => handles
            .iter()
            .filter_map(|h| h.as_str().map(str::to_string))
            .collect(),
        (None, Some(user_id)) => store
            .sessions
            .iter()
            .filter(|(_, s)| s.user_id == user_id)
            .map(|(h, _)| h.clone())
            .collect(),
        (None, None) => Vec::new(),
    };

    let mut revoked: Vec<String> = targets
        .into_iter()
        .filter(|handle| store.sessions.remove(handle).is_some())
        .collect();
    revoked.sort();

    ok(json!({ "sessionHandlesRevoked": revoked }))
}

async fn handles_for_user(
    State(state): State<Arc<CoreState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let user_id = query.get("userId").cloned().unwrap_or_default();
    let store = state.store.lock().unwrap();
    let mut handles: Vec<&String> = store
        .sessions
        .iter()
        .filter(|(_, s)| s.user_id == user_id)
        .map(|(h, _)| h)
        .collect();
    handles.sort();

    ok(json!({ "sessionHandles": handles }))
}

async fn handshake() -> Json<Value> {
    ok(json!({
        "jwtSigningPublicKey": public_key_material(),
        "jwtSigningPublicKeyExpiryTime": KEY_EXPIRY,
    }))
}

// =============================================================================
// Response helpers
// =============================================================================

/// All `Set-Cookie` values on a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// The value a response sets for cookie `name`, if it sets one.
pub fn cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    set_cookies(response).into_iter().find_map(|cookie| {
        let first = cookie.split(';').next()?;
        let (key, value) = first.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// Whether the response clears cookie `name`.
pub fn is_cleared(response: &Response<Body>, name: &str) -> bool {
    cookie_value(response, name).as_deref() == Some("")
        && set_cookies(response)
            .iter()
            .any(|c| c.starts_with(&format!("{}=;", name)) && c.contains("Max-Age=0"))
}

pub fn header_value(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn cookies(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}
