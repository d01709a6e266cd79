//! Demo application wiring sessions into a small set of routes.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::JsonMap;
use crate::recipe::SessionRecipe;
use crate::session::{
    MaybeSession, PendingHeaders, Session, SessionError, VerifyOptions, require_session, routes,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    user_id: String,
    #[serde(default)]
    payload: Option<JsonMap>,
    #[serde(default)]
    session_data: Option<JsonMap>,
}

/// Create the application router.
///
/// `/login` starts a session. `/me/*` requires one. `/public` works with or
/// without. The refresh and sign-out routes live under the API base path.
pub fn create_app(recipe: SessionRecipe) -> Router {
    let protected = require_session(
        Router::new()
            .route("/me", get(me))
            .route("/me/payload", post(update_payload))
            .route("/me/data", get(session_data).put(update_session_data))
            .route("/me/info", get(session_info)),
        &recipe,
        VerifyOptions::required(),
    );

    let public = require_session(
        Router::new().route("/public", get(public)),
        &recipe,
        VerifyOptions::optional(),
    );

    let router = Router::new()
        .route("/login", post(login))
        .merge(protected)
        .merge(public);

    routes::mount(router, &recipe).with_state(recipe)
}

async fn login(
    State(recipe): State<SessionRecipe>,
    pending: PendingHeaders,
    Json(body): Json<LoginRequest>,
) -> Result<(PendingHeaders, Json<Value>), SessionError> {
    if body.user_id.is_empty() {
        return Err(SessionError::MalformedInput("userId must not be empty".to_string()));
    }

    let session = recipe
        .create_new_session(&pending, &body.user_id, body.payload, body.session_data)
        .await?;

    Ok((
        pending,
        Json(json!({
            "userId": session.user_id(),
            "sessionHandle": session.handle(),
        })),
    ))
}

async fn me(Session(session): Session) -> Json<Value> {
    Json(json!({
        "userId": session.user_id(),
        "sessionHandle": session.handle(),
        "payload": session.jwt_payload(),
    }))
}

/// A `null` body clears the payload.
async fn update_payload(
    Session(mut session): Session,
    Json(payload): Json<Option<JsonMap>>,
) -> Result<Json<Value>, SessionError> {
    session.update_jwt_payload(payload).await?;
    Ok(Json(json!({ "payload": session.jwt_payload() })))
}

async fn session_data(Session(session): Session) -> Result<Json<JsonMap>, SessionError> {
    Ok(Json(session.session_data().await?))
}

async fn update_session_data(
    Session(session): Session,
    Json(data): Json<Option<JsonMap>>,
) -> Result<Json<Value>, SessionError> {
    session.update_session_data(data).await?;
    Ok(Json(json!({ "status": "OK" })))
}

async fn session_info(Session(session): Session) -> Result<Json<Value>, SessionError> {
    let info = session.session_information().await?;
    Ok(Json(json!({
        "sessionHandle": info.session_handle,
        "userId": info.user_id,
        "sessionData": info.session_data,
        "payload": info.user_data_in_jwt,
        "timeCreated": info.time_created,
        "expiry": info.expiry,
    })))
}

async fn public(MaybeSession(session): MaybeSession) -> Json<Value> {
    Json(json!({ "userId": session.as_ref().map(|s| s.user_id()) }))
}
