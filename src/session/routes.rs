//! Built-in session routes: explicit refresh and sign-out.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, Method},
    routing::post,
};
use serde_json::{Value, json};

use super::errors::SessionError;
use super::response::{PendingHeaders, clear_session};
use super::verify::VerifyOptions;
use crate::recipe::SessionRecipe;

type RouteResult = Result<(PendingHeaders, Json<Value>), (PendingHeaders, SessionError)>;

/// Mount the built-in routes under the configured API base path.
pub fn mount<S>(router: Router<S>, recipe: &SessionRecipe) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let config = recipe.config();
    let routes = Router::new()
        .route(&config.refresh_api_path(), post(refresh))
        .route(&config.signout_api_path(), post(signout))
        .with_state(recipe.clone());

    router.merge(routes)
}

/// POST {base}/session/refresh
async fn refresh(State(recipe): State<SessionRecipe>, headers: HeaderMap) -> RouteResult {
    let pending = PendingHeaders::new();

    match recipe.refresh_session(&headers, &pending).await {
        Ok(_) => Ok((pending, Json(json!({ "status": "OK" })))),
        Err(e) => {
            tracing::debug!(error = %e, "Refresh rejected");
            Err((pending, e))
        }
    }
}

/// POST {base}/signout
///
/// Succeeds without a session; cookies are cleared either way.
async fn signout(State(recipe): State<SessionRecipe>, headers: HeaderMap) -> RouteResult {
    let pending = PendingHeaders::new();

    let session = match recipe
        .get_session(&headers, &Method::POST, &pending, VerifyOptions::optional())
        .await
    {
        Ok(session) => session,
        Err(e) => return Err((pending, e)),
    };

    match session {
        Some(session) => {
            if let Err(e) = session.revoke_session().await {
                return Err((pending, e));
            }
            tracing::debug!(session_handle = %session.handle(), "Signed out");
        }
        None => clear_session(recipe.config(), &pending),
    }

    Ok((pending, Json(json!({ "status": "OK" }))))
}
