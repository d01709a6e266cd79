//! Middleware that verifies the session before a handler runs.

use axum::{
    Router,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use super::errors::{ErrorKind, SessionError};
use super::response::PendingHeaders;
use super::verify::VerifyOptions;
use crate::recipe::SessionRecipe;

/// State for `verify_session`: the recipe and the options for the routes it guards.
#[derive(Clone)]
pub struct SessionGuard {
    recipe: SessionRecipe,
    options: VerifyOptions,
}

impl SessionGuard {
    pub fn new(recipe: SessionRecipe, options: VerifyOptions) -> Self {
        Self { recipe, options }
    }
}

/// Guard every route of `router` with session verification.
pub fn require_session<S>(
    router: Router<S>,
    recipe: &SessionRecipe,
    options: VerifyOptions,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(
        SessionGuard::new(recipe.clone(), options),
        verify_session,
    ))
}

fn log_failure(err: &SessionError) {
    match err.kind() {
        ErrorKind::TokenTheftDetected => tracing::warn!(error = %err, "Session theft detected"),
        ErrorKind::Transport => tracing::error!(error = %err, "Session verification failed"),
        _ => tracing::debug!(error = %err, "Rejected request without valid session"),
    }
}

/// Verify the request's session and hand it to the handler.
///
/// On success the `SessionContainer` and the shared `PendingHeaders` are put
/// in the request extensions. On failure the handler does not run and the
/// error response carries the recorded cookie changes.
pub async fn verify_session(
    State(guard): State<SessionGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    let pending = PendingHeaders::new();

    let outcome = guard
        .recipe
        .get_session(
            request.headers(),
            request.method(),
            &pending,
            guard.options,
        )
        .await;

    match outcome {
        Ok(Some(session)) => {
            request.extensions_mut().insert(session);
        }
        Ok(None) => {}
        Err(err) => {
            log_failure(&err);
            let mut response = err.into_response();
            pending.apply(response.headers_mut());
            return response;
        }
    }

    request.extensions_mut().insert(pending.clone());
    let mut response = next.run(request).await;
    pending.apply(response.headers_mut());
    response
}
