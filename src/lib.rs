pub mod app;
pub mod authority;
pub mod cli;
pub mod config;
pub mod recipe;
pub mod session;
pub mod token;

pub use app::create_app;
pub use config::{AntiCsrf, SameSite, SessionConfig};
pub use recipe::{RecipeError, SessionRecipe};
pub use session::{
    ErrorKind, MaybeSession, PendingHeaders, Session, SessionContainer, SessionError,
    VerifyOptions, require_session,
};

use std::net::SocketAddr;
use tokio::net::TcpListener;

/// JSON object used for access token payloads and session data.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(recipe: SessionRecipe, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(recipe);
    axum::serve(listener, app).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
pub async fn start_server(
    recipe: SessionRecipe,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(recipe, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
