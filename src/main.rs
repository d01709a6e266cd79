use clap::Parser;
use sessionward::SessionRecipe;
use sessionward::cli::{Args, build_config, init_logging};
use sessionward::create_app;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(config) = build_config(&args) else {
        std::process::exit(1);
    };

    let local_verification = config.local_verification;
    let recipe = match SessionRecipe::new(config) {
        Ok(recipe) => recipe,
        Err(e) => {
            error!(error = %e, "Failed to set up sessions");
            std::process::exit(1);
        }
    };

    if local_verification {
        // Without a key every request is verified at the core until one arrives.
        if let Err(e) = recipe.refresh_signing_key().await {
            warn!(error = %e, "Could not fetch signing key, verifying remotely for now");
        }
    }

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "Failed to read local address");
            std::process::exit(1);
        }
    };

    info!(
        address = %local_addr,
        core = %recipe.config().connection_uri,
        anti_csrf = ?recipe.config().anti_csrf,
        "Listening"
    );

    let app = create_app(recipe);
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
