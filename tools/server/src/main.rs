//! drivegate-server - HTTP proxy for a Google Drive folder.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use drivegate_server::{router, AllowList, AppState, Config};
use drivegate_storage::{drive_factory, CredentialManager, GoogleAuth};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_logging(config.verbose);
    config.warn_missing();

    let settings = config.auth_settings();
    let google = Arc::new(
        GoogleAuth::new(settings.oauth.as_ref()).context("Failed to set up Google sign-in")?,
    );
    let factory = drive_factory().context("Failed to set up the Drive client")?;
    let credentials = Arc::new(CredentialManager::new(settings, google.clone(), factory));

    let allowed_users = AllowList::parse(&config.allowed_users);
    if allowed_users.is_empty() {
        info!("ALLOWED_USERS not set, any Google account may sign in");
    }

    let state = AppState::new(credentials, google, config.root_folder(), allowed_users);
    let app = router(state);

    let addr = SocketAddr::new(config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("drivegate listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "drivegate_server=debug,drivegate_storage=debug,tower_http=debug"
    } else {
        "drivegate_server=info,drivegate_storage=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
