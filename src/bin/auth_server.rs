//! Auth service entry point: registration, login, token verification, and
//! tenant-scoped user management.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::middleware;
use tokio::net::TcpListener;
use tracing::info;

use supportdesk_backend::auth::api::{router, AuthServiceState};
use supportdesk_backend::auth::token::TokenService;
use supportdesk_backend::auth::user_store::UserStore;
use supportdesk_backend::config::{init_tracing, load_env, AuthServiceConfig};
use supportdesk_backend::middleware::{cors_layer, logging::request_logging};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = AuthServiceConfig::from_env().context("auth service configuration")?;

    let users = Arc::new(UserStore::new(&config.db_path).context("user store init")?);
    let tokens = Arc::new(TokenService::new(
        config.jwt_secret.clone(),
        config.token_lifetime_hours,
    ));
    let state = AuthServiceState::new(users, tokens);

    let app = router(state, &config)
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&config.allowed_origins));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(port = config.port, "auth service listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("auth server error")?;

    Ok(())
}
