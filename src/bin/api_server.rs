//! Ticket service entry point: tickets, comments, assignment, audit trail,
//! webhook subscriptions, and the inbound processor channel.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::middleware;
use tokio::net::TcpListener;
use tracing::info;

use supportdesk_backend::app::{router, ApiState};
use supportdesk_backend::audit::AuditStore;
use supportdesk_backend::auth::token::TokenService;
use supportdesk_backend::config::{init_tracing, load_env, ApiServiceConfig};
use supportdesk_backend::middleware::{
    auth::{AuthGate, HttpRemoteVerifier},
    cors_layer,
    logging::request_logging,
};
use supportdesk_backend::tickets::TicketStore;
use supportdesk_backend::webhooks::{WebhookDispatcher, WebhookStore};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = ApiServiceConfig::from_env().context("api service configuration")?;

    let tickets = Arc::new(TicketStore::open(&config.db_path).context("ticket store init")?);
    let audit = Arc::new(AuditStore::open(&config.db_path).context("audit store init")?);
    let webhooks = Arc::new(WebhookStore::open(&config.db_path).context("webhook store init")?);

    let tokens = Arc::new(TokenService::new(config.jwt_secret.clone(), 24));
    let verifier = HttpRemoteVerifier::new(
        reqwest::Client::new(),
        &config.auth_service_url,
        config.verify_timeout,
    );
    let auth = AuthGate::new(Arc::new(verifier), tokens);

    let state = ApiState {
        tickets,
        audit,
        dispatcher: WebhookDispatcher::new(Arc::clone(&webhooks)),
        webhooks,
        auth,
        webhook_secret: config.webhook_secret.as_str().into(),
    };

    let app = router(state, &config)
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&config.allowed_origins));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(port = config.port, "api service listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("api server error")?;

    Ok(())
}
