//! Ticket-service application assembly.
//! Protected routes sit behind the remote-verify-with-local-fallback auth
//! gate; the processor webhook channel and the health probe stay public.

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, response::Json, routing::get, Router};
use chrono::Utc;
use serde_json::{json, Value};

use crate::audit::AuditStore;
use crate::config::ApiServiceConfig;
use crate::middleware::auth::{require_auth, AuthGate};
use crate::middleware::rate_limit::{RateLimitConfig, RateLimitLayer};
use crate::tickets::TicketStore;
use crate::webhooks::{WebhookDispatcher, WebhookStore};
use crate::{audit, tickets, webhooks};

/// Shared ticket-service state.
#[derive(Clone)]
pub struct ApiState {
    pub tickets: Arc<TicketStore>,
    pub audit: Arc<AuditStore>,
    pub webhooks: Arc<WebhookStore>,
    pub dispatcher: WebhookDispatcher,
    pub auth: AuthGate,
    pub webhook_secret: Arc<str>,
}

pub fn router(state: ApiState, config: &ApiServiceConfig) -> Router {
    let protected = Router::new()
        .merge(tickets::api::routes())
        .merge(audit::api::routes())
        .merge(webhooks::api::config_routes())
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_auth,
        ));

    let mut app = Router::new()
        .merge(protected)
        .merge(webhooks::api::inbound_routes())
        .route("/health", get(health_check))
        .with_state(state);

    if config.rate_limiting_enabled {
        let api_limiter = RateLimitLayer::new(RateLimitConfig {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
        });
        api_limiter.spawn_cleanup();
        app = app.layer(middleware::from_fn_with_state(
            api_limiter,
            crate::middleware::rate_limit::rate_limit_middleware,
        ));
    }

    app
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "service": "api-service",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
