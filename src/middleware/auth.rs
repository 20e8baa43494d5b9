//! Ticket-service request gate.
//!
//! Resolves a bearer token to identity claims in two steps: a remote call
//! to the auth service's verify endpoint (bounded timeout), then a local
//! HS256 decode if — and only if — the remote call itself failed. A remote
//! answer of "invalid" is final; the fallback exists so the ticket service
//! keeps working through a brief auth-service outage, at the cost of not
//! seeing server-side deactivation during it.

use crate::auth::models::{VerifiedIdentity, VerifyResponse};
use crate::auth::token::TokenService;
use crate::error::ApiError;
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// What the remote verify endpoint said about a token.
#[derive(Debug, Clone)]
pub enum RemoteVerdict {
    Valid(VerifiedIdentity),
    Invalid,
}

/// The remote step of token resolution, behind a trait so the
/// success/invalid/unreachable branches are independently testable.
#[async_trait]
pub trait RemoteVerifier: Send + Sync {
    /// Ask the auth service about a token. `Err` means the call itself
    /// failed (network, timeout, non-2xx), not that the token is bad.
    async fn verify(&self, token: &str) -> anyhow::Result<RemoteVerdict>;
}

/// Production verifier: POST {auth_service}/api/auth/verify.
pub struct HttpRemoteVerifier {
    client: reqwest::Client,
    verify_url: String,
    timeout: Duration,
}

impl HttpRemoteVerifier {
    pub fn new(client: reqwest::Client, auth_service_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            verify_url: format!("{}/api/auth/verify", auth_service_url.trim_end_matches('/')),
            timeout,
        }
    }
}

#[async_trait]
impl RemoteVerifier for HttpRemoteVerifier {
    async fn verify(&self, token: &str) -> anyhow::Result<RemoteVerdict> {
        let response = self
            .client
            .post(&self.verify_url)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await?
            .error_for_status()?;

        let body: VerifyResponse = response.json().await?;
        Ok(match (body.valid, body.user) {
            (true, Some(user)) => RemoteVerdict::Valid(user),
            _ => RemoteVerdict::Invalid,
        })
    }
}

/// Shared state for the gate: the remote step plus the local decoder used
/// as fallback.
#[derive(Clone)]
pub struct AuthGate {
    verifier: Arc<dyn RemoteVerifier>,
    tokens: Arc<TokenService>,
}

impl AuthGate {
    pub fn new(verifier: Arc<dyn RemoteVerifier>, tokens: Arc<TokenService>) -> Self {
        Self { verifier, tokens }
    }

    /// Resolve a token to an identity, or explain why not.
    pub async fn resolve(&self, token: &str) -> Result<VerifiedIdentity, ApiError> {
        match self.verifier.verify(token).await {
            Ok(RemoteVerdict::Valid(identity)) => Ok(identity),
            // The source of truth said no; local decode must not override it.
            Ok(RemoteVerdict::Invalid) => Err(ApiError::Unauthenticated("Invalid token.")),
            Err(err) => {
                warn!("Auth service unreachable, falling back to local token decode: {err:#}");
                let claims = self
                    .tokens
                    .verify(token)
                    .map_err(|_| ApiError::Unauthenticated("Invalid token."))?;
                Ok(VerifiedIdentity::from_claims(&claims))
            }
        }
    }
}

/// Per-request gate for the ticket service's protected routes.
pub async fn require_auth(
    State(gate): State<AuthGate>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = crate::auth::middleware::bearer_token(req.headers())
        .ok_or(ApiError::Unauthenticated("Access denied. No token provided."))?;

    let identity = gate.resolve(&token).await?;
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
