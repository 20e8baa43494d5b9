//! Auth-service request gate.
//!
//! The auth service is the source of truth for identity, so its gate
//! resolves tokens directly against the credential store (no remote call)
//! and rejects tokens whose user has been deactivated since issue.

use crate::auth::api::AuthServiceState;
use crate::auth::models::VerifiedIdentity;
use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

/// Pull the bearer token out of the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

pub async fn local_auth(
    State(state): State<AuthServiceState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .ok_or(ApiError::Unauthenticated("Access denied. No token provided."))?;

    let claims = state
        .tokens
        .verify(&token)
        .map_err(|_| ApiError::Unauthenticated("Invalid token."))?;

    let user = state
        .users
        .find_by_id(&claims.user_id)
        .map_err(ApiError::internal)?
        .filter(|u| u.is_active)
        .ok_or(ApiError::Unauthenticated("Invalid token."))?;

    req.extensions_mut().insert(VerifiedIdentity::from_user(&user));

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert("Authorization", HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");

        headers.insert("Authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert!(bearer_token(&headers).is_none());
    }
}
