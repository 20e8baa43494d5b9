//! Auth Gateway
//! Login, registration, profile, machine-to-machine token verification,
//! and tenant-scoped user management.

use crate::auth::{
    middleware::local_auth,
    models::{
        AuthResponse, LoginRequest, RegisterRequest, UpdateUserRequest, UserProfile,
        VerifiedIdentity, VerifyRequest, VerifyResponse,
    },
    token::TokenService,
    user_store::{CreateUserOutcome, UserStore},
};
use crate::config::AuthServiceConfig;
use crate::error::ApiError;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimitLayer};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared auth-service state.
#[derive(Clone)]
pub struct AuthServiceState {
    pub users: Arc<UserStore>,
    pub tokens: Arc<TokenService>,
}

impl AuthServiceState {
    pub fn new(users: Arc<UserStore>, tokens: Arc<TokenService>) -> Self {
        Self { users, tokens }
    }
}

/// Assemble the auth-service router. Authentication endpoints get the
/// strict credential-stuffing cap; everything else the general API cap.
/// Both caps are disabled outside production.
pub fn router(state: AuthServiceState, config: &AuthServiceConfig) -> Router {
    let mut auth_routes = Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/verify", post(verify_token));

    if config.rate_limiting_enabled {
        let auth_limiter = RateLimitLayer::new(RateLimitConfig {
            max_requests: 5,
            window: Duration::from_secs(15 * 60),
        });
        auth_limiter.spawn_cleanup();
        auth_routes = auth_routes.route_layer(middleware::from_fn_with_state(
            auth_limiter,
            crate::middleware::rate_limit::rate_limit_middleware,
        ));
    }

    let protected_routes = Router::new()
        .route("/api/auth/profile", get(profile))
        .route("/api/users", get(list_users))
        .route("/api/users/:id", get(get_user).put(update_user))
        .route_layer(middleware::from_fn_with_state(state.clone(), local_auth));

    let mut app = Router::new()
        .merge(auth_routes)
        .merge(protected_routes)
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
        "service": "auth-service",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

fn validate_register(payload: &RegisterRequest) -> Result<(), ApiError> {
    if payload.email.trim().is_empty() || !payload.email.contains('@') {
        return Err(ApiError::Validation("A valid email is required".to_string()));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if payload.customer_id.trim().is_empty() {
        return Err(ApiError::Validation("customerId is required".to_string()));
    }
    Ok(())
}

/// POST /api/auth/register
async fn register(
    State(state): State<AuthServiceState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    validate_register(&payload)?;

    let outcome = state
        .users
        .create(
            payload.email.trim(),
            &payload.password,
            payload.first_name.trim(),
            payload.last_name.trim(),
            payload.role,
            payload.customer_id.trim(),
        )
        .map_err(ApiError::internal)?;

    let user = match outcome {
        CreateUserOutcome::Created(user) => user,
        CreateUserOutcome::EmailTaken => {
            return Err(ApiError::Conflict("User already exists with this email."));
        }
    };

    let (token, _) = state.tokens.issue(&user).map_err(ApiError::internal)?;

    info!("Registered user {} in tenant {}", user.email, user.customer_id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully".to_string(),
            token,
            user: UserProfile::from_user(&user),
        }),
    ))
}

/// POST /api/auth/login
///
/// Missing user, deactivated user, and wrong password are deliberately the
/// same generic response.
async fn login(
    State(state): State<AuthServiceState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state
        .users
        .find_active_by_email(payload.email.trim())
        .map_err(ApiError::internal)?
        .ok_or(ApiError::Unauthenticated("Invalid credentials."))?;

    let valid = state
        .users
        .password_matches(&user, &payload.password)
        .map_err(ApiError::internal)?;
    if !valid {
        warn!("Failed login attempt for {}", user.email);
        return Err(ApiError::Unauthenticated("Invalid credentials."));
    }

    let (token, _) = state.tokens.issue(&user).map_err(ApiError::internal)?;

    info!("Login successful: {} ({})", user.email, user.role.as_str());

    Ok(Json(AuthResponse {
        message: "Login successful".to_string(),
        token,
        user: UserProfile::from_user(&user),
    }))
}

/// GET /api/auth/profile
async fn profile(
    State(state): State<AuthServiceState>,
    Extension(identity): Extension<VerifiedIdentity>,
) -> Result<Json<Value>, ApiError> {
    let user = state
        .users
        .find_by_id(&identity.user_id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("User not found."))?;

    Ok(Json(json!({ "user": UserProfile::from_user(&user) })))
}

/// POST /api/auth/verify
///
/// Stateless machine-to-machine endpoint: no bearer auth. Always answers
/// 200 with a valid/invalid body so callers can distinguish "the token is
/// bad" from "the verify call failed"; the only non-200 is a missing token.
async fn verify_token(
    State(state): State<AuthServiceState>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    if payload.token.trim().is_empty() {
        return Err(ApiError::Validation("Token is required.".to_string()));
    }

    let invalid = || VerifyResponse {
        valid: false,
        user: None,
        error: Some("Invalid token.".to_string()),
    };

    let claims = match state.tokens.verify(&payload.token) {
        Ok(claims) => claims,
        Err(_) => return Ok(Json(invalid())),
    };

    // The token may outlive the account; deactivation wins here.
    let user = state
        .users
        .find_by_id(&claims.user_id)
        .map_err(ApiError::internal)?
        .filter(|u| u.is_active);

    Ok(Json(match user {
        Some(user) => VerifyResponse {
            valid: true,
            user: Some(VerifiedIdentity::from_user(&user)),
            error: None,
        },
        None => invalid(),
    }))
}

/// GET /api/users (admin, tenant-scoped)
async fn list_users(
    State(state): State<AuthServiceState>,
    Extension(identity): Extension<VerifiedIdentity>,
) -> Result<Json<Value>, ApiError> {
    if !identity.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let users = state
        .users
        .list_for_tenant(&identity.customer_id)
        .map_err(ApiError::internal)?;

    let users: Vec<UserProfile> = users.iter().map(UserProfile::from_user).collect();
    Ok(Json(json!({ "users": users })))
}

/// GET /api/users/:id (admin, tenant-scoped)
async fn get_user(
    State(state): State<AuthServiceState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    if !identity.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let user = state
        .users
        .get_for_tenant(&user_id, &identity.customer_id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("User not found."))?;

    Ok(Json(json!({ "user": UserProfile::from_user(&user) })))
}

/// PUT /api/users/:id (admin, tenant-scoped)
async fn update_user(
    State(state): State<AuthServiceState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<Value>, ApiError> {
    if !identity.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let user = state
        .users
        .update_for_tenant(&user_id, &identity.customer_id, &payload)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("User not found."))?;

    Ok(Json(json!({
        "message": "User updated successfully",
        "user": UserProfile::from_user(&user),
    })))
}
