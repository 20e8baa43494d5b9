//! Shared API error taxonomy.
//!
//! Every error surfaces to clients as a JSON body with a single
//! human-readable `error` string. Internal detail is logged server-side
//! and never exposed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

/// Errors that cross the HTTP boundary.
///
/// `NotFound` deliberately covers both genuinely absent resources and
/// cross-tenant/cross-owner access attempts so that existence never leaks
/// across tenants.
#[derive(Debug)]
pub enum ApiError {
    /// No token, invalid token, or expired token.
    Unauthenticated(&'static str),
    /// Authenticated but the role does not permit the action.
    Forbidden,
    /// Absent resource or a scoped query that matched nothing.
    NotFound(&'static str),
    /// Input failed a declared field constraint; carries the first
    /// violated rule's message.
    Validation(String),
    /// Duplicate unique field.
    Conflict(&'static str),
    /// Unexpected store or logic failure.
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal(err.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Insufficient permissions.".to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.to_string()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.to_string()),
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Unauthenticated("Invalid token.")
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("Ticket not found.").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Validation("title is required".into())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("User already exists with this email.")
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom"))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
