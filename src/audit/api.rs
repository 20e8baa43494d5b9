//! Audit read endpoint, admin-only and tenant-scoped.

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Extension, Router,
};
use serde_json::{json, Value};

use crate::app::ApiState;
use crate::audit::models::AuditQuery;
use crate::auth::models::VerifiedIdentity;
use crate::error::ApiError;

pub fn routes() -> Router<ApiState> {
    Router::new().route("/api/audit", get(list_audit_logs))
}

/// GET /api/audit
async fn list_audit_logs(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Value>, ApiError> {
    if !identity.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let (logs, pagination) = state.audit.list(&identity.customer_id, &query)?;
    Ok(Json(json!({"logs": logs, "pagination": pagination})))
}
