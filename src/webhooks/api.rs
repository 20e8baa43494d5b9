//! Webhook endpoints: admin-managed subscription configs, plus the
//! shared-secret inbound channel used by the external ticket processor.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::ApiState;
use crate::audit::{self, AuditAction, AuditEvent, ResourceType};
use crate::auth::models::VerifiedIdentity;
use crate::error::ApiError;
use crate::tenancy::TicketScope;
use crate::tickets::models::{Priority, UpdateTicketRequest};
use crate::tickets::validate;
use crate::webhooks::models::{InboundEventRequest, TicketProcessedRequest, WebhookConfigRequest};

/// Subscription management, admin-only, behind bearer auth.
pub fn config_routes() -> Router<ApiState> {
    Router::new()
        .route("/api/webhooks", get(list_webhooks).post(create_webhook))
        .route("/api/webhooks/:id", axum::routing::put(update_webhook).delete(delete_webhook))
}

/// Inbound processor channel. No bearer token; authenticated by the shared
/// secret carried in the body.
pub fn inbound_routes() -> Router<ApiState> {
    Router::new()
        .route("/api/webhook/ticket-processed", post(ticket_processed))
        .route("/api/webhook/event", post(inbound_event))
}

/// GET /api/webhooks
async fn list_webhooks(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&identity)?;
    let webhooks = state.webhooks.list_for_tenant(&identity.customer_id)?;
    Ok(Json(json!({"webhooks": webhooks})))
}

/// POST /api/webhooks
async fn create_webhook(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Json(payload): Json<WebhookConfigRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_admin(&identity)?;
    let events = validate::webhook_config(&payload)?;
    let webhook = state.webhooks.create(
        &identity.customer_id,
        identity.user_id,
        &payload.url,
        &events,
        payload.is_active.unwrap_or(true),
    )?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "Webhook created", "webhook": webhook})),
    ))
}

/// PUT /api/webhooks/:id
async fn update_webhook(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WebhookConfigRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&identity)?;
    let events = validate::webhook_config(&payload)?;
    let webhook = state
        .webhooks
        .update_for_tenant(id, &identity.customer_id, &payload.url, &events, payload.is_active)?
        .ok_or(ApiError::NotFound("Webhook not found"))?;
    Ok(Json(json!({"message": "Webhook updated", "webhook": webhook})))
}

/// DELETE /api/webhooks/:id
async fn delete_webhook(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&identity)?;
    if !state.webhooks.delete_for_tenant(id, &identity.customer_id)? {
        return Err(ApiError::NotFound("Webhook not found"));
    }
    Ok(Json(json!({"message": "Webhook deleted"})))
}

fn require_admin(identity: &VerifiedIdentity) -> Result<(), ApiError> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

fn check_secret(supplied: &str, expected: &str) -> Result<(), ApiError> {
    if supplied != expected {
        return Err(ApiError::Unauthenticated("Invalid webhook secret"));
    }
    Ok(())
}

/// POST /api/webhook/ticket-processed
///
/// External processor reports a status outcome for a ticket; the ticket's
/// status is updated and the processing result lands as a comment. The
/// processor is not a user, so its mutation is attributed to a nil actor
/// in the audit trail.
async fn ticket_processed(
    State(state): State<ApiState>,
    Json(payload): Json<TicketProcessedRequest>,
) -> Result<Json<Value>, ApiError> {
    check_secret(&payload.secret, &state.webhook_secret)?;

    let (Some(ticket_id), Some(status)) = (payload.ticket_id, payload.status) else {
        return Err(ApiError::Validation(
            "Missing required fields: ticketId, status".to_string(),
        ));
    };

    let existing = state
        .tickets
        .get_any(ticket_id)?
        .filter(|t| match &payload.customer_id {
            Some(tenant) => &t.customer_id == tenant,
            None => true,
        })
        .ok_or(ApiError::NotFound("Ticket not found"))?;

    let scope = TicketScope::tenant_wide(&existing.customer_id);
    let update = UpdateTicketRequest {
        status: Some(status),
        ..Default::default()
    };
    let outcome = state
        .tickets
        .update(ticket_id, &scope, &update)?
        .ok_or(ApiError::NotFound("Ticket not found"))?;

    if let Some(result) = &payload.processing_result {
        state.tickets.add_comment(
            ticket_id,
            &scope,
            Uuid::nil(),
            &format!("Processing completed: {result}"),
        )?;
    }

    audit::record(
        &state.audit,
        AuditEvent {
            action: AuditAction::Updated,
            resource_type: ResourceType::Ticket,
            resource_id: ticket_id.to_string(),
            user_id: Uuid::nil(),
            customer_id: outcome.ticket.customer_id.clone(),
            details: json!({
                "webhookProcessing": true,
                "newStatus": status.as_str(),
            }),
            ip_address: None,
            user_agent: None,
        },
    );

    Ok(Json(json!({
        "message": "Ticket processed successfully",
        "newStatus": status.as_str(),
    })))
}

/// POST /api/webhook/event
///
/// Generic event envelope from the processor. Supported events mutate the
/// referenced ticket; anything else is a validation failure.
async fn inbound_event(
    State(state): State<ApiState>,
    Json(payload): Json<InboundEventRequest>,
) -> Result<Json<Value>, ApiError> {
    check_secret(&payload.secret, &state.webhook_secret)?;

    let ticket_id = payload.data["ticketId"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ApiError::Validation("Missing required field: ticketId".to_string()))?;
    let existing = state
        .tickets
        .get_any(ticket_id)?
        .ok_or(ApiError::NotFound("Ticket not found"))?;
    let scope = TicketScope::tenant_wide(&existing.customer_id);

    match payload.event.as_str() {
        "ticket.auto_assignment" => {
            let assignee = payload.data["assignedTo"]
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok());
            state
                .tickets
                .set_assignment(ticket_id, &scope, assignee)?
                .ok_or(ApiError::NotFound("Ticket not found"))?;
        }
        "ticket.priority_update" => {
            let priority = payload.data["priority"]
                .as_str()
                .and_then(Priority::from_str)
                .ok_or_else(|| ApiError::Validation("Invalid priority value".to_string()))?;
            let update = UpdateTicketRequest {
                priority: Some(priority),
                ..Default::default()
            };
            state
                .tickets
                .update(ticket_id, &scope, &update)?
                .ok_or(ApiError::NotFound("Ticket not found"))?;
        }
        _ => {
            return Err(ApiError::Validation("Unknown event type".to_string()));
        }
    }

    audit::record(
        &state.audit,
        AuditEvent {
            action: AuditAction::Updated,
            resource_type: ResourceType::Ticket,
            resource_id: ticket_id.to_string(),
            user_id: Uuid::nil(),
            customer_id: existing.customer_id.clone(),
            details: json!({"webhookEvent": payload.event}),
            ip_address: None,
            user_agent: None,
        },
    );

    Ok(Json(json!({"message": "Event processed successfully"})))
}
