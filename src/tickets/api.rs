//! Ticket endpoints: CRUD, comments, assignment, and tenant statistics.
//! Every handler scopes its queries through [`TicketScope`]; cross-tenant
//! and cross-owner ids surface as not-found.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Extension, Router,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::ApiState;
use crate::audit::{self, AuditAction, AuditEvent, ResourceType};
use crate::auth::models::VerifiedIdentity;
use crate::error::ApiError;
use crate::tenancy::TicketScope;
use crate::tickets::models::{
    AssignRequest, CommentRequest, CreateTicketRequest, ListTicketsQuery, Ticket,
    UpdateTicketRequest,
};
use crate::tickets::validate;
use crate::webhooks::models::WebhookEvent;

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/stats/overview", get(stats_overview))
        .route(
            "/api/tickets/:id",
            get(get_ticket).put(update_ticket).delete(delete_ticket),
        )
        .route("/api/tickets/:id/status", patch(update_status))
        .route("/api/tickets/:id/assign", post(assign_ticket).patch(assign_ticket))
        .route("/api/tickets/:id/comments", post(add_comment))
}

fn audit_event(
    identity: &VerifiedIdentity,
    action: AuditAction,
    resource_type: ResourceType,
    resource_id: String,
    details: Value,
) -> AuditEvent {
    AuditEvent {
        action,
        resource_type,
        resource_id,
        user_id: identity.user_id,
        customer_id: identity.customer_id.clone(),
        details,
        ip_address: None,
        user_agent: None,
    }
}

/// POST /api/tickets
async fn create_ticket(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Json(mut payload): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    validate::create_ticket(&payload)?;
    if !identity.is_admin() {
        payload.assigned_to = None;
    }

    let ticket = state
        .tickets
        .create(&payload, &identity.customer_id, identity.user_id)?;

    audit::record(
        &state.audit,
        audit_event(
            &identity,
            AuditAction::Created,
            ResourceType::Ticket,
            ticket.id.to_string(),
            json!({"title": ticket.title}),
        ),
    );
    state.dispatcher.notify(
        &identity.customer_id,
        WebhookEvent::TicketCreated,
        json!({
            "ticketId": ticket.id,
            "title": ticket.title,
            "customerId": ticket.customer_id,
            "userId": ticket.user_id,
        }),
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "Ticket created", "ticket": ticket})),
    ))
}

/// GET /api/tickets
async fn list_tickets(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Query(query): Query<ListTicketsQuery>,
) -> Result<Json<Value>, ApiError> {
    let scope = TicketScope::for_caller(&identity);
    let (tickets, pagination) = state.tickets.list(&scope, &query)?;
    Ok(Json(json!({"tickets": tickets, "pagination": pagination})))
}

/// GET /api/tickets/:id
async fn get_ticket(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let scope = TicketScope::for_caller(&identity);
    let ticket = state
        .tickets
        .get(id, &scope)?
        .ok_or(ApiError::NotFound("Ticket not found"))?;
    Ok(Json(json!({"ticket": ticket})))
}

/// PUT /api/tickets/:id
///
/// Non-admins may only touch title/description/tags on their own tickets;
/// status and assignee values they submit are dropped without an error.
async fn update_ticket(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateTicketRequest>,
) -> Result<Json<Value>, ApiError> {
    validate::update_ticket(&payload)?;

    let scope = TicketScope::for_caller(&identity);
    if !identity.is_admin() {
        payload.status = None;
        payload.assigned_to = None;
    }

    let outcome = state
        .tickets
        .update(id, &scope, &payload)?
        .ok_or(ApiError::NotFound("Ticket not found"))?;

    audit::record(
        &state.audit,
        audit_event(
            &identity,
            AuditAction::Updated,
            ResourceType::Ticket,
            outcome.ticket.id.to_string(),
            json!({"changes": outcome.changed_fields}),
        ),
    );
    notify_updated(&state, &identity.customer_id, &outcome.ticket);

    Ok(Json(json!({"message": "Ticket updated", "ticket": outcome.ticket})))
}

/// PATCH /api/tickets/:id/status
async fn update_status(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    // Loose parse so an unknown status string reads as a validation
    // failure, not a body-rejection.
    let status = payload["status"]
        .as_str()
        .and_then(crate::tickets::models::TicketStatus::from_str)
        .ok_or_else(|| ApiError::Validation("Invalid status value".to_string()))?;

    let scope = TicketScope::for_caller(&identity);
    let update = UpdateTicketRequest {
        status: Some(status),
        ..Default::default()
    };
    let outcome = state
        .tickets
        .update(id, &scope, &update)?
        .ok_or(ApiError::NotFound("Ticket not found or access denied"))?;

    audit::record(
        &state.audit,
        audit_event(
            &identity,
            AuditAction::Updated,
            ResourceType::Ticket,
            outcome.ticket.id.to_string(),
            json!({"changes": {"status": status.as_str()}}),
        ),
    );
    notify_updated(&state, &identity.customer_id, &outcome.ticket);

    Ok(Json(json!({"message": "Ticket status updated", "ticket": outcome.ticket})))
}

/// PATCH|POST /api/tickets/:id/assign — admin only; `assignedTo: null`
/// unassigns.
async fn assign_ticket(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<Value>, ApiError> {
    if !identity.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let scope = TicketScope::tenant_wide(&identity.customer_id);
    let ticket = state
        .tickets
        .set_assignment(id, &scope, payload.assigned_to)?
        .ok_or(ApiError::NotFound("Ticket not found"))?;

    audit::record(
        &state.audit,
        audit_event(
            &identity,
            AuditAction::Assigned,
            ResourceType::Ticket,
            ticket.id.to_string(),
            json!({"assignedTo": ticket.assigned_to}),
        ),
    );
    state.dispatcher.notify(
        &identity.customer_id,
        WebhookEvent::TicketAssigned,
        json!({
            "ticketId": ticket.id,
            "assignedTo": ticket.assigned_to,
            "customerId": ticket.customer_id,
        }),
    );

    Ok(Json(json!({"message": "Ticket assigned successfully", "ticket": ticket})))
}

/// DELETE /api/tickets/:id — admin only.
async fn delete_ticket(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    if !identity.is_admin() {
        return Err(ApiError::Forbidden);
    }

    let scope = TicketScope::tenant_wide(&identity.customer_id);
    let ticket = state
        .tickets
        .get(id, &scope)?
        .ok_or(ApiError::NotFound("Ticket not found"))?;
    state.tickets.delete(id, &scope)?;

    audit::record(
        &state.audit,
        audit_event(
            &identity,
            AuditAction::Deleted,
            ResourceType::Ticket,
            ticket.id.to_string(),
            json!({"title": ticket.title}),
        ),
    );
    state.dispatcher.notify(
        &identity.customer_id,
        WebhookEvent::TicketDeleted,
        json!({
            "ticketId": ticket.id,
            "title": ticket.title,
            "customerId": ticket.customer_id,
        }),
    );

    Ok(Json(json!({"message": "Ticket deleted"})))
}

/// POST /api/tickets/:id/comments — creator or tenant admin.
async fn add_comment(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommentRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    validate::comment(&payload)?;

    let scope = TicketScope::for_caller(&identity);
    let ticket = state
        .tickets
        .add_comment(id, &scope, identity.user_id, &payload.content)?
        .ok_or(ApiError::NotFound("Ticket not found."))?;

    audit::record(
        &state.audit,
        audit_event(
            &identity,
            AuditAction::Commented,
            ResourceType::Ticket,
            ticket.id.to_string(),
            json!({"content": payload.content.trim()}),
        ),
    );
    state.dispatcher.notify(
        &identity.customer_id,
        WebhookEvent::CommentAdded,
        json!({
            "ticketId": ticket.id,
            "customerId": ticket.customer_id,
            "userId": identity.user_id,
        }),
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "Comment added successfully", "ticket": ticket})),
    ))
}

/// GET /api/tickets/stats/overview — admin only.
async fn stats_overview(
    State(state): State<ApiState>,
    Extension(identity): Extension<VerifiedIdentity>,
) -> Result<Json<Value>, ApiError> {
    if !identity.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let stats = state.tickets.stats(&identity.customer_id)?;
    Ok(Json(stats))
}

fn notify_updated(state: &ApiState, customer_id: &str, ticket: &Ticket) {
    state.dispatcher.notify(
        customer_id,
        WebhookEvent::TicketUpdated,
        json!({
            "ticketId": ticket.id,
            "status": ticket.status,
            "customerId": ticket.customer_id,
        }),
    );
}
