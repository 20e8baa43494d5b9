//! Webhook configuration and payload types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tickets::models::TicketStatus;

/// Events a tenant can subscribe to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WebhookEvent {
    #[serde(rename = "ticket.created")]
    TicketCreated,
    #[serde(rename = "ticket.updated")]
    TicketUpdated,
    #[serde(rename = "ticket.deleted")]
    TicketDeleted,
    #[serde(rename = "ticket.assigned")]
    TicketAssigned,
    #[serde(rename = "comment.added")]
    CommentAdded,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::TicketCreated => "ticket.created",
            WebhookEvent::TicketUpdated => "ticket.updated",
            WebhookEvent::TicketDeleted => "ticket.deleted",
            WebhookEvent::TicketAssigned => "ticket.assigned",
            WebhookEvent::CommentAdded => "comment.added",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ticket.created" => Some(WebhookEvent::TicketCreated),
            "ticket.updated" => Some(WebhookEvent::TicketUpdated),
            "ticket.deleted" => Some(WebhookEvent::TicketDeleted),
            "ticket.assigned" => Some(WebhookEvent::TicketAssigned),
            "comment.added" => Some(WebhookEvent::CommentAdded),
            _ => None,
        }
    }
}

/// A tenant's outbound webhook subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub id: Uuid,
    pub customer_id: String,
    pub url: String,
    pub events: Vec<WebhookEvent>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: String,
    pub updated_at: String,
}

/// Raw config payload. Event names stay strings here so an unknown name
/// surfaces as a validation message rather than a body-rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfigRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    pub is_active: Option<bool>,
}

/// Inbound notification from the external ticket processor.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketProcessedRequest {
    pub ticket_id: Option<Uuid>,
    pub status: Option<TicketStatus>,
    pub processing_result: Option<String>,
    pub customer_id: Option<String>,
    #[serde(default)]
    pub secret: String,
}

/// Generic inbound event envelope.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEventRequest {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub secret: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_names() {
        assert_eq!(
            serde_json::to_string(&WebhookEvent::CommentAdded).unwrap(),
            r#""comment.added""#
        );
        let event: WebhookEvent = serde_json::from_str(r#""ticket.assigned""#).unwrap();
        assert_eq!(event, WebhookEvent::TicketAssigned);
        assert!(serde_json::from_str::<WebhookEvent>(r#""ticket.archived""#).is_err());
    }

    #[test]
    fn test_ticket_processed_parses_partial_payloads() {
        let req: TicketProcessedRequest =
            serde_json::from_str(r#"{"secret":"s3cret"}"#).unwrap();
        assert!(req.ticket_id.is_none());
        assert!(req.status.is_none());
        assert_eq!(req.secret, "s3cret");
    }
}
