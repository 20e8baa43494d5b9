//! Request validation for ticket and webhook-config payloads.
//! Rules run in order; the first failure produces the 400 message.

use crate::error::ApiError;
use crate::tickets::models::{
    CommentRequest, CreateTicketRequest, UpdateTicketRequest, COMMENT_MAX, DESCRIPTION_MAX,
    TAGS_MAX, TITLE_MAX,
};
use crate::webhooks::models::{WebhookConfigRequest, WebhookEvent};

pub fn create_ticket(req: &CreateTicketRequest) -> Result<(), ApiError> {
    title_required(&req.title)?;
    description_required(&req.description)?;
    tags_limit(&req.tags)?;
    Ok(())
}

pub fn update_ticket(req: &UpdateTicketRequest) -> Result<(), ApiError> {
    if let Some(title) = &req.title {
        title_required(title)?;
    }
    if let Some(description) = &req.description {
        description_required(description)?;
    }
    if let Some(tags) = &req.tags {
        tags_limit(tags)?;
    }
    Ok(())
}

pub fn comment(req: &CommentRequest) -> Result<(), ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("Comment content is required".into()));
    }
    if req.content.chars().count() > COMMENT_MAX {
        return Err(ApiError::Validation(format!(
            "Comment cannot exceed {COMMENT_MAX} characters"
        )));
    }
    Ok(())
}

/// Validate a webhook config payload and resolve its event names.
pub fn webhook_config(req: &WebhookConfigRequest) -> Result<Vec<WebhookEvent>, ApiError> {
    if req.url.trim().is_empty() {
        return Err(ApiError::Validation("URL is required".into()));
    }
    if !req.url.starts_with("http://") && !req.url.starts_with("https://") {
        return Err(ApiError::Validation("URL must be a valid HTTP URL".into()));
    }
    if req.events.is_empty() {
        return Err(ApiError::Validation(
            "At least one event must be selected".into(),
        ));
    }
    req.events
        .iter()
        .map(|name| {
            WebhookEvent::from_str(name)
                .ok_or_else(|| ApiError::Validation(format!("Unknown event: {name}")))
        })
        .collect()
}

fn title_required(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::Validation("Title is required".into()));
    }
    if title.chars().count() > TITLE_MAX {
        return Err(ApiError::Validation(format!(
            "Title cannot exceed {TITLE_MAX} characters"
        )));
    }
    Ok(())
}

fn description_required(description: &str) -> Result<(), ApiError> {
    if description.trim().is_empty() {
        return Err(ApiError::Validation("Description is required".into()));
    }
    if description.chars().count() > DESCRIPTION_MAX {
        return Err(ApiError::Validation(format!(
            "Description cannot exceed {DESCRIPTION_MAX} characters"
        )));
    }
    Ok(())
}

fn tags_limit(tags: &[String]) -> Result<(), ApiError> {
    if tags.len() > TAGS_MAX {
        return Err(ApiError::Validation(format!(
            "Cannot have more than {TAGS_MAX} tags"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::models::WebhookEvent;

    fn base_create() -> CreateTicketRequest {
        serde_json::from_str(r#"{"title":"Printer on fire","description":"Smoke everywhere"}"#)
            .unwrap()
    }

    #[test]
    fn test_create_rules_first_failure_wins() {
        let mut req = base_create();
        req.title = "  ".into();
        req.description = String::new();
        let err = create_ticket(&req).unwrap_err();
        assert!(matches!(err, ApiError::Validation(msg) if msg == "Title is required"));
    }

    #[test]
    fn test_create_length_limits() {
        let mut req = base_create();
        req.title = "x".repeat(TITLE_MAX + 1);
        assert!(create_ticket(&req).is_err());

        let mut req = base_create();
        req.tags = (0..=TAGS_MAX).map(|i| format!("t{i}")).collect();
        assert!(create_ticket(&req).is_err());

        assert!(create_ticket(&base_create()).is_ok());
    }

    #[test]
    fn test_update_skips_absent_fields() {
        let req = UpdateTicketRequest::default();
        assert!(update_ticket(&req).is_ok());

        let req = UpdateTicketRequest {
            title: Some(String::new()),
            ..Default::default()
        };
        assert!(update_ticket(&req).is_err());
    }

    #[test]
    fn test_comment_rules() {
        let req = CommentRequest {
            content: String::new(),
        };
        assert!(comment(&req).is_err());

        let req = CommentRequest {
            content: "a".repeat(COMMENT_MAX + 1),
        };
        assert!(comment(&req).is_err());

        let req = CommentRequest {
            content: "Looks fixed to me".into(),
        };
        assert!(comment(&req).is_ok());
    }

    #[test]
    fn test_webhook_config_rules() {
        let req = WebhookConfigRequest {
            url: "ftp://example.com".into(),
            events: vec!["ticket.created".into()],
            is_active: None,
        };
        assert!(webhook_config(&req).is_err());

        let req = WebhookConfigRequest {
            url: "https://example.com/hook".into(),
            events: vec![],
            is_active: None,
        };
        assert!(webhook_config(&req).is_err());

        let req = WebhookConfigRequest {
            url: "https://example.com/hook".into(),
            events: vec!["ticket.created".into(), "ticket.archived".into()],
            is_active: None,
        };
        let err = webhook_config(&req).unwrap_err();
        assert!(matches!(err, ApiError::Validation(msg) if msg == "Unknown event: ticket.archived"));

        let req = WebhookConfigRequest {
            url: "https://example.com/hook".into(),
            events: vec!["ticket.created".into(), "comment.added".into()],
            is_active: None,
        };
        let events = webhook_config(&req).unwrap();
        assert_eq!(events, vec![WebhookEvent::TicketCreated, WebhookEvent::CommentAdded]);
    }
}
