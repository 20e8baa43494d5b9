//! Ticket Models
//! Tickets with embedded comments and attachments, plus the request and
//! response bodies of the ticket endpoints.

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 2000;
pub const COMMENT_MAX: usize = 1000;
pub const TAGS_MAX: usize = 10;

/// Ticket lifecycle states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TicketStatus {
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "resolved")]
    Resolved,
    #[serde(rename = "closed")]
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in-progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(TicketStatus::Open),
            "in-progress" => Some(TicketStatus::InProgress),
            "resolved" => Some(TicketStatus::Resolved),
            "closed" => Some(TicketStatus::Closed),
            _ => None,
        }
    }

    pub const ALL: [TicketStatus; 4] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::Resolved,
        TicketStatus::Closed,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Priority {
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "medium")]
    Medium,
    #[serde(rename = "high")]
    High,
}

impl Priority {
    pub fn as_str(&self) -> &str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }

    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];
}

/// Embedded comment. Append-only; never edited or removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub user_id: Uuid,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    pub uploaded_at: String,
}

/// A support ticket. `customer_id` is fixed at creation from the creator's
/// tenant. `resolved_at`/`closed_at` are stamped exactly once, on the first
/// transition into the matching status, and never cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub customer_id: String,
    pub user_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub tags: Vec<String>,
    pub comments: Vec<Comment>,
    pub attachments: Vec<Attachment>,
    pub resolved_at: Option<String>,
    pub closed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub priority: Option<Priority>,
    pub status: Option<TicketStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub assigned_to: Option<Uuid>,
}

/// Full-document merge of allowed fields. `assigned_to` distinguishes
/// "absent" (unchanged) from explicit `null` (unassign) via the double
/// Option.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_explicit_null")]
    pub assigned_to: Option<Option<Uuid>>,
}

/// `assignedTo: null` explicitly unassigns.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub content: String,
}

/// Query string of the ticket listing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTicketsQuery {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub tag: Option<String>,
    /// Case-insensitive substring over title and description.
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<SortKey>,
    pub sort_dir: Option<SortDir>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum SortKey {
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "updatedAt")]
    UpdatedAt,
    #[serde(rename = "priority")]
    Priority,
    #[serde(rename = "status")]
    Status,
}

impl SortKey {
    /// Timestamps sort on the column itself; priority and status sort by
    /// severity/lifecycle rank rather than alphabetically.
    pub fn order_expr(&self) -> &'static str {
        match self {
            SortKey::CreatedAt => "created_at",
            SortKey::UpdatedAt => "updated_at",
            SortKey::Priority => {
                "CASE priority WHEN 'low' THEN 0 WHEN 'medium' THEN 1 WHEN 'high' THEN 2 END"
            }
            SortKey::Status => {
                "CASE status WHEN 'open' THEN 0 WHEN 'in-progress' THEN 1 \
                 WHEN 'resolved' THEN 2 WHEN 'closed' THEN 3 END"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub enum SortDir {
    #[serde(rename = "asc")]
    Asc,
    #[serde(rename = "desc")]
    Desc,
}

impl SortDir {
    pub fn sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// Pagination envelope: `pages = ceil(total / limit)`.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let pages = if limit == 0 {
            0
        } else {
            (total + limit as u64 - 1) / limit as u64
        };
        Self {
            page,
            limit,
            total,
            pages,
        }
    }
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Map an explicitly-present field (possibly `null`) to `Some(inner)`;
/// absent fields stay `None` via `#[serde(default)]`.
fn deserialize_explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Uuid>::deserialize(deserializer).map(Some)
}
