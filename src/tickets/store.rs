//! SQLite-backed ticket persistence.
//! Tags, comments, and attachments are embedded as JSON text columns so a
//! ticket reads and writes as one document.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::json;
use uuid::Uuid;

use crate::tenancy::TicketScope;
use crate::tickets::models::{
    now_rfc3339, Attachment, Comment, CreateTicketRequest, ListTicketsQuery, Pagination, Priority,
    SortDir, SortKey, Ticket, TicketStatus, UpdateTicketRequest,
};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS tickets (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'open',
    priority TEXT NOT NULL DEFAULT 'medium',
    customer_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    assigned_to TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    comments TEXT NOT NULL DEFAULT '[]',
    attachments TEXT NOT NULL DEFAULT '[]',
    resolved_at TEXT,
    closed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tickets_tenant ON tickets(customer_id);
CREATE INDEX IF NOT EXISTS idx_tickets_tenant_owner ON tickets(customer_id, user_id);
CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(customer_id, status);
"#;

pub struct TicketStore {
    conn: Arc<Mutex<Connection>>,
}

/// What an update changed, for audit details and stamp bookkeeping.
#[derive(Debug)]
pub struct UpdateOutcome {
    pub ticket: Ticket,
    pub changed_fields: Vec<&'static str>,
}

impl TicketStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open ticket database")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        // The audit writer runs on its own connection; wait out its writes.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize ticket schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn create(
        &self,
        req: &CreateTicketRequest,
        customer_id: &str,
        user_id: Uuid,
    ) -> Result<Ticket> {
        let now = now_rfc3339();
        let mut ticket = Ticket {
            id: Uuid::new_v4(),
            title: req.title.trim().to_string(),
            description: req.description.trim().to_string(),
            status: req.status.unwrap_or(TicketStatus::Open),
            priority: req.priority.unwrap_or(Priority::Medium),
            customer_id: customer_id.to_string(),
            user_id,
            assigned_to: req.assigned_to,
            tags: req.tags.clone(),
            comments: Vec::new(),
            attachments: Vec::new(),
            resolved_at: None,
            closed_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        // Tickets may be created directly in a terminal state.
        stamp_transitions(&mut ticket);

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tickets (id, title, description, status, priority, customer_id, user_id,
                 assigned_to, tags, comments, attachments, resolved_at, closed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                ticket.id.to_string(),
                ticket.title,
                ticket.description,
                ticket.status.as_str(),
                ticket.priority.as_str(),
                ticket.customer_id,
                ticket.user_id.to_string(),
                ticket.assigned_to.map(|id| id.to_string()),
                serde_json::to_string(&ticket.tags)?,
                "[]",
                "[]",
                ticket.resolved_at,
                ticket.closed_at,
                ticket.created_at,
                ticket.updated_at,
            ],
        )
        .context("failed to insert ticket")?;
        Ok(ticket)
    }

    /// Fetch one ticket visible within the caller's scope. Out-of-scope ids
    /// read as absent.
    pub fn get(&self, id: Uuid, scope: &TicketScope) -> Result<Option<Ticket>> {
        let mut clauses = vec!["id = ?".to_string()];
        let mut bind: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(id.to_string())];
        scope.push_sql(&mut clauses, &mut bind);

        let sql = format!(
            "SELECT id, title, description, status, priority, customer_id, user_id, assigned_to,
                    tags, comments, attachments, resolved_at, closed_at, created_at, updated_at
             FROM tickets WHERE {}",
            clauses.join(" AND ")
        );

        let conn = self.conn.lock();
        let ticket = conn
            .query_row(&sql, params_from_iter(bind.iter().map(|p| p.as_ref())), row_to_ticket)
            .optional()
            .context("failed to query ticket")?;
        Ok(ticket)
    }

    /// Unscoped lookup for the shared-secret processor channel, which
    /// authenticates as the system rather than as a tenant user.
    pub fn get_any(&self, id: Uuid) -> Result<Option<Ticket>> {
        let conn = self.conn.lock();
        let ticket = conn
            .query_row(
                "SELECT id, title, description, status, priority, customer_id, user_id, assigned_to,
                        tags, comments, attachments, resolved_at, closed_at, created_at, updated_at
                 FROM tickets WHERE id = ?1",
                params![id.to_string()],
                row_to_ticket,
            )
            .optional()
            .context("failed to query ticket")?;
        Ok(ticket)
    }

    /// Scoped, filtered, paginated listing.
    pub fn list(
        &self,
        scope: &TicketScope,
        query: &ListTicketsQuery,
    ) -> Result<(Vec<Ticket>, Pagination)> {
        let mut clauses: Vec<String> = Vec::new();
        let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        scope.push_sql(&mut clauses, &mut bind);

        if let Some(status) = query.status {
            clauses.push("status = ?".to_string());
            bind.push(Box::new(status.as_str().to_string()));
        }
        if let Some(priority) = query.priority {
            clauses.push("priority = ?".to_string());
            bind.push(Box::new(priority.as_str().to_string()));
        }
        if let Some(tag) = &query.tag {
            // Tags live in a JSON array column; match the quoted element.
            clauses.push("tags LIKE ?".to_string());
            bind.push(Box::new(format!("%\"{}\"%", tag.replace('"', ""))));
        }
        if let Some(search) = &query.search {
            clauses.push("(LOWER(title) LIKE ? OR LOWER(description) LIKE ?)".to_string());
            let needle = format!("%{}%", search.to_lowercase());
            bind.push(Box::new(needle.clone()));
            bind.push(Box::new(needle));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let sort_expr = query.sort_by.unwrap_or(SortKey::CreatedAt).order_expr();
        let sort_dir = query.sort_dir.unwrap_or(SortDir::Desc).sql();
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(10).clamp(1, 100);
        let offset = (page - 1) as u64 * limit as u64;

        let conn = self.conn.lock();

        let total: u64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM tickets{where_sql}"),
            params_from_iter(bind.iter().map(|p| p.as_ref())),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT id, title, description, status, priority, customer_id, user_id, assigned_to,
                    tags, comments, attachments, resolved_at, closed_at, created_at, updated_at
             FROM tickets{where_sql} ORDER BY {sort_expr} {sort_dir} LIMIT {limit} OFFSET {offset}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind.iter().map(|p| p.as_ref())), row_to_ticket)?;
        let tickets = rows.collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((tickets, Pagination::new(page, limit, total)))
    }

    /// Merge an update into a scoped ticket. Returns `None` when the ticket
    /// is outside the caller's scope. Lifecycle stamps are applied on the
    /// first transition only; re-entering a status never re-stamps.
    pub fn update(
        &self,
        id: Uuid,
        scope: &TicketScope,
        req: &UpdateTicketRequest,
    ) -> Result<Option<UpdateOutcome>> {
        let Some(mut ticket) = self.get(id, scope)? else {
            return Ok(None);
        };

        let mut changed = Vec::new();
        if let Some(title) = &req.title {
            ticket.title = title.trim().to_string();
            changed.push("title");
        }
        if let Some(description) = &req.description {
            ticket.description = description.trim().to_string();
            changed.push("description");
        }
        if let Some(priority) = req.priority {
            ticket.priority = priority;
            changed.push("priority");
        }
        if let Some(tags) = &req.tags {
            ticket.tags = tags.clone();
            changed.push("tags");
        }
        if let Some(status) = req.status {
            ticket.status = status;
            changed.push("status");
        }
        if let Some(assigned_to) = req.assigned_to {
            ticket.assigned_to = assigned_to;
            changed.push("assignedTo");
        }

        stamp_transitions(&mut ticket);
        ticket.updated_at = now_rfc3339();
        self.persist(&ticket)?;
        Ok(Some(UpdateOutcome {
            ticket,
            changed_fields: changed,
        }))
    }

    /// Remove a ticket within the tenant. Returns whether a row was deleted.
    pub fn delete(&self, id: Uuid, scope: &TicketScope) -> Result<bool> {
        let mut clauses = vec!["id = ?".to_string()];
        let mut bind: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(id.to_string())];
        scope.push_sql(&mut clauses, &mut bind);

        let conn = self.conn.lock();
        let affected = conn.execute(
            &format!("DELETE FROM tickets WHERE {}", clauses.join(" AND ")),
            params_from_iter(bind.iter().map(|p| p.as_ref())),
        )?;
        Ok(affected > 0)
    }

    /// Append a comment to a scoped ticket.
    pub fn add_comment(
        &self,
        id: Uuid,
        scope: &TicketScope,
        author: Uuid,
        content: &str,
    ) -> Result<Option<Ticket>> {
        let Some(mut ticket) = self.get(id, scope)? else {
            return Ok(None);
        };
        ticket.comments.push(Comment {
            user_id: author,
            content: content.trim().to_string(),
            created_at: now_rfc3339(),
        });
        ticket.updated_at = now_rfc3339();
        self.persist(&ticket)?;
        Ok(Some(ticket))
    }

    /// Set or clear the assignee on a tenant-scoped ticket.
    pub fn set_assignment(
        &self,
        id: Uuid,
        scope: &TicketScope,
        assignee: Option<Uuid>,
    ) -> Result<Option<Ticket>> {
        let Some(mut ticket) = self.get(id, scope)? else {
            return Ok(None);
        };
        ticket.assigned_to = assignee;
        ticket.updated_at = now_rfc3339();
        self.persist(&ticket)?;
        Ok(Some(ticket))
    }

    /// Tenant-wide status and priority counts.
    pub fn stats(&self, customer_id: &str) -> Result<serde_json::Value> {
        let conn = self.conn.lock();

        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM tickets WHERE customer_id = ?1",
            params![customer_id],
            |row| row.get(0),
        )?;

        let mut status_stats = serde_json::Map::new();
        for status in TicketStatus::ALL {
            let count: u64 = conn.query_row(
                "SELECT COUNT(*) FROM tickets WHERE customer_id = ?1 AND status = ?2",
                params![customer_id, status.as_str()],
                |row| row.get(0),
            )?;
            status_stats.insert(status.as_str().to_string(), json!(count));
        }

        let mut priority_stats = serde_json::Map::new();
        for priority in Priority::ALL {
            let count: u64 = conn.query_row(
                "SELECT COUNT(*) FROM tickets WHERE customer_id = ?1 AND priority = ?2",
                params![customer_id, priority.as_str()],
                |row| row.get(0),
            )?;
            priority_stats.insert(priority.as_str().to_string(), json!(count));
        }

        Ok(json!({
            "totalTickets": total,
            "statusStats": status_stats,
            "priorityStats": priority_stats,
        }))
    }

    fn persist(&self, ticket: &Ticket) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE tickets SET title = ?2, description = ?3, status = ?4, priority = ?5,
                 assigned_to = ?6, tags = ?7, comments = ?8, attachments = ?9,
                 resolved_at = ?10, closed_at = ?11, updated_at = ?12
             WHERE id = ?1",
            params![
                ticket.id.to_string(),
                ticket.title,
                ticket.description,
                ticket.status.as_str(),
                ticket.priority.as_str(),
                ticket.assigned_to.map(|id| id.to_string()),
                serde_json::to_string(&ticket.tags)?,
                serde_json::to_string(&ticket.comments)?,
                serde_json::to_string(&ticket.attachments)?,
                ticket.resolved_at,
                ticket.closed_at,
                ticket.updated_at,
            ],
        )
        .context("failed to persist ticket")?;
        Ok(())
    }
}

/// First transition into resolved/closed stamps the matching timestamp.
/// Existing stamps are kept even if the ticket later leaves the status.
fn stamp_transitions(ticket: &mut Ticket) {
    if ticket.status == TicketStatus::Resolved && ticket.resolved_at.is_none() {
        ticket.resolved_at = Some(now_rfc3339());
    }
    if ticket.status == TicketStatus::Closed && ticket.closed_at.is_none() {
        ticket.closed_at = Some(now_rfc3339());
    }
}

fn parse_uuid(idx: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, value: &str) -> rusqlite::Result<T> {
    serde_json::from_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_ticket(row: &Row) -> rusqlite::Result<Ticket> {
    let id: String = row.get(0)?;
    let status: String = row.get(3)?;
    let priority: String = row.get(4)?;
    let user_id: String = row.get(6)?;
    let assigned_to: Option<String> = row.get(7)?;
    let tags: String = row.get(8)?;
    let comments: String = row.get(9)?;
    let attachments: String = row.get(10)?;

    Ok(Ticket {
        id: parse_uuid(0, &id)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: TicketStatus::from_str(&status).unwrap_or(TicketStatus::Open),
        priority: Priority::from_str(&priority).unwrap_or(Priority::Medium),
        customer_id: row.get(5)?,
        user_id: parse_uuid(6, &user_id)?,
        assigned_to: assigned_to.map(|v| parse_uuid(7, &v)).transpose()?,
        tags: parse_json::<Vec<String>>(8, &tags)?,
        comments: parse_json::<Vec<Comment>>(9, &comments)?,
        attachments: parse_json::<Vec<Attachment>>(10, &attachments)?,
        resolved_at: row.get(11)?,
        closed_at: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn store() -> (TicketStore, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        (TicketStore::open(file.path()).unwrap(), file)
    }

    fn create_req(title: &str) -> CreateTicketRequest {
        serde_json::from_str(&format!(
            r#"{{"title":"{title}","description":"something broke"}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_create_and_scoped_get() {
        let (store, _file) = store();
        let owner = Uuid::new_v4();
        let ticket = store.create(&create_req("vpn down"), "acme", owner).unwrap();

        let tenant = TicketScope::tenant_wide("acme");
        assert!(store.get(ticket.id, &tenant).unwrap().is_some());

        let other_tenant = TicketScope::tenant_wide("globex");
        assert!(store.get(ticket.id, &other_tenant).unwrap().is_none());

        let stranger = TicketScope {
            customer_id: "acme".to_string(),
            owner_id: Some(Uuid::new_v4()),
        };
        assert!(store.get(ticket.id, &stranger).unwrap().is_none());

        let owner_scope = TicketScope {
            customer_id: "acme".to_string(),
            owner_id: Some(owner),
        };
        assert!(store.get(ticket.id, &owner_scope).unwrap().is_some());
    }

    #[test]
    fn test_list_filters_and_pagination() {
        let (store, _file) = store();
        let owner = Uuid::new_v4();
        for i in 0..3 {
            store
                .create(&create_req(&format!("issue {i}")), "acme", owner)
                .unwrap();
        }
        store.create(&create_req("other tenant"), "globex", owner).unwrap();

        let scope = TicketScope::tenant_wide("acme");
        let query = ListTicketsQuery {
            limit: Some(1),
            ..Default::default()
        };
        let (page, pagination) = store.list(&scope, &query).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(pagination.total, 3);
        assert_eq!(pagination.pages, 3);

        let query = ListTicketsQuery {
            search: Some("ISSUE 1".into()),
            ..Default::default()
        };
        let (hits, pagination) = store.list(&scope, &query).unwrap();
        assert_eq!(pagination.total, 1);
        assert_eq!(hits[0].title, "issue 1");
    }

    #[test]
    fn test_list_tag_filter() {
        let (store, _file) = store();
        let owner = Uuid::new_v4();
        let mut req = create_req("tagged");
        req.tags = vec!["billing".into(), "urgent".into()];
        store.create(&req, "acme", owner).unwrap();
        store.create(&create_req("untagged"), "acme", owner).unwrap();

        let scope = TicketScope::tenant_wide("acme");
        let query = ListTicketsQuery {
            tag: Some("billing".into()),
            ..Default::default()
        };
        let (hits, _) = store.list(&scope, &query).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "tagged");
    }

    #[test]
    fn test_status_stamps_set_once() {
        let (store, _file) = store();
        let ticket = store
            .create(&create_req("flaky build"), "acme", Uuid::new_v4())
            .unwrap();
        let scope = TicketScope::tenant_wide("acme");

        let resolve = UpdateTicketRequest {
            status: Some(TicketStatus::Resolved),
            ..Default::default()
        };
        let first = store.update(ticket.id, &scope, &resolve).unwrap().unwrap();
        let stamp = first.ticket.resolved_at.clone().unwrap();

        let reopen = UpdateTicketRequest {
            status: Some(TicketStatus::Open),
            ..Default::default()
        };
        let reopened = store.update(ticket.id, &scope, &reopen).unwrap().unwrap();
        assert_eq!(reopened.ticket.resolved_at.as_deref(), Some(stamp.as_str()));

        let second = store.update(ticket.id, &scope, &resolve).unwrap().unwrap();
        assert_eq!(second.ticket.resolved_at.as_deref(), Some(stamp.as_str()));
    }

    #[test]
    fn test_sort_by_priority_uses_severity_order() {
        let (store, _file) = store();
        let owner = Uuid::new_v4();
        for priority in ["high", "low", "medium"] {
            let req: CreateTicketRequest = serde_json::from_str(&format!(
                r#"{{"title":"{priority} one","description":"x","priority":"{priority}"}}"#
            ))
            .unwrap();
            store.create(&req, "acme", owner).unwrap();
        }

        let scope = TicketScope::tenant_wide("acme");
        let query = ListTicketsQuery {
            sort_by: Some(SortKey::Priority),
            sort_dir: Some(SortDir::Asc),
            ..Default::default()
        };
        let (tickets, _) = store.list(&scope, &query).unwrap();
        let order: Vec<_> = tickets.iter().map(|t| t.priority.as_str()).collect();
        assert_eq!(order, ["low", "medium", "high"]);
    }

    #[test]
    fn test_create_in_terminal_status_is_stamped() {
        let (store, _file) = store();
        let req: CreateTicketRequest = serde_json::from_str(
            r#"{"title":"dup of 42","description":"already fixed","status":"resolved"}"#,
        )
        .unwrap();
        let ticket = store.create(&req, "acme", Uuid::new_v4()).unwrap();
        assert!(ticket.resolved_at.is_some());
        assert!(ticket.closed_at.is_none());

        let scope = TicketScope::tenant_wide("acme");
        let stored = store.get(ticket.id, &scope).unwrap().unwrap();
        assert_eq!(stored.resolved_at, ticket.resolved_at);
    }

    #[test]
    fn test_update_out_of_scope_is_none() {
        let (store, _file) = store();
        let ticket = store
            .create(&create_req("secret"), "acme", Uuid::new_v4())
            .unwrap();
        let other = TicketScope::tenant_wide("globex");
        let req = UpdateTicketRequest {
            title: Some("leak".into()),
            ..Default::default()
        };
        assert!(store.update(ticket.id, &other, &req).unwrap().is_none());
        assert!(!store.delete(ticket.id, &other).unwrap());
    }

    #[test]
    fn test_comments_append() {
        let (store, _file) = store();
        let owner = Uuid::new_v4();
        let ticket = store.create(&create_req("typo"), "acme", owner).unwrap();
        let scope = TicketScope::tenant_wide("acme");

        let updated = store
            .add_comment(ticket.id, &scope, owner, "fixed in trunk")
            .unwrap()
            .unwrap();
        assert_eq!(updated.comments.len(), 1);
        assert_eq!(updated.comments[0].content, "fixed in trunk");

        let again = store
            .add_comment(ticket.id, &scope, owner, "confirmed")
            .unwrap()
            .unwrap();
        assert_eq!(again.comments.len(), 2);
    }

    #[test]
    fn test_assignment_set_and_clear() {
        let (store, _file) = store();
        let ticket = store
            .create(&create_req("assign me"), "acme", Uuid::new_v4())
            .unwrap();
        let scope = TicketScope::tenant_wide("acme");
        let agent = Uuid::new_v4();

        let assigned = store
            .set_assignment(ticket.id, &scope, Some(agent))
            .unwrap()
            .unwrap();
        assert_eq!(assigned.assigned_to, Some(agent));

        let cleared = store.set_assignment(ticket.id, &scope, None).unwrap().unwrap();
        assert!(cleared.assigned_to.is_none());
    }

    #[test]
    fn test_stats_scoped_to_tenant() {
        let (store, _file) = store();
        let owner = Uuid::new_v4();
        let t1 = store.create(&create_req("a"), "acme", owner).unwrap();
        store.create(&create_req("b"), "acme", owner).unwrap();
        store.create(&create_req("c"), "globex", owner).unwrap();

        let scope = TicketScope::tenant_wide("acme");
        store
            .update(
                t1.id,
                &scope,
                &UpdateTicketRequest {
                    status: Some(TicketStatus::Resolved),
                    priority: Some(Priority::High),
                    ..Default::default()
                },
            )
            .unwrap();

        let stats = store.stats("acme").unwrap();
        assert_eq!(stats["totalTickets"], 2);
        assert_eq!(stats["statusStats"]["open"], 1);
        assert_eq!(stats["statusStats"]["resolved"], 1);
        assert_eq!(stats["priorityStats"]["high"], 1);
        assert_eq!(stats["priorityStats"]["medium"], 1);
    }
}
