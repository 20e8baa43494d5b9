//! Append-only audit log storage.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

use crate::audit::models::{AuditAction, AuditEntry, AuditEvent, AuditQuery, ResourceType};
use crate::tickets::models::{now_rfc3339, Pagination};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS audit_log (
    id TEXT PRIMARY KEY,
    action TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    customer_id TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '{}',
    ip_address TEXT,
    user_agent TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_tenant_time ON audit_log(customer_id, created_at DESC);
"#;

pub struct AuditStore {
    conn: Arc<Mutex<Connection>>,
}

impl AuditStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open audit database")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize audit schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn append(&self, event: &AuditEvent) -> Result<AuditEntry> {
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            action: event.action,
            resource_type: event.resource_type,
            resource_id: event.resource_id.clone(),
            user_id: event.user_id,
            customer_id: event.customer_id.clone(),
            details: event.details.clone(),
            ip_address: event.ip_address.clone(),
            user_agent: event.user_agent.clone(),
            created_at: now_rfc3339(),
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO audit_log (id, action, resource_type, resource_id, user_id, customer_id,
                 details, ip_address, user_agent, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.id.to_string(),
                entry.action.as_str(),
                entry.resource_type.as_str(),
                entry.resource_id,
                entry.user_id.to_string(),
                entry.customer_id,
                serde_json::to_string(&entry.details)?,
                entry.ip_address,
                entry.user_agent,
                entry.created_at,
            ],
        )
        .context("failed to append audit entry")?;
        Ok(entry)
    }

    /// Newest-first, tenant-scoped, optionally filtered by action and
    /// resource type.
    pub fn list(
        &self,
        customer_id: &str,
        query: &AuditQuery,
    ) -> Result<(Vec<AuditEntry>, Pagination)> {
        let mut clauses = vec!["customer_id = ?".to_string()];
        let mut bind: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(customer_id.to_string())];

        if let Some(action) = query.action {
            clauses.push("action = ?".to_string());
            bind.push(Box::new(action.as_str().to_string()));
        }
        if let Some(resource_type) = query.resource_type {
            clauses.push("resource_type = ?".to_string());
            bind.push(Box::new(resource_type.as_str().to_string()));
        }

        let where_sql = clauses.join(" AND ");
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) as u64 * limit as u64;

        let conn = self.conn.lock();
        let total: u64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM audit_log WHERE {where_sql}"),
            params_from_iter(bind.iter().map(|p| p.as_ref())),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT id, action, resource_type, resource_id, user_id, customer_id, details,
                    ip_address, user_agent, created_at
             FROM audit_log WHERE {where_sql}
             ORDER BY created_at DESC LIMIT {limit} OFFSET {offset}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind.iter().map(|p| p.as_ref())), row_to_entry)?;
        let entries = rows.collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((entries, Pagination::new(page, limit, total)))
    }
}

fn row_to_entry(row: &Row) -> rusqlite::Result<AuditEntry> {
    let conversion = |idx: usize, e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };

    let id: String = row.get(0)?;
    let action: String = row.get(1)?;
    let resource_type: String = row.get(2)?;
    let user_id: String = row.get(4)?;
    let details: String = row.get(6)?;

    let action = match action.as_str() {
        "created" => AuditAction::Created,
        "updated" => AuditAction::Updated,
        "deleted" => AuditAction::Deleted,
        "assigned" => AuditAction::Assigned,
        _ => AuditAction::Commented,
    };
    let resource_type = match resource_type.as_str() {
        "user" => ResourceType::User,
        "comment" => ResourceType::Comment,
        _ => ResourceType::Ticket,
    };

    Ok(AuditEntry {
        id: Uuid::parse_str(&id).map_err(|e| conversion(0, Box::new(e)))?,
        action,
        resource_type,
        resource_id: row.get(3)?,
        user_id: Uuid::parse_str(&user_id).map_err(|e| conversion(4, Box::new(e)))?,
        customer_id: row.get(5)?,
        details: serde_json::from_str(&details).map_err(|e| conversion(6, Box::new(e)))?,
        ip_address: row.get(7)?,
        user_agent: row.get(8)?,
        created_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn store() -> (AuditStore, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        (AuditStore::open(file.path()).unwrap(), file)
    }

    fn event(customer: &str, action: AuditAction) -> AuditEvent {
        AuditEvent {
            action,
            resource_type: ResourceType::Ticket,
            resource_id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4(),
            customer_id: customer.to_string(),
            details: json!({"title": "sample"}),
            ip_address: Some("10.0.0.1".into()),
            user_agent: None,
        }
    }

    #[test]
    fn test_append_and_tenant_scoped_list() {
        let (store, _file) = store();
        store.append(&event("acme", AuditAction::Created)).unwrap();
        store.append(&event("acme", AuditAction::Updated)).unwrap();
        store.append(&event("globex", AuditAction::Created)).unwrap();

        let (entries, pagination) = store.list("acme", &AuditQuery::default()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(pagination.total, 2);
        assert!(entries.iter().all(|e| e.customer_id == "acme"));
    }

    #[test]
    fn test_action_filter_and_pagination() {
        let (store, _file) = store();
        for _ in 0..3 {
            store.append(&event("acme", AuditAction::Created)).unwrap();
        }
        store.append(&event("acme", AuditAction::Deleted)).unwrap();

        let query = AuditQuery {
            action: Some(AuditAction::Created),
            limit: Some(2),
            ..Default::default()
        };
        let (entries, pagination) = store.list("acme", &query).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(pagination.total, 3);
        assert_eq!(pagination.pages, 2);
        assert!(entries.iter().all(|e| e.action == AuditAction::Created));
    }
}
