//! SQLite-backed webhook subscription storage, tenant-scoped throughout.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::tickets::models::now_rfc3339;
use crate::webhooks::models::{WebhookConfig, WebhookEvent};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS webhook_configs (
    id TEXT PRIMARY KEY,
    customer_id TEXT NOT NULL,
    url TEXT NOT NULL,
    events TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_webhook_configs_tenant ON webhook_configs(customer_id);
"#;

pub struct WebhookStore {
    conn: Arc<Mutex<Connection>>,
}

impl WebhookStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open webhook database")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize webhook schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn create(
        &self,
        customer_id: &str,
        created_by: Uuid,
        url: &str,
        events: &[WebhookEvent],
        is_active: bool,
    ) -> Result<WebhookConfig> {
        let now = now_rfc3339();
        let config = WebhookConfig {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            url: url.trim().to_string(),
            events: events.to_vec(),
            is_active,
            created_by,
            created_at: now.clone(),
            updated_at: now,
        };
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO webhook_configs (id, customer_id, url, events, is_active, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                config.id.to_string(),
                config.customer_id,
                config.url,
                serde_json::to_string(&config.events)?,
                config.is_active as i64,
                config.created_by.to_string(),
                config.created_at,
                config.updated_at,
            ],
        )
        .context("failed to insert webhook config")?;
        Ok(config)
    }

    pub fn list_for_tenant(&self, customer_id: &str) -> Result<Vec<WebhookConfig>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, customer_id, url, events, is_active, created_by, created_at, updated_at
             FROM webhook_configs WHERE customer_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![customer_id], row_to_config)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn update_for_tenant(
        &self,
        id: Uuid,
        customer_id: &str,
        url: &str,
        events: &[WebhookEvent],
        is_active: Option<bool>,
    ) -> Result<Option<WebhookConfig>> {
        let conn = self.conn.lock();
        let existing = conn
            .query_row(
                "SELECT id, customer_id, url, events, is_active, created_by, created_at, updated_at
                 FROM webhook_configs WHERE id = ?1 AND customer_id = ?2",
                params![id.to_string(), customer_id],
                row_to_config,
            )
            .optional()?;
        let Some(mut config) = existing else {
            return Ok(None);
        };

        config.url = url.trim().to_string();
        config.events = events.to_vec();
        if let Some(active) = is_active {
            config.is_active = active;
        }
        config.updated_at = now_rfc3339();

        conn.execute(
            "UPDATE webhook_configs SET url = ?2, events = ?3, is_active = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                config.id.to_string(),
                config.url,
                serde_json::to_string(&config.events)?,
                config.is_active as i64,
                config.updated_at,
            ],
        )?;
        Ok(Some(config))
    }

    pub fn delete_for_tenant(&self, id: Uuid, customer_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let affected = conn.execute(
            "DELETE FROM webhook_configs WHERE id = ?1 AND customer_id = ?2",
            params![id.to_string(), customer_id],
        )?;
        Ok(affected > 0)
    }

    /// Active configs in the tenant subscribed to the given event.
    pub fn subscribers(&self, customer_id: &str, event: WebhookEvent) -> Result<Vec<WebhookConfig>> {
        let configs = self.list_for_tenant(customer_id)?;
        Ok(configs
            .into_iter()
            .filter(|c| c.is_active && c.events.contains(&event))
            .collect())
    }
}

fn row_to_config(row: &Row) -> rusqlite::Result<WebhookConfig> {
    let id: String = row.get(0)?;
    let events: String = row.get(3)?;
    let is_active: i64 = row.get(4)?;
    let created_by: String = row.get(5)?;
    let uuid = |idx: usize, v: &str| {
        Uuid::parse_str(v).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    };
    Ok(WebhookConfig {
        id: uuid(0, &id)?,
        customer_id: row.get(1)?,
        url: row.get(2)?,
        events: serde_json::from_str(&events).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        is_active: is_active != 0,
        created_by: uuid(5, &created_by)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn store() -> (WebhookStore, NamedTempFile) {
        let file = NamedTempFile::new().unwrap();
        (WebhookStore::open(file.path()).unwrap(), file)
    }

    #[test]
    fn test_crud_is_tenant_scoped() {
        let (store, _file) = store();
        let admin = Uuid::new_v4();
        let config = store
            .create("acme", admin, "https://acme.test/hook", &[WebhookEvent::TicketCreated], true)
            .unwrap();
        assert_eq!(config.created_by, admin);

        assert_eq!(store.list_for_tenant("acme").unwrap().len(), 1);
        assert!(store.list_for_tenant("globex").unwrap().is_empty());

        let events = [WebhookEvent::TicketUpdated];
        assert!(store
            .update_for_tenant(config.id, "globex", "https://acme.test/hook2", &events, None)
            .unwrap()
            .is_none());
        let updated = store
            .update_for_tenant(config.id, "acme", "https://acme.test/hook2", &events, None)
            .unwrap()
            .unwrap();
        assert_eq!(updated.url, "https://acme.test/hook2");
        assert_eq!(updated.events, vec![WebhookEvent::TicketUpdated]);

        assert!(!store.delete_for_tenant(config.id, "globex").unwrap());
        assert!(store.delete_for_tenant(config.id, "acme").unwrap());
        assert!(store.list_for_tenant("acme").unwrap().is_empty());
    }

    #[test]
    fn test_subscribers_filter_event_and_active() {
        let (store, _file) = store();
        let admin = Uuid::new_v4();
        store
            .create("acme", admin, "https://a.test", &[WebhookEvent::TicketCreated], true)
            .unwrap();
        store
            .create(
                "acme",
                admin,
                "https://b.test",
                &[WebhookEvent::TicketDeleted, WebhookEvent::TicketCreated],
                true,
            )
            .unwrap();
        let inactive = store
            .create("acme", admin, "https://c.test", &[WebhookEvent::TicketCreated], false)
            .unwrap();
        assert!(!inactive.is_active);

        let subs = store.subscribers("acme", WebhookEvent::TicketCreated).unwrap();
        assert_eq!(subs.len(), 2);
        let subs = store.subscribers("acme", WebhookEvent::TicketDeleted).unwrap();
        assert_eq!(subs.len(), 1);
        assert!(store.subscribers("globex", WebhookEvent::TicketCreated).unwrap().is_empty());
    }
}
