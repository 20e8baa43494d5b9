//! Tenant/role authorization layer.
//!
//! Every query against tenant-owned data goes through a [`TicketScope`]
//! derived from the caller's verified identity. The scope always pins the
//! tenant; for non-admins it additionally pins ownership, so a ticket in
//! another tenant or owned by another user is indistinguishable from a
//! nonexistent one.

use crate::auth::models::VerifiedIdentity;
use uuid::Uuid;

/// Mandatory filter applied to ticket reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketScope {
    pub customer_id: String,
    /// `Some(caller)` for non-admins: restrict to tickets they created.
    pub owner_id: Option<Uuid>,
}

impl TicketScope {
    pub fn for_caller(identity: &VerifiedIdentity) -> Self {
        Self {
            customer_id: identity.customer_id.clone(),
            owner_id: if identity.is_admin() {
                None
            } else {
                Some(identity.user_id)
            },
        }
    }

    /// Tenant-wide scope regardless of role; used only where an endpoint
    /// has already gated on admin (stats, webhook processing).
    pub fn tenant_wide(customer_id: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            owner_id: None,
        }
    }

    /// Append this scope's conditions to a WHERE clause under construction.
    pub fn push_sql(&self, clauses: &mut Vec<String>, params: &mut Vec<Box<dyn rusqlite::ToSql>>) {
        clauses.push("customer_id = ?".to_string());
        params.push(Box::new(self.customer_id.clone()));
        if let Some(owner) = self.owner_id {
            clauses.push("user_id = ?".to_string());
            params.push(Box::new(owner.to_string()));
        }
    }
}
