//! Authentication Models
//! User accounts, roles, and token claim structures shared by both services.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User account. One tenant (`customer_id`) per user; the tenant is fixed
/// at creation. Users are never deleted, only deactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role: Role,
    pub customer_id: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub created_at: String,
}

/// Roles for tenant-scoped RBAC.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    User,  // own tickets only
    Agent, // own tickets only; reserved for assignment workflows
    Admin, // full access within the tenant
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "User",
            Role::Agent => "Agent",
            Role::Admin => "Admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "User" => Some(Role::User),
            "Agent" => Some(Role::Agent),
            "Admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// JWT claims payload. Wire names are camelCase so both services and any
/// external consumer of the verify endpoint see the same identity shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: Uuid,
    pub customer_id: String,
    pub role: Role,
    pub email: String,
    pub iat: usize,
    pub exp: usize,
}

/// Public projection of a user (no password hash).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub customer_id: String,
    pub is_active: bool,
}

impl UserProfile {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            customer_id: user.customer_id.clone(),
            is_active: user.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub customer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: UserProfile,
}

/// Body of the machine-to-machine verify endpoint. `token` defaults to
/// empty so an absent field is a validation failure, not a parse failure.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub token: String,
}

/// Identity fields returned by the verify endpoint, consumed by the ticket
/// service's auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedIdentity {
    pub user_id: Uuid,
    pub customer_id: String,
    pub role: Role,
    pub email: String,
}

impl VerifiedIdentity {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            customer_id: user.customer_id.clone(),
            role: user.role,
            email: user.email.clone(),
        }
    }

    /// Claims carry the same identity fields plus timestamps; drop the
    /// timestamps when handing identity to the authorization layer.
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.user_id,
            customer_id: claims.customer_id.clone(),
            role: claims.role,
            email: claims.email.clone(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<VerifiedIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Admin update of a user within the caller's tenant. All fields optional;
/// only supplied fields change.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
