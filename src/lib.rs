//! Multi-tenant support-desk backend.
//!
//! Two services share this library: the auth service (registration, login,
//! token issue/verify, tenant-scoped user management) and the ticket
//! service (tickets, comments, assignment, audit trail, webhooks). Every
//! data path in the ticket service is scoped to the caller's tenant and
//! role before it touches storage.

pub mod app;
pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod tenancy;
pub mod tickets;
pub mod webhooks;
