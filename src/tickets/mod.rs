//! Ticket domain: models, validation, persistence, and HTTP handlers.

pub mod api;
pub mod models;
pub mod store;
pub mod validate;

pub use models::{Priority, Ticket, TicketStatus};
pub use store::TicketStore;
