//! Webhooks: tenant subscription configs, outbound delivery, and the
//! shared-secret inbound processor channel.

pub mod api;
pub mod dispatch;
pub mod models;
pub mod store;

pub use dispatch::WebhookDispatcher;
pub use models::{WebhookConfig, WebhookEvent};
pub use store::WebhookStore;
