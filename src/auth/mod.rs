//! Authentication: credential store, token service, gateway endpoints,
//! and the auth-service request gate.

pub mod api;
pub mod middleware;
pub mod models;
pub mod token;
pub mod user_store;

pub use api::AuthServiceState;
pub use models::{Claims, Role, User, VerifiedIdentity};
pub use token::TokenService;
pub use user_store::UserStore;
