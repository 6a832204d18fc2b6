//! HTTP API handlers for mosifra-web

pub mod accounts;
pub mod admin;
pub mod auth;
pub mod health;
pub mod invitations;
pub mod profiles;

pub use auth::{auth_middleware, CurrentUser};
pub use health::health_routes;
