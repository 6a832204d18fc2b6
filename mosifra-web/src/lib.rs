//! mosifra-web library - Mosifra platform service
//!
//! HTTP/JSON backend connecting students, companies and institutions:
//! email-verified registration and login (two-factor codes), CSV-driven
//! student invitations, and the admin approval pipeline for organisation
//! accounts.

use std::sync::Arc;

use axum::Router;
use mosifra_common::config::ServerConfig;
use mosifra_common::email::Mailer;
use sqlx::SqlitePool;

pub mod api;
pub mod db;
pub mod password;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Outbound mail (fire-and-forget at call sites)
    pub mailer: Arc<dyn Mailer>,
    /// Resolved service configuration
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, mailer: Arc<dyn Mailer>, config: ServerConfig) -> Self {
        Self {
            db,
            mailer,
            config: Arc::new(config),
        }
    }
}

/// Build application router
///
/// Public routes cover the pre-authentication flows (registration, login,
/// two-factor, invitation acceptance, CSV preview/template); everything
/// else sits behind the bearer-token session middleware.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    // Routes that require an authenticated session
    let protected = Router::new()
        .route("/api/auth/logout", post(api::accounts::logout))
        .route("/api/profiles/me", get(api::profiles::me))
        .route("/api/profiles/students", get(api::profiles::students))
        .route("/api/invitations/upload", post(api::invitations::upload))
        .route("/api/admin/pending", get(api::admin::pending_accounts))
        .route(
            "/api/admin/accounts/:kind/:id/decision",
            post(api::admin::decide),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .route("/api/auth/register", post(api::accounts::register))
        .route("/api/auth/login", post(api::accounts::login))
        .route("/api/auth/two-factor", post(api::accounts::verify_two_factor))
        .route(
            "/api/auth/two-factor/resend",
            post(api::accounts::resend_two_factor),
        )
        .route(
            "/api/auth/password-reset/request",
            post(api::accounts::password_reset_request),
        )
        .route(
            "/api/auth/password-reset/confirm",
            post(api::accounts::password_reset_confirm),
        )
        .route(
            "/api/invitations/accept/:token",
            get(api::invitations::accept_details).post(api::invitations::accept),
        )
        .route("/api/invitations/preview", post(api::invitations::preview))
        .route("/api/invitations/template", get(api::invitations::template))
        .merge(api::health::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
