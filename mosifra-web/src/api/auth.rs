//! Authentication middleware for mosifra-web
//!
//! Resolves the `Authorization: Bearer <token>` header to a stored auth
//! session and makes the current user available to handlers as a request
//! extension. Applied to protected routes only; the pre-authentication
//! flows (registration, login, two-factor, invitation acceptance) and the
//! health endpoint stay public.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use mosifra_common::db::models::User;
use serde_json::json;

use crate::{db, AppState};

/// The authenticated user, inserted by [`auth_middleware`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// The raw bearer token of the current session (used by logout)
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Authentication middleware
///
/// Returns 401 Unauthorized when the header is missing, malformed, or does
/// not match a stored session.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MissingToken)?
        .trim()
        .to_string();

    let user = db::sessions::find_user_by_token(&state.db, &token)
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .ok_or(AuthError::InvalidToken)?;

    request.extensions_mut().insert(CurrentUser(user));
    request.extensions_mut().insert(SessionToken(token));

    Ok(next.run(request).await)
}

/// Authentication error types for HTTP responses
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "Missing bearer token".to_string(),
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Invalid or expired session".to_string(),
            ),
            AuthError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Authentication error: {}", msg),
            ),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
