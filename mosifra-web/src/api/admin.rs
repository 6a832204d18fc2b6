//! Admin approval pipeline for organisation accounts
//!
//! Company and institution registrations stay unapproved until a staff
//! account reviews them. Approval is one-way; rejection deletes the owning
//! account outright (cascading to the profile) and notifies the address
//! with an optional reviewer message.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use mosifra_common::db::models::{OrganisationKind, OrganisationProfile};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::auth::CurrentUser;
use crate::{db, AppState};

const SUBJECT_APPROVED: &str = "Votre compte Mosifra a été approuvé";
const SUBJECT_REJECTED: &str = "Votre demande de compte Mosifra";

/// Pending organisation entry for the review queue
#[derive(Debug, Serialize)]
pub struct PendingAccount {
    pub id: Uuid,
    pub kind: OrganisationKind,
    pub organisation_name: String,
    pub email: String,
    pub location: String,
    pub country_code: String,
    pub website: String,
    pub description: String,
}

/// GET /api/admin/pending
///
/// Organisations awaiting a decision, companies and institutions merged.
pub async fn pending_accounts(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<PendingAccount>>, AdminError> {
    require_staff(&user)?;

    let pending = db::profiles::list_pending_with_email(&state.db).await?;
    let accounts = pending
        .into_iter()
        .map(|(profile, email)| PendingAccount {
            id: profile.id,
            kind: profile.kind,
            organisation_name: profile.organisation_name,
            email,
            location: profile.location,
            country_code: profile.country_code,
            website: profile.website,
            description: profile.description,
        })
        .collect();

    Ok(Json(accounts))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub action: Decision,
    /// Optional reviewer note, included in the rejection email
    #[serde(default)]
    pub message: Option<String>,
}

/// POST /api/admin/accounts/:kind/:id/decision
pub async fn decide(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<serde_json::Value>, AdminError> {
    require_staff(&user)?;

    let kind = OrganisationKind::parse(&kind)
        .ok_or_else(|| AdminError::Validation(format!("Unknown account kind: {}", kind)))?;

    let profile = db::profiles::find_organisation_by_id(&state.db, id)
        .await?
        .filter(|profile| profile.kind == kind)
        .ok_or_else(|| AdminError::NotFound("Unknown account".to_string()))?;

    let owner = db::users::find_by_id(&state.db, profile.user_id)
        .await?
        .ok_or_else(|| AdminError::Internal("Profile without owning account".to_string()))?;

    match request.action {
        Decision::Approve => {
            if profile.is_approved {
                return Err(AdminError::Conflict("Account already approved".to_string()));
            }
            db::profiles::approve_organisation(&state.db, profile.id).await?;
            send_decision_email(&state, &owner.email, SUBJECT_APPROVED, approval_body(&profile))
                .await;
            info!(organisation = %profile.organisation_name, "Organisation account approved");
            Ok(Json(json!({ "status": "approved" })))
        }
        Decision::Reject => {
            if profile.is_approved {
                return Err(AdminError::Conflict("Account already approved".to_string()));
            }
            // Cascades to the organisation profile and any open sessions
            db::users::delete(&state.db, owner.id).await?;
            send_decision_email(
                &state,
                &owner.email,
                SUBJECT_REJECTED,
                rejection_body(&profile, request.message.as_deref()),
            )
            .await;
            info!(organisation = %profile.organisation_name, "Organisation account rejected");
            Ok(Json(json!({ "status": "rejected" })))
        }
    }
}

fn approval_body(profile: &OrganisationProfile) -> String {
    format!(
        "Bonjour,\n\n\
         Votre compte {} a été approuvé. Vous pouvez dès maintenant vous \
         connecter à la plateforme Mosifra.",
        profile.organisation_name
    )
}

fn rejection_body(profile: &OrganisationProfile, message: Option<&str>) -> String {
    let mut body = format!(
        "Bonjour,\n\n\
         Votre demande de compte pour {} n'a pas été retenue.",
        profile.organisation_name
    );
    if let Some(message) = message.map(str::trim).filter(|m| !m.is_empty()) {
        body.push_str("\n\nMessage de l'équipe : ");
        body.push_str(message);
    }
    body
}

async fn send_decision_email(state: &AppState, to: &str, subject: &str, body: String) {
    if let Err(e) = state.mailer.send(to, subject, &body).await {
        warn!(email = %to, "Failed to send decision email: {}", e);
    }
}

fn require_staff(user: &mosifra_common::db::models::User) -> Result<(), AdminError> {
    if user.is_staff {
        Ok(())
    } else {
        Err(AdminError::Forbidden("Staff account required".to_string()))
    }
}

/// Admin API errors
#[derive(Debug)]
pub enum AdminError {
    Validation(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Database(String),
    Internal(String),
}

impl From<mosifra_common::Error> for AdminError {
    fn from(e: mosifra_common::Error) -> Self {
        match e {
            mosifra_common::Error::Database(e) => AdminError::Database(e.to_string()),
            other => AdminError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AdminError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AdminError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AdminError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AdminError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AdminError::Database(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            AdminError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {}", msg),
            ),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
