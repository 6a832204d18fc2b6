//! Profile endpoints: the authenticated account's own profile and the
//! institution student roster

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use mosifra_common::db::models::{OrganisationKind, Role, StudentProfile};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::accounts::UserSummary;
use crate::api::auth::CurrentUser;
use crate::db::profiles::StudentRecord;
use crate::{db, AppState};

/// Organisation block of a profile response
#[derive(Debug, Serialize)]
pub struct OrganisationView {
    pub id: Uuid,
    pub kind: OrganisationKind,
    pub organisation_name: String,
    pub location: String,
    pub country_code: String,
    pub phone: String,
    pub website: String,
    pub description: String,
    /// Mirrors the stored approval flag; unapproved organisations see a
    /// restricted platform
    pub pending_approval: bool,
}

#[derive(Debug, Serialize)]
pub struct MyProfile {
    pub user: UserSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organisation: Option<OrganisationView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentProfile>,
}

/// GET /api/profiles/me
pub async fn me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<MyProfile>, ProfileError> {
    let mut profile = MyProfile {
        user: UserSummary::from(&user),
        organisation: None,
        student: None,
    };

    match user.role {
        Role::Company | Role::Institution => {
            profile.organisation = db::profiles::find_organisation_by_user(&state.db, user.id)
                .await?
                .map(|org| OrganisationView {
                    id: org.id,
                    kind: org.kind,
                    organisation_name: org.organisation_name,
                    location: org.location,
                    country_code: org.country_code,
                    phone: org.phone,
                    website: org.website,
                    description: org.description,
                    pending_approval: !org.is_approved,
                });
        }
        Role::Student => {
            profile.student = db::profiles::find_student_by_user(&state.db, user.id).await?;
        }
    }

    Ok(Json(profile))
}

/// GET /api/profiles/students
///
/// Roster of students attached to the authenticated institution.
pub async fn students(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<StudentRecord>>, ProfileError> {
    if user.role != Role::Institution {
        return Err(ProfileError::Forbidden(
            "Only institution accounts have a student roster".to_string(),
        ));
    }
    let institution = db::profiles::find_organisation_by_user(&state.db, user.id)
        .await?
        .ok_or_else(|| ProfileError::Internal("Institution account without profile".to_string()))?;

    let students = db::profiles::list_students_of_institution(&state.db, institution.id).await?;
    Ok(Json(students))
}

/// Profile API errors
#[derive(Debug)]
pub enum ProfileError {
    Forbidden(String),
    Database(String),
    Internal(String),
}

impl From<mosifra_common::Error> for ProfileError {
    fn from(e: mosifra_common::Error) -> Self {
        match e {
            mosifra_common::Error::Database(e) => ProfileError::Database(e.to_string()),
            other => ProfileError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ProfileError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ProfileError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ProfileError::Database(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            ProfileError::Internal(msg) => (
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
