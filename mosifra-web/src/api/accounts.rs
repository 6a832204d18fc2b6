//! Account flows: registration, login, two-factor verification, password
//! reset
//!
//! Registration never creates an account directly. The submitted data is
//! parked on a `register` (or `invite`) challenge together with a 6-digit
//! code emailed to the address; only a successful verification materializes
//! the user, its profile, and an auth session. Login and password reset go
//! through the same challenge machinery.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{Duration, Utc};
use mosifra_common::db::models::{
    AuthSession, Challenge, ChallengePurpose, InvitationStatus, OrganisationKind,
    OrganisationProfile, PendingOrganisation, PendingUser, Role, StudentProfile, User,
};
use mosifra_common::email::is_valid_email;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::api::auth::SessionToken;
use crate::password::{hash_password, verify_password};
use crate::{db, AppState};

const SUBJECT_VERIFICATION: &str = "Code de vérification";
const SUBJECT_RESET: &str = "Code de réinitialisation";
const TEMPLATE_REGISTER: &str = "Ton code d'inscription est : {code}";
const TEMPLATE_LOGIN: &str = "Ton code de connexion est : {code}";
const TEMPLATE_RESET: &str = "Ton code de réinitialisation est : {code}";

/// Generate a 6-digit two-factor code
pub(crate) fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..=999_999u32))
}

/// Email the challenge code. Fire-and-forget: delivery failures are logged
/// and never surface to the caller.
pub(crate) async fn send_code(state: &AppState, challenge: &Challenge) {
    let body = challenge.template.replace("{code}", &challenge.code);
    if let Err(e) = state
        .mailer
        .send(&challenge.email, &challenge.subject, &body)
        .await
    {
        warn!(email = %challenge.email, "Failed to send two-factor code: {}", e);
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub organisation: Option<OrganisationFields>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrganisationFields {
    #[serde(default)]
    pub organisation_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub challenge_id: Uuid,
}

/// POST /api/auth/register
///
/// Company and institution accounts only; students join through an
/// invitation link.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<ChallengeResponse>, AccountError> {
    let email = request.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AccountError::Validation("Invalid email address".to_string()));
    }
    if request.password.len() < 8 {
        return Err(AccountError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let role = Role::parse(&request.role)
        .ok_or_else(|| AccountError::Validation(format!("Unknown role: {}", request.role)))?;
    if OrganisationKind::from_role(role).is_none() {
        return Err(AccountError::Validation(
            "Students join through an invitation link".to_string(),
        ));
    }

    if db::users::email_exists(&state.db, &email).await? {
        return Err(AccountError::Conflict("Email already in use".to_string()));
    }

    let org = request.organisation.unwrap_or_default();
    let organisation_name = org
        .organisation_name
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_string();

    let pending = PendingUser {
        username: email.clone(),
        email: email.clone(),
        password_hash: hash_password(&request.password)?,
        role,
        first_name: request
            .first_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&organisation_name)
            .chars()
            .take(150)
            .collect(),
        last_name: request.last_name.as_deref().unwrap_or("").trim().to_string(),
        organisation: Some(PendingOrganisation {
            organisation_name,
            location: org.location.as_deref().unwrap_or("").trim().to_string(),
            country_code: org
                .country_code
                .as_deref()
                .unwrap_or("")
                .trim()
                .to_uppercase(),
            phone: org.phone.as_deref().unwrap_or("").trim().to_string(),
            website: org.website.as_deref().unwrap_or("").trim().to_string(),
            description: org.description.as_deref().unwrap_or("").trim().to_string(),
            logo_path: None,
        }),
    };

    let mut challenge = new_challenge(
        &state,
        ChallengePurpose::Register,
        &email,
        SUBJECT_VERIFICATION,
        TEMPLATE_REGISTER,
    );
    challenge.pending_user = Some(pending);

    db::challenges::save(&state.db, &challenge).await?;
    send_code(&state, &challenge).await;

    Ok(Json(ChallengeResponse {
        challenge_id: challenge.id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login
///
/// Verifies credentials, then gates the session behind an emailed code.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ChallengeResponse>, AccountError> {
    let user = db::users::find_by_email(&state.db, request.email.trim())
        .await?
        .ok_or(AccountError::InvalidCredentials)?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(AccountError::InvalidCredentials);
    }

    let mut challenge = new_challenge(
        &state,
        ChallengePurpose::Login,
        &user.email,
        SUBJECT_VERIFICATION,
        TEMPLATE_LOGIN,
    );
    challenge.user_id = Some(user.id);

    db::challenges::save(&state.db, &challenge).await?;
    send_code(&state, &challenge).await;

    Ok(Json(ChallengeResponse {
        challenge_id: challenge.id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorRequest {
    pub challenge_id: Uuid,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub is_verified: bool,
    pub is_staff: bool,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_verified: user.is_verified,
            is_staff: user.is_staff,
        }
    }
}

/// POST /api/auth/two-factor
///
/// Verifies the emailed code. For register/invite challenges this is the
/// point where the account actually gets created; the challenge is deleted
/// either way once consumed.
pub async fn verify_two_factor(
    State(state): State<AppState>,
    Json(request): Json<TwoFactorRequest>,
) -> Result<Json<SessionResponse>, AccountError> {
    let challenge = db::challenges::load(&state.db, request.challenge_id)
        .await?
        .ok_or(AccountError::UnknownChallenge)?;

    let now = Utc::now();
    if challenge.is_expired(now) {
        db::challenges::delete(&state.db, challenge.id).await?;
        return Err(AccountError::CodeExpired);
    }
    if request.code != challenge.code {
        return Err(AccountError::InvalidCode);
    }

    let user = match challenge.purpose {
        ChallengePurpose::PasswordReset => {
            return Err(AccountError::Validation(
                "Use the password-reset confirmation endpoint".to_string(),
            ));
        }
        ChallengePurpose::Login => {
            let user_id = challenge
                .user_id
                .ok_or_else(|| AccountError::Internal("Login challenge without user".to_string()))?;
            match db::users::find_by_id(&state.db, user_id).await? {
                Some(user) => user,
                None => {
                    db::challenges::delete(&state.db, challenge.id).await?;
                    return Err(AccountError::UnknownChallenge);
                }
            }
        }
        ChallengePurpose::Register | ChallengePurpose::Invite => {
            let pending = challenge.pending_user.clone().ok_or_else(|| {
                AccountError::Internal("Registration challenge without pending data".to_string())
            })?;
            create_account(&state, &challenge, pending).await?
        }
    };

    db::challenges::delete(&state.db, challenge.id).await?;

    let session = AuthSession {
        token: Uuid::new_v4().simple().to_string(),
        user_id: user.id,
        created_at: now,
    };
    db::sessions::create(&state.db, &session).await?;

    Ok(Json(SessionResponse {
        token: session.token,
        user: UserSummary::from(&user),
    }))
}

/// Materialize a verified registration: user row, role-specific profile,
/// and invitation consumption for invited students.
async fn create_account(
    state: &AppState,
    challenge: &Challenge,
    pending: PendingUser,
) -> Result<User, AccountError> {
    if db::users::email_exists(&state.db, &pending.email).await? {
        db::challenges::delete(&state.db, challenge.id).await?;
        return Err(AccountError::Conflict("Email already in use".to_string()));
    }

    let user = User {
        id: Uuid::new_v4(),
        username: pending.username,
        email: pending.email,
        password_hash: pending.password_hash,
        role: pending.role,
        first_name: pending.first_name,
        last_name: pending.last_name,
        // Invited students arrive through a link their institution vouched
        // for, so they start out verified
        is_verified: challenge.purpose == ChallengePurpose::Invite,
        is_staff: false,
        created_at: Utc::now(),
    };
    db::users::create(&state.db, &user).await?;

    match pending.role {
        Role::Company | Role::Institution => {
            let org = pending.organisation.unwrap_or_else(|| PendingOrganisation {
                organisation_name: String::new(),
                location: String::new(),
                country_code: String::new(),
                phone: String::new(),
                website: String::new(),
                description: String::new(),
                logo_path: None,
            });
            let kind = OrganisationKind::from_role(pending.role)
                .ok_or_else(|| AccountError::Internal("Role without profile kind".to_string()))?;
            let profile = OrganisationProfile {
                id: Uuid::new_v4(),
                user_id: user.id,
                kind,
                organisation_name: org.organisation_name,
                location: org.location,
                country_code: if org.country_code.is_empty() {
                    "FR".to_string()
                } else {
                    org.country_code
                },
                phone: org.phone,
                website: org.website,
                description: org.description,
                logo_path: org.logo_path,
                is_approved: false,
            };
            db::profiles::create_organisation(&state.db, &profile).await?;
        }
        Role::Student => {
            let mut profile = StudentProfile {
                user_id: user.id,
                institution_id: None,
                filiere: String::new(),
                level: String::new(),
                academic_year: String::new(),
            };
            if let Some(invitation_id) = challenge.invitation_id {
                if let Some(invitation) =
                    db::invitations::find_by_id(&state.db, invitation_id).await?
                {
                    db::invitations::set_status(
                        &state.db,
                        invitation.id,
                        InvitationStatus::Used,
                        None,
                    )
                    .await?;
                    profile.institution_id = Some(invitation.institution_id);
                    profile.filiere = invitation.filiere;
                    profile.level = invitation.level;
                    profile.academic_year = invitation.academic_year;
                }
            }
            db::profiles::upsert_student(&state.db, &profile).await?;
        }
    }

    Ok(user)
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub challenge_id: Uuid,
}

/// POST /api/auth/two-factor/resend
///
/// Regenerates the code and re-sends it with the challenge's original
/// subject and wording.
pub async fn resend_two_factor(
    State(state): State<AppState>,
    Json(request): Json<ResendRequest>,
) -> Result<Json<serde_json::Value>, AccountError> {
    let mut challenge = db::challenges::load(&state.db, request.challenge_id)
        .await?
        .ok_or(AccountError::UnknownChallenge)?;

    challenge.code = generate_code();
    challenge.expires_at = Utc::now() + Duration::minutes(state.config.code_ttl_minutes);

    db::challenges::save(&state.db, &challenge).await?;
    send_code(&state, &challenge).await;

    Ok(Json(json!({ "status": "sent" })))
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// POST /api/auth/password-reset/request
///
/// Always answers with a challenge id; whether the email belongs to an
/// account is only revealed at confirmation.
pub async fn password_reset_request(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<ChallengeResponse>, AccountError> {
    let email = request.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AccountError::Validation("Invalid email address".to_string()));
    }

    let challenge = new_challenge(
        &state,
        ChallengePurpose::PasswordReset,
        &email,
        SUBJECT_RESET,
        TEMPLATE_RESET,
    );

    db::challenges::save(&state.db, &challenge).await?;
    send_code(&state, &challenge).await;

    Ok(Json(ChallengeResponse {
        challenge_id: challenge.id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirm {
    pub challenge_id: Uuid,
    pub code: String,
    pub password: String,
}

/// POST /api/auth/password-reset/confirm
pub async fn password_reset_confirm(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetConfirm>,
) -> Result<Json<serde_json::Value>, AccountError> {
    let challenge = db::challenges::load(&state.db, request.challenge_id)
        .await?
        .ok_or(AccountError::UnknownChallenge)?;

    if challenge.purpose != ChallengePurpose::PasswordReset {
        return Err(AccountError::Validation(
            "Not a password-reset challenge".to_string(),
        ));
    }
    if challenge.is_expired(Utc::now()) {
        db::challenges::delete(&state.db, challenge.id).await?;
        return Err(AccountError::CodeExpired);
    }
    if request.code != challenge.code {
        return Err(AccountError::InvalidCode);
    }
    if request.password.len() < 8 {
        return Err(AccountError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let user = db::users::find_by_email(&state.db, &challenge.email)
        .await?
        .ok_or_else(|| AccountError::NotFound("Unknown user".to_string()))?;

    let hash = hash_password(&request.password)?;
    db::users::update_password(&state.db, user.id, &hash).await?;
    db::challenges::delete(&state.db, challenge.id).await?;

    Ok(Json(json!({ "status": "ok" })))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(token): Extension<SessionToken>,
) -> Result<Json<serde_json::Value>, AccountError> {
    db::sessions::delete(&state.db, &token.0).await?;
    Ok(Json(json!({ "status": "ok" })))
}

fn new_challenge(
    state: &AppState,
    purpose: ChallengePurpose,
    email: &str,
    subject: &str,
    template: &str,
) -> Challenge {
    let now = Utc::now();
    Challenge {
        id: Uuid::new_v4(),
        purpose,
        email: email.to_string(),
        code: generate_code(),
        expires_at: now + Duration::minutes(state.config.code_ttl_minutes),
        user_id: None,
        pending_user: None,
        invitation_id: None,
        subject: subject.to_string(),
        template: template.to_string(),
        created_at: now,
    }
}

/// Account API errors
#[derive(Debug)]
pub enum AccountError {
    Validation(String),
    Conflict(String),
    InvalidCredentials,
    UnknownChallenge,
    CodeExpired,
    InvalidCode,
    NotFound(String),
    Database(String),
    Internal(String),
}

impl From<mosifra_common::Error> for AccountError {
    fn from(e: mosifra_common::Error) -> Self {
        match e {
            mosifra_common::Error::Database(e) => AccountError::Database(e.to_string()),
            other => AccountError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AccountError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AccountError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AccountError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
            }
            AccountError::UnknownChallenge => (
                StatusCode::UNAUTHORIZED,
                "Unknown or consumed challenge".to_string(),
            ),
            AccountError::CodeExpired => (StatusCode::UNAUTHORIZED, "Code expired".to_string()),
            AccountError::InvalidCode => (StatusCode::UNAUTHORIZED, "Invalid code".to_string()),
            AccountError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AccountError::Database(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            AccountError::Internal(msg) => (
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
