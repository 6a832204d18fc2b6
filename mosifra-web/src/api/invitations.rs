//! Student invitation endpoints: CSV preview, template download, bulk
//! upload, and invitation acceptance
//!
//! The upload path is institution-only and authoritative: every line is
//! validated, persisted as a single-use invitation, and emailed an
//! activation link. The preview path is best-effort and unauthenticated,
//! it only normalizes the first few rows so the uploader can check column
//! mapping before committing.

use std::collections::HashSet;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{Duration, Utc};
use csv::ReaderBuilder;
use mosifra_common::csv_preview::{detect_delimiter, detect_encoding, preview_rows};
use mosifra_common::db::models::{
    Challenge, ChallengePurpose, Invitation, InvitationStatus, PendingUser, Role,
};
use mosifra_common::email::is_valid_email;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::accounts::{generate_code, send_code, ChallengeResponse};
use crate::api::auth::CurrentUser;
use crate::password::hash_password;
use crate::{db, AppState};

/// Only this many bytes of the upload feed the preview; enough for the
/// header line and the sample rows
const PREVIEW_BYTE_LIMIT: usize = 4096;

const TEMPLATE_FILENAME: &str = "modele_etudiants.csv";
const SUBJECT_INVITATION: &str = "Invitation Mosifra";
const SUBJECT_VERIFICATION: &str = "Code de vérification";
const TEMPLATE_INVITE_CODE: &str = "Ton code d'inscription est : {code}";

/// POST /api/invitations/preview
///
/// Accepts a multipart `csv_file` field and returns the normalized first
/// rows.
pub async fn preview(
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, InvitationError> {
    let raw = read_file_field(&mut multipart).await?;
    let head = &raw[..raw.len().min(PREVIEW_BYTE_LIMIT)];
    let rows = preview_rows(head);
    Ok(Json(json!({ "rows": rows })))
}

/// GET /api/invitations/template
///
/// Downloadable CSV model with the expected columns and sample rows. The
/// leading BOM keeps Excel from mangling the accented sample data.
pub async fn template() -> Response {
    let body = concat!(
        "\u{feff}",
        "email,prenom,nom,filiere_ou_parcours,niveau,annee_academique\r\n",
        "lilian.olliver@gmail.com,Lilian,Olliver,BUT Informatique,BUT2,2025-2026\r\n",
        "alexielajoigne@etu.unilim.fr,Alexie,Lajoigne,Ingénierie Mécanique,Master 1,2025-2026\r\n",
        "shaune.cepin@orange.fr,Shaune,Cepin,Licence Économie,L3,2025-2026\r\n",
        "dixmille.paule@etu.unilim.fr,Paule,Dixmillé,Business Management,Parcours International,2025-2026\r\n",
    );

    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", TEMPLATE_FILENAME),
            ),
        ],
        body,
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct InvitationDetails {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub filiere: String,
    pub level: String,
    pub academic_year: String,
    pub institution_name: String,
}

/// GET /api/invitations/accept/:token
///
/// Invitation lookup for the activation page. Consumed and expired
/// invitations answer 410 Gone; expiry detected here is also persisted.
pub async fn accept_details(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<InvitationDetails>, InvitationError> {
    let invitation = load_active_invitation(&state, &token).await?;

    let institution_name = db::profiles::find_organisation_by_id(&state.db, invitation.institution_id)
        .await?
        .map(|profile| profile.organisation_name)
        .unwrap_or_default();

    Ok(Json(InvitationDetails {
        email: invitation.email,
        first_name: invitation.first_name,
        last_name: invitation.last_name,
        filiere: invitation.filiere,
        level: invitation.level,
        academic_year: invitation.academic_year,
        institution_name,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub password: String,
}

/// POST /api/invitations/accept/:token
///
/// Starts account activation for an invited student: the chosen password is
/// parked on an `invite` challenge and a code is emailed to the invited
/// address. The invitation itself is only consumed once the code checks
/// out.
pub async fn accept(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<AcceptRequest>,
) -> Result<Json<ChallengeResponse>, InvitationError> {
    let invitation = load_active_invitation(&state, &token).await?;

    if request.password.len() < 8 {
        return Err(InvitationError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if db::users::email_exists(&state.db, &invitation.email).await? {
        return Err(InvitationError::Conflict("Email already in use".to_string()));
    }

    let now = Utc::now();
    let challenge = Challenge {
        id: Uuid::new_v4(),
        purpose: ChallengePurpose::Invite,
        email: invitation.email.clone(),
        code: generate_code(),
        expires_at: now + Duration::minutes(state.config.code_ttl_minutes),
        user_id: None,
        pending_user: Some(PendingUser {
            username: invitation.email.clone(),
            email: invitation.email.clone(),
            password_hash: hash_password(&request.password)
                .map_err(|e| InvitationError::Internal(e.to_string()))?,
            role: Role::Student,
            first_name: invitation.first_name.clone(),
            last_name: invitation.last_name.clone(),
            organisation: None,
        }),
        invitation_id: Some(invitation.id),
        subject: SUBJECT_VERIFICATION.to_string(),
        template: TEMPLATE_INVITE_CODE.to_string(),
        created_at: now,
    };

    db::challenges::save(&state.db, &challenge).await?;
    send_code(&state, &challenge).await;

    Ok(Json(ChallengeResponse {
        challenge_id: challenge.id,
    }))
}

/// Per-upload outcome report
#[derive(Debug, Serialize)]
pub struct UploadReport {
    pub sent: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// POST /api/invitations/upload
///
/// Bulk student import for approved institution accounts. The whole file is
/// decoded with the same encoding/delimiter detection as the preview, the
/// header row maps columns by name, and every valid line becomes a stored
/// invitation plus an activation email. Line-level failures are reported in
/// French, mirroring the upload UI, and never abort the rest of the file.
pub async fn upload(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<Json<UploadReport>, InvitationError> {
    if user.role != Role::Institution {
        return Err(InvitationError::Forbidden(
            "Only institution accounts can invite students".to_string(),
        ));
    }
    let institution = db::profiles::find_organisation_by_user(&state.db, user.id)
        .await?
        .ok_or_else(|| InvitationError::Internal("Institution account without profile".to_string()))?;
    if !institution.is_approved {
        return Err(InvitationError::Forbidden(
            "Institution account awaiting approval".to_string(),
        ));
    }

    let raw = read_file_field(&mut multipart).await?;
    let text = detect_encoding(&raw);
    let delimiter = detect_delimiter(&text);
    let rows = parse_all_rows(&text, delimiter);

    let Some((header, data_rows)) = rows.split_first() else {
        return Err(InvitationError::Validation("Empty file".to_string()));
    };
    let columns = ColumnMap::from_header(header)
        .ok_or_else(|| InvitationError::Validation("Missing email column".to_string()))?;

    let mut report = UploadReport {
        sent: 0,
        failed: 0,
        errors: Vec::new(),
    };
    let mut seen: HashSet<String> = HashSet::new();

    // Line numbers are 1-based over the file, so the first data row is 2
    for (offset, row) in data_rows.iter().enumerate() {
        let line = offset + 2;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let email = columns.get(row, columns.email).trim().to_lowercase();
        if !is_valid_email(&email) {
            report.failed += 1;
            report
                .errors
                .push(format!("Ligne {}: email invalide ({}).", line, email));
            continue;
        }
        if !seen.insert(email.clone()) {
            report.failed += 1;
            report
                .errors
                .push(format!("Ligne {}: email en double ({}).", line, email));
            continue;
        }
        if db::users::email_exists(&state.db, &email).await? {
            report.failed += 1;
            report
                .errors
                .push(format!("Ligne {}: email déjà utilisé ({}).", line, email));
            continue;
        }

        let first_name = title_case(columns.get_opt(row, columns.first_name), "Étudiant");
        let last_name = columns
            .get_opt(row, columns.last_name)
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_default();

        let now = Utc::now();
        let invitation = Invitation {
            id: Uuid::new_v4(),
            institution_id: institution.id,
            email: email.clone(),
            first_name,
            last_name,
            filiere: field_or_default(columns.get_opt(row, columns.filiere)),
            level: field_or_default(columns.get_opt(row, columns.level)),
            academic_year: field_or_default(columns.get_opt(row, columns.academic_year)),
            token: new_invitation_token(),
            status: InvitationStatus::Pending,
            error: None,
            created_at: now,
            expires_at: now + Duration::days(state.config.invitation_ttl_days),
        };
        db::invitations::create(&state.db, &invitation).await?;

        match send_invitation_email(&state, &invitation).await {
            Ok(()) => {
                db::invitations::set_status(&state.db, invitation.id, InvitationStatus::Sent, None)
                    .await?;
                report.sent += 1;
            }
            Err(e) => {
                warn!(email = %invitation.email, "Invitation email failed: {}", e);
                db::invitations::set_status(
                    &state.db,
                    invitation.id,
                    InvitationStatus::Failed,
                    Some(&e.to_string()),
                )
                .await?;
                report.failed += 1;
                report
                    .errors
                    .push(format!("Ligne {}: envoi impossible pour {}.", line, email));
            }
        }
    }

    info!(
        institution = %institution.organisation_name,
        sent = report.sent,
        failed = report.failed,
        "Invitation upload processed"
    );

    Ok(Json(report))
}

async fn send_invitation_email(
    state: &AppState,
    invitation: &Invitation,
) -> mosifra_common::Result<()> {
    let link = format!(
        "{}/invitations/accept/{}",
        state.config.public_base_url.trim_end_matches('/'),
        invitation.token
    );
    let body = format!(
        "Bonjour {},\n\n\
         Ton établissement t'invite à rejoindre Mosifra.\n\
         Profil : {} / {} / {}\n\n\
         Clique sur ce lien pour créer ton compte (valide jusqu'au {}) :\n{}\n",
        invitation.first_name,
        invitation.filiere,
        invitation.level,
        invitation.academic_year,
        invitation.expires_at.format("%d/%m/%Y"),
        link
    );
    state
        .mailer
        .send(&invitation.email, SUBJECT_INVITATION, &body)
        .await
}

/// Resolve a token to an invitation that can still be accepted.
///
/// Expiry observed here is written back so the status reflects reality on
/// later lookups.
async fn load_active_invitation(
    state: &AppState,
    token: &str,
) -> Result<Invitation, InvitationError> {
    let invitation = db::invitations::find_by_token(&state.db, token)
        .await?
        .ok_or_else(|| InvitationError::NotFound("Unknown invitation".to_string()))?;

    match invitation.status {
        InvitationStatus::Used => {
            return Err(InvitationError::Gone("Invitation already used".to_string()));
        }
        InvitationStatus::Expired => {
            return Err(InvitationError::Gone("Invitation expired".to_string()));
        }
        InvitationStatus::Pending | InvitationStatus::Sent | InvitationStatus::Failed => {}
    }
    if invitation.is_expired(Utc::now()) {
        db::invitations::set_status(&state.db, invitation.id, InvitationStatus::Expired, None)
            .await?;
        return Err(InvitationError::Gone("Invitation expired".to_string()));
    }

    Ok(invitation)
}

/// Pull the `csv_file` field out of a multipart body
async fn read_file_field(multipart: &mut Multipart) -> Result<Vec<u8>, InvitationError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| InvitationError::Validation(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() == Some("csv_file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| InvitationError::Validation(format!("Unreadable upload: {}", e)))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(InvitationError::Validation(
        "Missing csv_file field".to_string(),
    ))
}

/// Parse the whole decoded file, without the preview row cap. Same reader
/// settings as the preview so both paths agree on what a row is.
fn parse_all_rows(text: &str, delimiter: u8) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(_) => break,
        };
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        if rows.is_empty() {
            if let Some(first) = row.first_mut() {
                if first.starts_with('\u{feff}') {
                    *first = first.replace('\u{feff}', "");
                }
            }
        }
        rows.push(row);
    }
    rows
}

/// Column indices resolved from the header row by name
struct ColumnMap {
    email: usize,
    first_name: Option<usize>,
    last_name: Option<usize>,
    filiere: Option<usize>,
    level: Option<usize>,
    academic_year: Option<usize>,
}

impl ColumnMap {
    /// Header names follow the downloadable template, with the English
    /// spellings accepted as aliases. Returns `None` without an email
    /// column.
    fn from_header(header: &[String]) -> Option<Self> {
        let find = |names: &[&str]| {
            header.iter().position(|cell| {
                let cell = cell.trim().to_lowercase();
                names.contains(&cell.as_str())
            })
        };

        Some(Self {
            email: find(&["email", "e-mail", "mail"])?,
            first_name: find(&["prenom", "prénom", "first_name"]),
            last_name: find(&["nom", "last_name"]),
            filiere: find(&["filiere_ou_parcours", "filiere", "filière", "parcours"]),
            level: find(&["niveau", "level"]),
            academic_year: find(&["annee_academique", "année_académique", "academic_year"]),
        })
    }

    fn get<'a>(&self, row: &'a [String], index: usize) -> &'a str {
        row.get(index).map(String::as_str).unwrap_or("")
    }

    fn get_opt<'a>(&self, row: &'a [String], index: Option<usize>) -> Option<&'a str> {
        index.and_then(|i| row.get(i)).map(String::as_str)
    }
}

fn field_or_default(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("N/A")
        .to_string()
}

/// Title-case a first name, keeping hyphenated compounds ("jean-pierre"
/// becomes "Jean-Pierre"); falls back to `default` when empty.
fn title_case(value: Option<&str>, default: &str) -> String {
    let trimmed = value.map(str::trim).unwrap_or("");
    if trimmed.is_empty() {
        return default.to_string();
    }

    let cased: String = trimmed
        .to_lowercase()
        .split_inclusive(|c: char| c.is_whitespace() || c == '-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    cased
}

/// Opaque single-use token for invitation links
fn new_invitation_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Invitation API errors
#[derive(Debug)]
pub enum InvitationError {
    Validation(String),
    Forbidden(String),
    NotFound(String),
    Gone(String),
    Conflict(String),
    Database(String),
    Internal(String),
}

impl From<mosifra_common::Error> for InvitationError {
    fn from(e: mosifra_common::Error) -> Self {
        match e {
            mosifra_common::Error::Database(e) => InvitationError::Database(e.to_string()),
            other => InvitationError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for InvitationError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            InvitationError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            InvitationError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            InvitationError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            InvitationError::Gone(msg) => (StatusCode::GONE, msg),
            InvitationError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            InvitationError::Database(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            InvitationError::Internal(msg) => (
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
