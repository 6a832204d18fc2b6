//! Integration tests for the mosifra-web API
//!
//! Tests cover:
//! - Health endpoint (no auth required)
//! - Registration and login with two-factor verification
//! - Password reset
//! - Authentication middleware
//! - CSV preview, template download and bulk invitation upload
//! - Invitation acceptance lifecycle
//! - Admin approval pipeline

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use mosifra_common::config::ServerConfig;
use mosifra_common::db::init::init_schema;
use mosifra_common::db::models::{
    AuthSession, Invitation, InvitationStatus, OrganisationKind, OrganisationProfile, Role, User,
};
use mosifra_common::email::Mailer;
use mosifra_web::{build_router, AppState};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::util::ServiceExt; // for `oneshot` method
use uuid::Uuid;

/// One captured outbound email: (to, subject, body)
type SentEmail = (String, String, String);

/// Test mailer that records every send instead of delivering
struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentEmail>>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> mosifra_common::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// Test helper: in-memory database plus app state with a recording mailer.
///
/// A single connection keeps every query on the same in-memory database.
async fn setup() -> (Router, AppState, Arc<Mutex<Vec<SentEmail>>>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Should open in-memory database");
    init_schema(&pool).await.expect("Should initialize schema");

    let sent = Arc::new(Mutex::new(Vec::new()));
    let mailer = RecordingMailer { sent: sent.clone() };
    let state = AppState::new(pool, Arc::new(mailer), ServerConfig::default());
    (build_router(state.clone()), state, sent)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn multipart_request(uri: &str, token: Option<&str>, csv: &[u8]) -> Request<Body> {
    let boundary = "mosifra-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"csv_file\"; filename=\"etudiants.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(csv);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        );
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

/// The 6-digit code from the most recent captured email
fn last_code(sent: &Arc<Mutex<Vec<SentEmail>>>) -> String {
    let sent = sent.lock().unwrap();
    let (_, _, body) = sent.last().expect("An email should have been sent");
    body.chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>()
        .chars()
        .rev()
        .take(6)
        .collect::<String>()
        .chars()
        .rev()
        .collect()
}

/// Register an institution account and complete two-factor verification;
/// returns the session token.
async fn register_institution(
    app: &Router,
    sent: &Arc<Mutex<Vec<SentEmail>>>,
    email: &str,
    name: &str,
) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({
                "email": email,
                "password": "motdepasse123",
                "role": "institution",
                "organisation": { "organisation_name": name, "location": "Limoges" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let challenge_id = body["challenge_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/two-factor",
            json!({ "challenge_id": challenge_id, "code": last_code(sent) }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    body["token"].as_str().unwrap().to_string()
}

/// Insert a user row directly, bypassing the registration flow
async fn insert_user(state: &AppState, email: &str, role: Role, is_staff: bool) -> User {
    let user = User {
        id: Uuid::new_v4(),
        username: email.to_string(),
        email: email.to_string(),
        password_hash: mosifra_web::password::hash_password("motdepasse123").unwrap(),
        role,
        first_name: "Test".to_string(),
        last_name: "USER".to_string(),
        is_verified: true,
        is_staff,
        created_at: Utc::now(),
    };
    mosifra_web::db::users::create(&state.db, &user).await.unwrap();
    user
}

async fn open_session(state: &AppState, user_id: Uuid) -> String {
    let session = AuthSession {
        token: Uuid::new_v4().simple().to_string(),
        user_id,
        created_at: Utc::now(),
    };
    mosifra_web::db::sessions::create(&state.db, &session)
        .await
        .unwrap();
    session.token
}

/// Institution user with an approved organisation profile and an open
/// session; returns (profile id, token).
async fn approved_institution(state: &AppState, email: &str, name: &str) -> (Uuid, String) {
    let user = insert_user(state, email, Role::Institution, false).await;
    let profile = OrganisationProfile {
        id: Uuid::new_v4(),
        user_id: user.id,
        kind: OrganisationKind::Institution,
        organisation_name: name.to_string(),
        location: "Limoges".to_string(),
        country_code: "FR".to_string(),
        phone: String::new(),
        website: String::new(),
        description: String::new(),
        logo_path: None,
        is_approved: true,
    };
    mosifra_web::db::profiles::create_organisation(&state.db, &profile)
        .await
        .unwrap();
    let token = open_session(state, user.id).await;
    (profile.id, token)
}

async fn insert_invitation(state: &AppState, institution_id: Uuid, email: &str) -> Invitation {
    let now = Utc::now();
    let invitation = Invitation {
        id: Uuid::new_v4(),
        institution_id,
        email: email.to_string(),
        first_name: "Léa".to_string(),
        last_name: "MARTIN".to_string(),
        filiere: "BUT Informatique".to_string(),
        level: "BUT2".to_string(),
        academic_year: "2025-2026".to_string(),
        token: Uuid::new_v4().simple().to_string(),
        status: InvitationStatus::Sent,
        error: None,
        created_at: now,
        expires_at: now + Duration::days(7),
    };
    mosifra_web::db::invitations::create(&state.db, &invitation)
        .await
        .unwrap();
    invitation
}

// =============================================================================
// Health endpoint
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let (app, _state, _sent) = setup().await;

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "mosifra-web");
    assert!(body["version"].is_string());
}

// =============================================================================
// Registration with two-factor verification
// =============================================================================

#[tokio::test]
async fn test_registration_flow_creates_unapproved_institution() {
    let (app, _state, sent) = setup().await;

    let token = register_institution(&app, &sent, "iut@unilim.fr", "IUT de Limoges").await;

    let response = app
        .oneshot(authed_request("GET", "/api/profiles/me", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["user"]["role"], "institution");
    assert_eq!(body["user"]["is_verified"], false);
    assert_eq!(body["organisation"]["organisation_name"], "IUT de Limoges");
    assert_eq!(body["organisation"]["pending_approval"], true);
}

#[tokio::test]
async fn test_registration_rejects_wrong_code() {
    let (app, _state, sent) = setup().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({
                "email": "iut@unilim.fr",
                "password": "motdepasse123",
                "role": "institution",
                "organisation": { "organisation_name": "IUT" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let challenge_id = body["challenge_id"].as_str().unwrap().to_string();

    // A wrong code is rejected without consuming the challenge
    let code = last_code(&sent);
    let wrong = if code == "000000" { "000001" } else { "000000" };
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/two-factor",
            json!({ "challenge_id": challenge_id, "code": wrong }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/two-factor",
            json!({ "challenge_id": challenge_id, "code": code }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_registration_validation() {
    let (app, _state, _sent) = setup().await;

    // Students cannot self-register
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({ "email": "a@b.fr", "password": "motdepasse123", "role": "student" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Malformed email
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({ "email": "not-an-email", "password": "motdepasse123", "role": "company" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Short password
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({ "email": "a@b.fr", "password": "court", "role": "company" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_registration_rejects_duplicate_email() {
    let (app, _state, sent) = setup().await;
    register_institution(&app, &sent, "iut@unilim.fr", "IUT").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({
                "email": "IUT@unilim.fr",
                "password": "motdepasse123",
                "role": "institution"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

// =============================================================================
// Login and logout
// =============================================================================

#[tokio::test]
async fn test_login_flow() {
    let (app, state, sent) = setup().await;
    insert_user(&state, "dupont@entreprise.fr", Role::Company, false).await;

    // Wrong password never issues a challenge
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": "dupont@entreprise.fr", "password": "mauvais-mdp" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": "dupont@entreprise.fr", "password": "motdepasse123" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let challenge_id = body["challenge_id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/two-factor",
            json!({ "challenge_id": challenge_id, "code": last_code(&sent) }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert!(body["token"].is_string());
    assert_eq!(body["user"]["email"], "dupont@entreprise.fr");
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let (app, state, _sent) = setup().await;
    let user = insert_user(&state, "dupont@entreprise.fr", Role::Company, false).await;

    let now = Utc::now();
    let challenge = mosifra_common::db::models::Challenge {
        id: Uuid::new_v4(),
        purpose: mosifra_common::db::models::ChallengePurpose::Login,
        email: user.email.clone(),
        code: "123456".to_string(),
        expires_at: now - Duration::minutes(1),
        user_id: Some(user.id),
        pending_user: None,
        invitation_id: None,
        subject: "Code de vérification".to_string(),
        template: "Ton code de connexion est : {code}".to_string(),
        created_at: now - Duration::minutes(11),
    };
    mosifra_web::db::challenges::save(&state.db, &challenge)
        .await
        .unwrap();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/two-factor",
            json!({ "challenge_id": challenge.id, "code": "123456" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "Code expired");
}

#[tokio::test]
async fn test_resend_regenerates_code() {
    let (app, _state, sent) = setup().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            json!({
                "email": "iut@unilim.fr",
                "password": "motdepasse123",
                "role": "institution"
            }),
        ))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    let challenge_id = body["challenge_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/two-factor/resend",
            json!({ "challenge_id": challenge_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(sent.lock().unwrap().len(), 2);

    // The re-sent code is the one that verifies
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/two-factor",
            json!({ "challenge_id": challenge_id, "code": last_code(&sent) }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_closes_session() {
    let (app, state, _sent) = setup().await;
    let user = insert_user(&state, "dupont@entreprise.fr", Role::Company, false).await;
    let token = open_session(&state, user.id).await;

    let response = app
        .clone()
        .oneshot(authed_request("POST", "/api/auth/logout", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(authed_request("GET", "/api/profiles/me", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Password reset
// =============================================================================

#[tokio::test]
async fn test_password_reset_flow() {
    let (app, state, sent) = setup().await;
    insert_user(&state, "dupont@entreprise.fr", Role::Company, false).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/password-reset/request",
            json!({ "email": "dupont@entreprise.fr" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let challenge_id = body["challenge_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/password-reset/confirm",
            json!({
                "challenge_id": challenge_id,
                "code": last_code(&sent),
                "password": "nouveaumdp456"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The new password now authenticates
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": "dupont@entreprise.fr", "password": "nouveaumdp456" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_password_reset_request_does_not_reveal_accounts() {
    let (app, _state, _sent) = setup().await;

    // Unknown address still gets a challenge id
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/password-reset/request",
            json!({ "email": "inconnu@nulle-part.fr" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert!(body["challenge_id"].is_string());
}

// =============================================================================
// Authentication middleware
// =============================================================================

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (app, _state, _sent) = setup().await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/profiles/me")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(authed_request("GET", "/api/profiles/me", "jeton-bidon"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// CSV preview and template
// =============================================================================

#[tokio::test]
async fn test_preview_normalizes_semicolon_csv() {
    let (app, _state, _sent) = setup().await;

    let csv = "email;prenom;nom\nlea@etu.fr;Léa;MARTIN\n".as_bytes();
    let response = app
        .oneshot(multipart_request("/api/invitations/preview", None, csv))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let rows = body["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], "email");
    assert_eq!(rows[1][1], "Léa");
}

#[tokio::test]
async fn test_preview_handles_windows_1252_bytes() {
    let (app, _state, _sent) = setup().await;

    // 0xE9 is é in Windows-1252
    let csv: &[u8] = b"email,prenom\nlea@etu.fr,L\xe9a\n";
    let response = app
        .oneshot(multipart_request("/api/invitations/preview", None, csv))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["rows"][1][1], "Léa");
}

#[tokio::test]
async fn test_template_download() {
    let (app, _state, _sent) = setup().await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/invitations/template")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert!(response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("modele_etudiants.csv"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("\u{feff}email,prenom,nom"));
}

// =============================================================================
// Bulk invitation upload
// =============================================================================

#[tokio::test]
async fn test_upload_reports_per_line_outcomes() {
    let (app, state, sent) = setup().await;
    let (_profile_id, token) = approved_institution(&state, "iut@unilim.fr", "IUT").await;
    insert_user(&state, "deja.inscrit@etu.fr", Role::Student, false).await;

    let csv = "email;prenom;nom;filiere_ou_parcours;niveau;annee_academique\n\
               lea@etu.fr;léa;martin;BUT Informatique;BUT2;2025-2026\n\
               pas-un-email;Théo;BERNARD;;;\n\
               deja.inscrit@etu.fr;Inès;DUBOIS;;;\n\
               noah@etu.fr;;;;;\n"
        .as_bytes();
    let response = app
        .oneshot(multipart_request(
            "/api/invitations/upload",
            Some(&token),
            csv,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["sent"], 2);
    assert_eq!(body["failed"], 2);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors[0]
        .as_str()
        .unwrap()
        .contains("Ligne 3: email invalide"));
    assert!(errors[1]
        .as_str()
        .unwrap()
        .contains("Ligne 4: email déjà utilisé"));

    // Both valid lines got an invitation email with an acceptance link
    let emails = sent.lock().unwrap();
    let invites: Vec<_> = emails
        .iter()
        .filter(|(_, subject, _)| subject.contains("Invitation"))
        .collect();
    assert_eq!(invites.len(), 2);
    assert!(invites[0].2.contains("/invitations/accept/"));
    // Names are normalized: title-case first name, defaults when missing
    assert!(invites[0].2.contains("Bonjour Léa"));
    assert!(invites[1].2.contains("Bonjour Étudiant"));
}

#[tokio::test]
async fn test_upload_requires_approved_institution() {
    let (app, state, _sent) = setup().await;

    // Company accounts cannot upload
    let company = insert_user(&state, "dupont@entreprise.fr", Role::Company, false).await;
    let company_token = open_session(&state, company.id).await;
    let response = app
        .clone()
        .oneshot(multipart_request(
            "/api/invitations/upload",
            Some(&company_token),
            b"email\nlea@etu.fr\n",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Unapproved institutions cannot upload either
    let pending = insert_user(&state, "iut@unilim.fr", Role::Institution, false).await;
    let profile = OrganisationProfile {
        id: Uuid::new_v4(),
        user_id: pending.id,
        kind: OrganisationKind::Institution,
        organisation_name: "IUT".to_string(),
        location: String::new(),
        country_code: "FR".to_string(),
        phone: String::new(),
        website: String::new(),
        description: String::new(),
        logo_path: None,
        is_approved: false,
    };
    mosifra_web::db::profiles::create_organisation(&state.db, &profile)
        .await
        .unwrap();
    let pending_token = open_session(&state, pending.id).await;
    let response = app
        .oneshot(multipart_request(
            "/api/invitations/upload",
            Some(&pending_token),
            b"email\nlea@etu.fr\n",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_upload_rejects_file_without_email_column() {
    let (app, state, _sent) = setup().await;
    let (_profile_id, token) = approved_institution(&state, "iut@unilim.fr", "IUT").await;

    let response = app
        .oneshot(multipart_request(
            "/api/invitations/upload",
            Some(&token),
            b"prenom,nom\nL\xc3\xa9a,MARTIN\n",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Invitation acceptance
// =============================================================================

#[tokio::test]
async fn test_invitation_acceptance_lifecycle() {
    let (app, state, sent) = setup().await;
    let (profile_id, institution_token) =
        approved_institution(&state, "iut@unilim.fr", "IUT de Limoges").await;
    let invitation = insert_invitation(&state, profile_id, "lea@etu.fr").await;

    // Details are served while the invitation is live
    let uri = format!("/api/invitations/accept/{}", invitation.token);
    let request = Request::builder()
        .method("GET")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["email"], "lea@etu.fr");
    assert_eq!(body["institution_name"], "IUT de Limoges");

    // Accepting parks the password on an invite challenge
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &uri,
            json!({ "password": "motdepasse123" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let challenge_id = body["challenge_id"].as_str().unwrap().to_string();

    // Verification creates the verified student and consumes the invitation
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/two-factor",
            json!({ "challenge_id": challenge_id, "code": last_code(&sent) }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["user"]["role"], "student");
    assert_eq!(body["user"]["is_verified"], true);
    let student_token = body["token"].as_str().unwrap().to_string();

    // The student sees the attributes from the invitation
    let response = app
        .clone()
        .oneshot(authed_request("GET", "/api/profiles/me", &student_token))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["student"]["filiere"], "BUT Informatique");

    // The institution roster lists the new student
    let response = app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/api/profiles/students",
            &institution_token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let roster = body.as_array().unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0]["email"], "lea@etu.fr");

    // The link is single-use
    let request = Request::builder()
        .method("GET")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_expired_invitation_is_marked_and_rejected() {
    let (app, state, _sent) = setup().await;
    let (profile_id, _token) = approved_institution(&state, "iut@unilim.fr", "IUT").await;

    let now = Utc::now();
    let invitation = Invitation {
        id: Uuid::new_v4(),
        institution_id: profile_id,
        email: "lea@etu.fr".to_string(),
        first_name: "Léa".to_string(),
        last_name: "MARTIN".to_string(),
        filiere: "N/A".to_string(),
        level: "N/A".to_string(),
        academic_year: "N/A".to_string(),
        token: Uuid::new_v4().simple().to_string(),
        status: InvitationStatus::Sent,
        error: None,
        created_at: now - Duration::days(8),
        expires_at: now - Duration::days(1),
    };
    mosifra_web::db::invitations::create(&state.db, &invitation)
        .await
        .unwrap();

    let uri = format!("/api/invitations/accept/{}", invitation.token);
    let request = Request::builder()
        .method("GET")
        .uri(&uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::GONE);

    // Expiry observed on lookup is written back
    let stored = mosifra_web::db::invitations::find_by_id(&state.db, invitation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, InvitationStatus::Expired);
}

#[tokio::test]
async fn test_unknown_invitation_token() {
    let (app, _state, _sent) = setup().await;

    let request = Request::builder()
        .method("GET")
        .uri("/api/invitations/accept/jeton-inconnu")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Admin approval pipeline
// =============================================================================

#[tokio::test]
async fn test_admin_routes_require_staff() {
    let (app, state, _sent) = setup().await;
    let user = insert_user(&state, "dupont@entreprise.fr", Role::Company, false).await;
    let token = open_session(&state, user.id).await;

    let response = app
        .oneshot(authed_request("GET", "/api/admin/pending", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_approval_flow() {
    let (app, state, sent) = setup().await;
    let staff = insert_user(&state, "admin@mosifra.fr", Role::Company, true).await;
    let staff_token = open_session(&state, staff.id).await;
    register_institution(&app, &sent, "iut@unilim.fr", "IUT de Limoges").await;

    // The registered institution shows up in the queue
    let response = app
        .clone()
        .oneshot(authed_request("GET", "/api/admin/pending", &staff_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    let pending = body.as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["organisation_name"], "IUT de Limoges");
    assert_eq!(pending[0]["kind"], "institution");
    let profile_id = pending[0]["id"].as_str().unwrap().to_string();

    let uri = format!("/api/admin/accounts/institution/{}/decision", profile_id);
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &uri,
            json!({ "action": "approve" }),
        ))
        .await
        .unwrap();
    // Decision routes are protected too
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = json_request("POST", &uri, json!({ "action": "approve" }));
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {}", staff_token).parse().unwrap(),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Approval is persisted and notified
    let stored = mosifra_web::db::profiles::find_organisation_by_id(
        &state.db,
        profile_id.parse().unwrap(),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(stored.is_approved);
    {
        let emails = sent.lock().unwrap();
        let (to, subject, _) = emails.last().unwrap();
        assert_eq!(to, "iut@unilim.fr");
        assert!(subject.contains("approuvé"));
    }

    // Approval is one-way: deciding again conflicts
    let mut request = json_request("POST", &uri, json!({ "action": "approve" }));
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {}", staff_token).parse().unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_admin_rejection_deletes_account() {
    let (app, state, sent) = setup().await;
    let staff = insert_user(&state, "admin@mosifra.fr", Role::Company, true).await;
    let staff_token = open_session(&state, staff.id).await;
    register_institution(&app, &sent, "douteux@exemple.fr", "Société Douteuse").await;

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/api/admin/pending", &staff_token))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    let profile_id = body[0]["id"].as_str().unwrap().to_string();

    let uri = format!("/api/admin/accounts/institution/{}/decision", profile_id);
    let mut request = json_request(
        "POST",
        &uri,
        json!({ "action": "reject", "message": "Dossier incomplet" }),
    );
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {}", staff_token).parse().unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The account is gone and the address was notified with the message
    let remaining = mosifra_web::db::users::find_by_email(&state.db, "douteux@exemple.fr")
        .await
        .unwrap();
    assert!(remaining.is_none());
    let emails = sent.lock().unwrap();
    let (to, _, body) = emails.last().unwrap();
    assert_eq!(to, "douteux@exemple.fr");
    assert!(body.contains("Dossier incomplet"));
}

#[tokio::test]
async fn test_students_roster_is_institution_only() {
    let (app, state, _sent) = setup().await;
    let company = insert_user(&state, "dupont@entreprise.fr", Role::Company, false).await;
    let token = open_session(&state, company.id).await;

    let response = app
        .oneshot(authed_request("GET", "/api/profiles/students", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
