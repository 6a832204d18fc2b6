//! Domain models
//!
//! All enums are stored as lowercase TEXT in SQLite; timestamps are RFC 3339
//! TEXT in UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Company,
    Institution,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Company => "company",
            Role::Institution => "institution",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "student" => Some(Role::Student),
            "company" => Some(Role::Company),
            "institution" => Some(Role::Institution),
            _ => None,
        }
    }
}

/// Organisation profile kind (the two roles subject to admin approval)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganisationKind {
    Company,
    Institution,
}

impl OrganisationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganisationKind::Company => "company",
            OrganisationKind::Institution => "institution",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "company" => Some(OrganisationKind::Company),
            "institution" => Some(OrganisationKind::Institution),
            _ => None,
        }
    }

    pub fn from_role(role: Role) -> Option<Self> {
        match role {
            Role::Company => Some(OrganisationKind::Company),
            Role::Institution => Some(OrganisationKind::Institution),
            Role::Student => None,
        }
    }
}

/// Invitation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Sent,
    Failed,
    Used,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Sent => "sent",
            InvitationStatus::Failed => "failed",
            InvitationStatus::Used => "used",
            InvitationStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(InvitationStatus::Pending),
            "sent" => Some(InvitationStatus::Sent),
            "failed" => Some(InvitationStatus::Failed),
            "used" => Some(InvitationStatus::Used),
            "expired" => Some(InvitationStatus::Expired),
            _ => None,
        }
    }
}

/// What a two-factor challenge gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePurpose {
    Login,
    Register,
    Invite,
    PasswordReset,
}

impl ChallengePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengePurpose::Login => "login",
            ChallengePurpose::Register => "register",
            ChallengePurpose::Invite => "invite",
            ChallengePurpose::PasswordReset => "password_reset",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "login" => Some(ChallengePurpose::Login),
            "register" => Some(ChallengePurpose::Register),
            "invite" => Some(ChallengePurpose::Invite),
            "password_reset" => Some(ChallengePurpose::PasswordReset),
            _ => None,
        }
    }
}

/// Platform account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub is_verified: bool,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

/// Company or institution extension of a user account
///
/// Approval is one-way: once `is_approved` is set it is never cleared.
/// Rejection deletes the owning user instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganisationProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: OrganisationKind,
    pub organisation_name: String,
    pub location: String,
    pub country_code: String,
    pub phone: String,
    pub website: String,
    pub description: String,
    pub logo_path: Option<String>,
    pub is_approved: bool,
}

/// Student extension of a user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProfile {
    pub user_id: Uuid,
    pub institution_id: Option<Uuid>,
    pub filiere: String,
    pub level: String,
    pub academic_year: String,
}

/// Single-use student invitation created by a bulk CSV upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    pub institution_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub filiere: String,
    pub level: String,
    pub academic_year: String,
    pub token: String,
    pub status: InvitationStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Invitation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Pending registration data carried on a register/invite challenge until
/// the two-factor code is verified
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub organisation: Option<PendingOrganisation>,
}

/// Organisation fields captured at registration, applied once verified
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrganisation {
    pub organisation_name: String,
    pub location: String,
    pub country_code: String,
    pub phone: String,
    pub website: String,
    pub description: String,
    #[serde(default)]
    pub logo_path: Option<String>,
}

/// Time-boxed two-factor challenge
///
/// Replaces the session bookkeeping of the original flow: a challenge holds
/// the emailed code, its expiry, and whatever is pending on verification
/// (an existing user for login, a [`PendingUser`] for registration, an
/// invitation id for invited students). Consumed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: Uuid,
    pub purpose: ChallengePurpose,
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub pending_user: Option<PendingUser>,
    pub invitation_id: Option<Uuid>,
    /// Subject and body template of the code email, kept so resend reuses
    /// the original wording
    pub subject: String,
    pub template: String,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Bearer-token session opened after two-factor verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}
