//! Two-factor challenge persistence
//!
//! A challenge replaces the session bookkeeping of a framework session
//! store: the emailed code, its expiry, and whatever the verification will
//! act on (an existing user, a pending registration payload, an
//! invitation). Saved with upsert so a resend only refreshes code and
//! expiry.

use mosifra_common::db::models::{Challenge, ChallengePurpose, PendingUser};
use mosifra_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};

pub async fn save(pool: &SqlitePool, challenge: &Challenge) -> Result<()> {
    let pending_user = challenge
        .pending_user
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize pending user: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO challenges (
            id, purpose, email, code, expires_at, user_id,
            pending_user, invitation_id, subject, template, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            code = excluded.code,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(challenge.id.to_string())
    .bind(challenge.purpose.as_str())
    .bind(&challenge.email)
    .bind(&challenge.code)
    .bind(challenge.expires_at.to_rfc3339())
    .bind(challenge.user_id.map(|id| id.to_string()))
    .bind(pending_user)
    .bind(challenge.invitation_id.map(|id| id.to_string()))
    .bind(&challenge.subject)
    .bind(&challenge.template)
    .bind(challenge.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load(pool: &SqlitePool, id: Uuid) -> Result<Option<Challenge>> {
    let row = sqlx::query("SELECT * FROM challenges WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let purpose: String = row.get("purpose");
    let purpose = ChallengePurpose::parse(&purpose)
        .ok_or_else(|| Error::Internal(format!("Unknown challenge purpose: {}", purpose)))?;

    let id: String = row.get("id");
    let expires_at: String = row.get("expires_at");
    let created_at: String = row.get("created_at");
    let user_id: Option<String> = row.get("user_id");
    let invitation_id: Option<String> = row.get("invitation_id");

    let pending_user: Option<String> = row.get("pending_user");
    let pending_user: Option<PendingUser> = pending_user
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize pending user: {}", e)))?;

    Ok(Some(Challenge {
        id: parse_uuid(&id)?,
        purpose,
        email: row.get("email"),
        code: row.get("code"),
        expires_at: parse_timestamp(&expires_at)?,
        user_id: user_id.as_deref().map(parse_uuid).transpose()?,
        pending_user,
        invitation_id: invitation_id.as_deref().map(parse_uuid).transpose()?,
        subject: row.get("subject"),
        template: row.get("template"),
        created_at: parse_timestamp(&created_at)?,
    }))
}

/// Challenges are single-use: verification deletes them
pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM challenges WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}
