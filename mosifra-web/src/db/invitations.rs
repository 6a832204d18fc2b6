//! Student invitation queries

use mosifra_common::db::models::{Invitation, InvitationStatus};
use mosifra_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};

fn map_invitation(row: &SqliteRow) -> Result<Invitation> {
    let id: String = row.get("id");
    let institution_id: String = row.get("institution_id");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let expires_at: String = row.get("expires_at");

    Ok(Invitation {
        id: parse_uuid(&id)?,
        institution_id: parse_uuid(&institution_id)?,
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        filiere: row.get("filiere"),
        level: row.get("level"),
        academic_year: row.get("academic_year"),
        token: row.get("token"),
        status: InvitationStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("Unknown invitation status: {}", status)))?,
        error: row.get("error"),
        created_at: parse_timestamp(&created_at)?,
        expires_at: parse_timestamp(&expires_at)?,
    })
}

pub async fn create(pool: &SqlitePool, invitation: &Invitation) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO invitations (
            id, institution_id, email, first_name, last_name,
            filiere, level, academic_year, token, status, error,
            created_at, expires_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(invitation.id.to_string())
    .bind(invitation.institution_id.to_string())
    .bind(&invitation.email)
    .bind(&invitation.first_name)
    .bind(&invitation.last_name)
    .bind(&invitation.filiere)
    .bind(&invitation.level)
    .bind(&invitation.academic_year)
    .bind(&invitation.token)
    .bind(invitation.status.as_str())
    .bind(&invitation.error)
    .bind(invitation.created_at.to_rfc3339())
    .bind(invitation.expires_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_token(pool: &SqlitePool, token: &str) -> Result<Option<Invitation>> {
    let row = sqlx::query("SELECT * FROM invitations WHERE token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_invitation).transpose()
}

pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Invitation>> {
    let row = sqlx::query("SELECT * FROM invitations WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_invitation).transpose()
}

/// Update the lifecycle status, optionally recording a delivery error
pub async fn set_status(
    pool: &SqlitePool,
    id: Uuid,
    status: InvitationStatus,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query("UPDATE invitations SET status = ?, error = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(error)
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}
