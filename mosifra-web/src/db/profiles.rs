//! Organisation and student profile queries

use mosifra_common::db::models::{OrganisationKind, OrganisationProfile, StudentProfile};
use mosifra_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;

fn map_organisation(row: &SqliteRow) -> Result<OrganisationProfile> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");
    let kind: String = row.get("kind");

    Ok(OrganisationProfile {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        kind: OrganisationKind::parse(&kind)
            .ok_or_else(|| Error::Internal(format!("Unknown profile kind: {}", kind)))?,
        organisation_name: row.get("organisation_name"),
        location: row.get("location"),
        country_code: row.get("country_code"),
        phone: row.get("phone"),
        website: row.get("website"),
        description: row.get("description"),
        logo_path: row.get("logo_path"),
        is_approved: row.get::<i64, _>("is_approved") != 0,
    })
}

pub async fn create_organisation(pool: &SqlitePool, profile: &OrganisationProfile) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO organisation_profiles (
            id, user_id, kind, organisation_name, location, country_code,
            phone, website, description, logo_path, is_approved
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(profile.id.to_string())
    .bind(profile.user_id.to_string())
    .bind(profile.kind.as_str())
    .bind(&profile.organisation_name)
    .bind(&profile.location)
    .bind(&profile.country_code)
    .bind(&profile.phone)
    .bind(&profile.website)
    .bind(&profile.description)
    .bind(&profile.logo_path)
    .bind(profile.is_approved as i64)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_organisation_by_id(
    pool: &SqlitePool,
    id: Uuid,
) -> Result<Option<OrganisationProfile>> {
    let row = sqlx::query("SELECT * FROM organisation_profiles WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_organisation).transpose()
}

pub async fn find_organisation_by_user(
    pool: &SqlitePool,
    user_id: Uuid,
) -> Result<Option<OrganisationProfile>> {
    let row = sqlx::query("SELECT * FROM organisation_profiles WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_organisation).transpose()
}

/// One-way approval: sets the flag, never clears it
pub async fn approve_organisation(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE organisation_profiles SET is_approved = 1 WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Organisations awaiting approval, with the owning account's email
pub async fn list_pending_with_email(
    pool: &SqlitePool,
) -> Result<Vec<(OrganisationProfile, String)>> {
    let rows = sqlx::query(
        r#"
        SELECT p.*, u.email AS user_email
        FROM organisation_profiles p
        JOIN users u ON u.id = p.user_id
        WHERE p.is_approved = 0
        ORDER BY p.organisation_name
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let profile = map_organisation(row)?;
            let email: String = row.get("user_email");
            Ok((profile, email))
        })
        .collect()
}

pub async fn upsert_student(pool: &SqlitePool, profile: &StudentProfile) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_profiles (user_id, institution_id, filiere, level, academic_year)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            institution_id = excluded.institution_id,
            filiere = excluded.filiere,
            level = excluded.level,
            academic_year = excluded.academic_year
        "#,
    )
    .bind(profile.user_id.to_string())
    .bind(profile.institution_id.map(|id| id.to_string()))
    .bind(&profile.filiere)
    .bind(&profile.level)
    .bind(&profile.academic_year)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_student_by_user(
    pool: &SqlitePool,
    user_id: Uuid,
) -> Result<Option<StudentProfile>> {
    let row = sqlx::query("SELECT * FROM student_profiles WHERE user_id = ?")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let user_id: String = row.get("user_id");
            let institution_id: Option<String> = row.get("institution_id");
            Ok(Some(StudentProfile {
                user_id: parse_uuid(&user_id)?,
                institution_id: institution_id.as_deref().map(parse_uuid).transpose()?,
                filiere: row.get("filiere"),
                level: row.get("level"),
                academic_year: row.get("academic_year"),
            }))
        }
        None => Ok(None),
    }
}

/// Student roster entry for the institution view
#[derive(Debug, Serialize)]
pub struct StudentRecord {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub filiere: String,
    pub level: String,
    pub academic_year: String,
}

/// Students attached to an institution account
pub async fn list_students_of_institution(
    pool: &SqlitePool,
    institution_id: Uuid,
) -> Result<Vec<StudentRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT s.user_id, s.filiere, s.level, s.academic_year,
               u.email, u.first_name, u.last_name
        FROM student_profiles s
        JOIN users u ON u.id = s.user_id
        WHERE s.institution_id = ?
        ORDER BY u.last_name, u.first_name
        "#,
    )
    .bind(institution_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let user_id: String = row.get("user_id");
            Ok(StudentRecord {
                user_id: parse_uuid(&user_id)?,
                email: row.get("email"),
                first_name: row.get("first_name"),
                last_name: row.get("last_name"),
                filiere: row.get("filiere"),
                level: row.get("level"),
                academic_year: row.get("academic_year"),
            })
        })
        .collect()
}
