//! User account queries

use mosifra_common::db::models::{Role, User};
use mosifra_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};

fn map_user(row: &SqliteRow) -> Result<User> {
    let id: String = row.get("id");
    let role: String = row.get("role");
    let created_at: String = row.get("created_at");

    Ok(User {
        id: parse_uuid(&id)?,
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: Role::parse(&role)
            .ok_or_else(|| Error::Internal(format!("Unknown role in database: {}", role)))?,
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        is_verified: row.get::<i64, _>("is_verified") != 0,
        is_staff: row.get::<i64, _>("is_staff") != 0,
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Insert a new user
pub async fn create(pool: &SqlitePool, user: &User) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (
            id, username, email, password_hash, role,
            first_name, last_name, is_verified, is_staff, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.is_verified as i64)
    .bind(user.is_staff as i64)
    .bind(user.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up a user by email, case-insensitively
pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE lower(email) = lower(?)")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_user).transpose()
}

pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query("SELECT * FROM users WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_user).transpose()
}

/// Case-insensitive existence check, used by registration and bulk import
pub async fn email_exists(pool: &SqlitePool, email: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE lower(email) = lower(?)")
        .bind(email)
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

pub async fn update_password(pool: &SqlitePool, user_id: Uuid, password_hash: &str) -> Result<()> {
    sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(user_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Delete a user; profiles, sessions and challenges cascade
pub async fn delete(pool: &SqlitePool, user_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

pub(crate) fn map_user_row(row: &SqliteRow) -> Result<User> {
    map_user(row)
}
