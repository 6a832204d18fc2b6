//! Bearer-token auth session queries

use mosifra_common::db::models::{AuthSession, User};
use mosifra_common::Result;
use sqlx::SqlitePool;

use super::users::map_user_row;

pub async fn create(pool: &SqlitePool, session: &AuthSession) -> Result<()> {
    sqlx::query("INSERT INTO auth_sessions (token, user_id, created_at) VALUES (?, ?, ?)")
        .bind(&session.token)
        .bind(session.user_id.to_string())
        .bind(session.created_at.to_rfc3339())
        .execute(pool)
        .await?;

    Ok(())
}

/// Resolve a bearer token to its user in one query
pub async fn find_user_by_token(pool: &SqlitePool, token: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT u.*
        FROM auth_sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token = ?
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(map_user_row).transpose()
}

pub async fn delete(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM auth_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}
