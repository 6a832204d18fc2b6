//! Database access layer for mosifra-web
//!
//! Hand-written sqlx queries per entity. Timestamps are stored as RFC 3339
//! TEXT, UUIDs as TEXT.

use chrono::{DateTime, Utc};
use mosifra_common::{Error, Result};
use uuid::Uuid;

pub mod challenges;
pub mod invitations;
pub mod profiles;
pub mod sessions;
pub mod users;

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp: {}", e)))
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Failed to parse UUID: {}", e)))
}
