//! # Mosifra Common Library
//!
//! Shared code for the Mosifra platform service:
//! - Database models and schema initialization
//! - CSV preview normalizer for bulk student invitations
//! - Outbound email abstraction
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod csv_preview;
pub mod db;
pub mod email;
pub mod error;

pub use error::{Error, Result};
