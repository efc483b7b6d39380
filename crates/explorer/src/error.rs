//! Explorer Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An explorer database error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for explorer database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The database file does not exist (device not mounted, or not indexed yet).
    #[display("explorer database not found: {}", _0.display())]
    Missing(#[error(not(source))] PathBuf),
    #[display("database error")]
    Database,
    /// A value read from (or destined for) the database is unusable.
    #[display("invalid explorer data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A missing database usually means the device is still indexing.
        matches!(self, Self::Missing(_))
    }
}
