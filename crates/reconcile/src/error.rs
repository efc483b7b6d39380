//! Reconcile Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Errors of the adapter crates are
//! kept as children in the error tree.

use derive_more::{Display, Error};

/// A reconciliation error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The device is not mounted, or is still indexing its books. Try again
    /// once the device has settled.
    #[display("device unavailable: {_0}")]
    DeviceUnavailable(#[error(not(source))] String),
    #[display("device database error")]
    Explorer,
    #[display("reader app sidecar error")]
    Sidecar,
    #[display("bookmark history error")]
    History,
    /// The catalog collaborator rejected a read or write.
    #[display("catalog error: {_0}")]
    Catalog(#[error(not(source))] String),
    #[display("annotation template error")]
    Template,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_))
    }
}
