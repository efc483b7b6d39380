//! Access to the e-reader's native explorer database.
//!
//! The device keeps an SQLite index of every book it knows about, together
//! with shelves ("collections"), per-profile reading state and bookmarks. This
//! crate is the relational adapter over that database. The database belongs
//! to the device: nothing here creates or migrates tables, and rows are never
//! deleted. Removing a book from a shelf flips its `is_deleted` flag instead so
//! that the device's own sync history survives.
//!
//! # Write model
//! Every mutating method issues a single statement (field-level `UPDATE` when
//! the row exists, `INSERT` otherwise) that is committed on its own. No
//! transaction spans several changes; an interrupted run leaves a consistent
//! state that the next run completes.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Explorer;
pub use crate::models::{Membership, NativeAnnotation, Settings, Shelf, StoragePrefixes};
pub use crate::repo::{DEFAULT_PROFILE_ID, Repository};

/// Identifier of a book row in the explorer database.
pub type NativeBookId = i64;
/// Identifier of a device profile.
pub type ProfileId = i64;
