//! Sidecar files of the Lua-based reader app (KOReader).
//!
//! The app keeps one settings file per book plus a shared collection index,
//! both written as Lua table literals. This crate decodes and encodes those
//! literals ([`table`]), maps the parts shelfsync cares about onto typed
//! records ([`DocSettings`], [`CollectionIndex`]) and knows where the files
//! live ([`path`]).
//!
//! Files are opened, read or written, and closed within each call.

mod collections;
mod docsettings;
pub mod error;
mod file;
pub mod path;
pub mod table;

pub use crate::collections::{Collection, CollectionIndex, Entry, FAVORITES};
pub use crate::docsettings::{Annotation, DocSettings, MAX_RATING, STATUS_COMPLETE, Summary};
pub use crate::file::modified;
