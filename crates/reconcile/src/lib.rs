//! Reconciliation of catalog metadata with an e-reader.
//!
//! A run starts by building a [`SessionContext`]: the device database, the
//! device-wide book index and the [`SessionFlags`] saying which features sync
//! with which reading app. [`run`] then walks every catalog book, resolves it
//! to its records on the device and reconciles each enabled feature:
//!
//! | Feature      | Built-in reader  | KOReader               | CoolReader      |
//! |--------------|------------------|------------------------|-----------------|
//! | collections  | shelves          | collection index       |                 |
//! | read         | `completed` flag | sidecar status (send)  |                 |
//! | favorite     | `favorite` flag  | `favorites` collection |                 |
//! | rating       |                  | sidecar summary        |                 |
//! | review       |                  | sidecar summary        |                 |
//! | position     | settings row     | sidecar xpointer       | `lastpos`       |
//! | annotations  | bookmark items   | sidecar annotations    | comment marks   |
//!
//! Device writes are made as the run goes, one independent write at a time.
//! Catalog changes are collected into [`PendingChanges`] and applied by the
//! caller afterwards.

mod annotations;
pub mod backend;
mod catalog;
mod changes;
mod collections;
mod consts;
pub mod error;
mod index;
pub mod position;
mod resolve;
mod run;
mod session;
mod status;

pub use crate::annotations::{Annotation, Renderer, StoredBlock, merge, stored_blocks};
pub use crate::catalog::{BookId, Catalog, ColumnKind, FieldValue};
pub use crate::changes::{CatalogChange, PendingChanges, SyncOutcome, SyncReport};
pub use crate::collections::load_names;
pub use crate::index::{DeviceBook, DeviceIndex, INDEX_FILE, Storage};
pub use crate::resolve::{ResolvedBook, resolve};
pub use crate::run::{Command, run};
pub use crate::session::{Backend, Feature, SessionContext, SessionFlags};
pub use crate::status::{to_app_rating, to_catalog_rating};
