use crate::catalog::{BookId, Catalog, FieldValue};
use crate::error::Result;
use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::instrument;

/// One catalog field to overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogChange {
    pub book: BookId,
    pub column: String,
    pub value: Option<FieldValue>,
}

/// Catalog mutations collected during a run, applied once the run is over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChanges {
    changes: Vec<CatalogChange>,
}
impl PendingChanges {
    pub fn push(&mut self, book: BookId, column: impl Into<String>, value: Option<FieldValue>) {
        let column = column.into();
        tracing::debug!(book, column = %column, value = ?value, "Queueing catalog change");
        self.changes.push(CatalogChange { book, column, value });
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogChange> {
        self.changes.iter()
    }

    /// The queued value for a field, if any (`Some(None)` is a queued clear).
    pub fn get(&self, book: BookId, column: &str) -> Option<&Option<FieldValue>> {
        self.changes.iter().rev().find(|c| c.book == book && c.column == column).map(|c| &c.value)
    }

    /// Write every change through to the catalog, in order.
    #[instrument(level = "debug", skip_all, fields(changes = self.changes.len()))]
    pub fn apply(self, catalog: &mut dyn Catalog) -> Result<usize> {
        let count = self.changes.len();
        for change in self.changes {
            catalog.set_field(change.book, &change.column, change.value)?;
        }
        Ok(count)
    }
}

/// Counters describing what a run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub books_seen: usize,
    pub books_on_device: usize,
    /// Individual writes to the device database or files.
    pub device_writes: usize,
    pub catalog_changes: usize,
    /// Values that could not be represented on the other side.
    pub skipped: usize,
}
impl Display for SyncReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} books ({} on device): {} device writes, {} catalog changes, {} skipped",
            self.books_seen, self.books_on_device, self.device_writes, self.catalog_changes, self.skipped
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub changes: PendingChanges,
    pub report: SyncReport,
}
