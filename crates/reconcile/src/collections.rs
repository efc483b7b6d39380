//! Collection membership, keyed by collection name.
//!
//! Sending makes the device match the catalog exactly; loading keeps the
//! catalog names that are still active on the device and adds the ones only
//! the device knows.

use crate::backend::{CollectionBackend, KoReaderBackend, NativeBackend, collection_backends};
use crate::catalog::FieldValue;
use crate::error::Result;
use crate::resolve::ResolvedBook;
use crate::run::Batch;
use std::collections::BTreeSet;
use tracing::instrument;

/// The catalog's names for a book, first occurrence wins.
fn catalog_names(batch: &Batch<'_>, book: &ResolvedBook, column: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    batch
        .catalog
        .field(book.id, column)
        .and_then(|v| v.as_names().map(<[String]>::to_vec))
        .unwrap_or_default()
        .into_iter()
        .filter(|name| !name.trim().is_empty() && seen.insert(name.clone()))
        .collect()
}

/// New catalog names given the names active on the device, or `None` when
/// the set would not change.
pub fn load_names(catalog: &[String], device_active: &[String]) -> Option<Vec<String>> {
    let mut names: Vec<String> = catalog.iter().filter(|n| device_active.contains(n)).cloned().collect();
    for name in device_active {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    let before: BTreeSet<&String> = catalog.iter().collect();
    let after: BTreeSet<&String> = names.iter().collect();
    (before != after).then_some(names)
}

#[instrument(level = "debug", skip_all, fields(book = book.id))]
pub(crate) async fn send(batch: &mut Batch<'_>, book: &ResolvedBook, column: &str) -> Result<()> {
    let names = catalog_names(batch, book, column);
    let ts = batch.catalog.last_modified(book.id).unwrap_or(batch.ctx.now);
    for backend in collection_backends(batch.ctx) {
        let writes = backend.send(batch.ctx, book, &names, ts).await?;
        if writes > 0 {
            tracing::debug!(book = book.id, backend = %backend.backend(), writes, "Sent collections");
        }
        batch.report.device_writes += writes;
    }
    Ok(())
}

#[instrument(level = "debug", skip_all, fields(book = book.id))]
pub(crate) async fn load(batch: &mut Batch<'_>, book: &ResolvedBook, column: &str) -> Result<()> {
    let source: Box<dyn CollectionBackend> = if batch.ctx.flags.prefer_app_collections {
        Box::new(KoReaderBackend)
    } else {
        Box::new(NativeBackend)
    };
    let Some(active) = source.active(batch.ctx, book).await? else {
        return Ok(());
    };
    let current = catalog_names(batch, book, column);
    if let Some(names) = load_names(&current, &active) {
        tracing::debug!(book = book.id, from = ?current, to = ?names, "Collections changed on device");
        let value = (!names.is_empty()).then_some(FieldValue::Names(names));
        batch.changes.push(book.id, column, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[rstest]
    #[case::symmetric(&["A", "B"], &["B", "C"], Some(&["B", "C"][..]))]
    #[case::unchanged(&["A", "B"], &["B", "A"], None)]
    #[case::all_removed(&["A"], &[], Some(&[][..]))]
    #[case::all_new(&[], &["C"], Some(&["C"][..]))]
    #[case::nothing(&[], &[], None)]
    fn test_load_names(#[case] catalog: &[&str], #[case] device: &[&str], #[case] expected: Option<&[&str]>) {
        assert_eq!(load_names(&names(catalog), &names(device)), expected.map(names));
    }
}
