//! The device's built-in reader, backed by the explorer database.

use super::{AnnotationSource, CollectionBackend, PositionBackend, sort_key};
use crate::annotations::Annotation;
use crate::consts::NATIVE_ANCHOR_REGEX;
use crate::error::{ErrorKind, Result};
use crate::position::{DevicePosition, Position};
use crate::resolve::ResolvedBook;
use crate::session::{Backend, SessionContext};
use async_trait::async_trait;
use exn::ResultExt;
use shelfsync_explorer::NativeAnnotation;
use tracing::instrument;

pub struct NativeBackend;

#[async_trait]
impl CollectionBackend for NativeBackend {
    fn backend(&self) -> Backend {
        Backend::Native
    }

    async fn active(&self, ctx: &SessionContext, book: &ResolvedBook) -> Result<Option<Vec<String>>> {
        let Some(native) = book.native else {
            return Ok(None);
        };
        let memberships = ctx.repo.memberships(native).await.or_raise(|| ErrorKind::Explorer)?;
        Ok(Some(memberships.into_iter().filter(|m| m.is_active()).map(|m| m.name).collect()))
    }

    #[instrument(level = "debug", skip_all, fields(book = book.id))]
    async fn send(&self, ctx: &SessionContext, book: &ResolvedBook, names: &[String], ts: i64) -> Result<usize> {
        let Some(native) = book.native else {
            return Ok(0);
        };
        let repo = &ctx.repo;
        let memberships = repo.memberships(native).await.or_raise(|| ErrorKind::Explorer)?;
        let mut writes = 0;
        for name in names {
            if memberships.iter().any(|m| &m.name == name && m.is_active()) {
                continue;
            }
            let shelf_id = match repo.shelf_by_name(name).await.or_raise(|| ErrorKind::Explorer)? {
                Some(shelf) => {
                    if shelf.is_deleted {
                        repo.revive_shelf(shelf.id, ts).await.or_raise(|| ErrorKind::Explorer)?;
                        writes += 1;
                    }
                    shelf.id
                },
                None => {
                    writes += 1;
                    repo.create_shelf(name, ts).await.or_raise(|| ErrorKind::Explorer)?
                },
            };
            // Rows are matched by shelf id: a deleted shelf may share the name.
            match memberships.iter().find(|m| m.shelf_id == shelf_id) {
                Some(m) if !m.is_deleted => continue,
                Some(m) => repo.set_membership_deleted(m.shelf_id, native, false, ts).await,
                None => repo.add_membership(shelf_id, native, ts).await,
            }
            .or_raise(|| ErrorKind::Explorer)?;
            tracing::info!(book = book.id, shelf = %name, "Added book to shelf");
            writes += 1;
        }
        for membership in memberships.iter().filter(|m| m.is_active() && !names.contains(&m.name)) {
            repo.set_membership_deleted(membership.shelf_id, native, true, ts).await.or_raise(|| ErrorKind::Explorer)?;
            tracing::info!(book = book.id, shelf = %membership.name, "Removed book from shelf");
            writes += 1;
        }
        Ok(writes)
    }
}

#[async_trait]
impl PositionBackend for NativeBackend {
    fn backend(&self) -> Backend {
        Backend::Native
    }

    async fn read(&self, ctx: &SessionContext, book: &ResolvedBook) -> Result<Option<DevicePosition>> {
        let Some(native) = book.native else {
            return Ok(None);
        };
        let settings = ctx.repo.settings(native, ctx.profile).await.or_raise(|| ErrorKind::Explorer)?;
        Ok(settings.and_then(|s| Some(DevicePosition { token: s.position?, timestamp: s.position_ts })))
    }

    async fn write(&self, ctx: &SessionContext, book: &ResolvedBook, position: &Position) -> Result<bool> {
        let Some(native) = book.native else {
            return Ok(false);
        };
        ctx.repo
            .upsert_position(native, ctx.profile, &position.token, position.timestamp)
            .await
            .or_raise(|| ErrorKind::Explorer)?;
        tracing::info!(book = book.id, backend = %Backend::Native, "Wrote reading position");
        Ok(true)
    }
}

#[async_trait]
impl AnnotationSource for NativeBackend {
    fn backend(&self) -> Backend {
        Backend::Native
    }

    async fn extract(&self, ctx: &SessionContext, book: &ResolvedBook) -> Result<Vec<Annotation>> {
        let Some(native) = book.native else {
            return Ok(Vec::new());
        };
        let items = ctx.repo.annotations(native).await.or_raise(|| ErrorKind::Explorer)?;
        Ok(items.into_iter().filter_map(convert).collect())
    }
}

fn convert(item: NativeAnnotation) -> Option<Annotation> {
    let text = item.text.filter(|t| !t.trim().is_empty());
    let note = item.note.filter(|n| !n.trim().is_empty());
    if text.is_none() && note.is_none() {
        return None;
    }
    let Some(timestamp) = item.timestamp else {
        tracing::debug!(item = item.item_id, "Skipping annotation without a time");
        return None;
    };
    let (page, offset) = item.anchor.as_deref().map(anchor_location).unwrap_or((0, 0));
    Some(Annotation {
        id: format!("{}_{timestamp}", Backend::Native.tag()),
        source: Backend::Native,
        text: text.unwrap_or_default(),
        note,
        color: item.color,
        title: format!("Page {page}"),
        sort_key: sort_key(page, offset),
        timestamp,
    })
}

/// Page and character offset of an anchor such as `pbr:/word?page=12&offs=340`.
fn anchor_location(anchor: &str) -> (i64, i64) {
    let Some(captures) = NATIVE_ANCHOR_REGEX.captures(anchor) else {
        return (0, 0);
    };
    let number = |i: usize| captures.get(i).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
    (number(1), number(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("pbr:/word?page=12&offs=340", (12, 340))]
    #[case("pbr:/page?page=7", (7, 0))]
    #[case("garbage", (0, 0))]
    fn test_anchor_location(#[case] anchor: &str, #[case] expected: (i64, i64)) {
        assert_eq!(anchor_location(anchor), expected);
    }

    #[test]
    fn test_convert() {
        let item = NativeAnnotation {
            item_id: 1,
            timestamp: Some(1_700_000_000),
            kind: Some("highlight".into()),
            text: Some("Call me Ishmael.".into()),
            anchor: Some("pbr:/word?page=3&offs=12".into()),
            note: Some(String::new()),
            color: Some("yellow".into()),
        };
        let annotation = convert(item.clone()).unwrap();
        assert_eq!(annotation.id, "pb_1700000000");
        assert_eq!(annotation.sort_key, 3_000_012);
        assert_eq!(annotation.title, "Page 3");
        assert_eq!(annotation.note, None);

        // Bookmarks carry neither text nor note.
        let bookmark = NativeAnnotation { text: None, note: None, kind: Some("bookmark".into()), ..item.clone() };
        assert_eq!(convert(bookmark), None);
        assert_eq!(convert(NativeAnnotation { timestamp: None, ..item }), None);
    }
}
