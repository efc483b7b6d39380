//! The sidecar-based reader app: one settings table per book, plus a shared
//! collection index.

use super::{AnnotationSource, CollectionBackend, PositionBackend, sort_key};
use crate::annotations::Annotation;
use crate::consts::XPOINTER_OFFSET_REGEX;
use crate::error::{ErrorKind, Result};
use crate::position::{DevicePosition, Position};
use crate::resolve::ResolvedBook;
use crate::session::{Backend, SessionContext};
use async_trait::async_trait;
use exn::ResultExt;
use shelfsync_sidecar::{CollectionIndex, DocSettings, FAVORITES};
use std::path::PathBuf;
use tracing::instrument;

pub struct KoReaderBackend;

/// The book's sidecar path and its settings, if the sidecar exists.
pub(crate) async fn doc_settings(ctx: &SessionContext, book: &ResolvedBook) -> Result<Option<(PathBuf, DocSettings)>> {
    let Some(path) = book.sidecar(ctx).await else {
        return Ok(None);
    };
    let settings = DocSettings::load(&path).await.or_raise(|| ErrorKind::Sidecar)?;
    Ok(settings.map(|s| (path, s)))
}

pub(crate) async fn save_doc_settings(path: &std::path::Path, settings: &DocSettings) -> Result<()> {
    settings.save(path).await.or_raise(|| ErrorKind::Sidecar)?;
    tracing::info!(path = %path.display(), "Wrote sidecar");
    Ok(())
}

/// The shared collection index and where it lives.
pub(crate) async fn collection_index(ctx: &SessionContext) -> Result<(PathBuf, CollectionIndex)> {
    let path = shelfsync_sidecar::path::collection_index(&ctx.main_root);
    let index = CollectionIndex::load(&path).await.or_raise(|| ErrorKind::Sidecar)?;
    Ok((path, index))
}

pub(crate) async fn save_collection_index(path: &std::path::Path, index: &CollectionIndex) -> Result<()> {
    index.save(path).await.or_raise(|| ErrorKind::Sidecar)?;
    tracing::info!(path = %path.display(), "Wrote collection index");
    Ok(())
}

#[async_trait]
impl CollectionBackend for KoReaderBackend {
    fn backend(&self) -> Backend {
        Backend::KoReader
    }

    async fn active(&self, ctx: &SessionContext, book: &ResolvedBook) -> Result<Option<Vec<String>>> {
        let (_, index) = collection_index(ctx).await?;
        Ok(Some(
            index.memberships(&book.device_path).into_iter().filter(|n| *n != FAVORITES).map(str::to_string).collect(),
        ))
    }

    #[instrument(level = "debug", skip_all, fields(book = book.id))]
    async fn send(&self, ctx: &SessionContext, book: &ResolvedBook, names: &[String], _ts: i64) -> Result<usize> {
        let (path, mut index) = collection_index(ctx).await?;
        let file = book.device_path.as_str();
        let mut writes = 0;
        for name in names.iter().filter(|n| n.as_str() != FAVORITES) {
            if index.add(name, file) {
                tracing::debug!(book = book.id, collection = %name, "Adding to app collection");
                writes += 1;
            }
        }
        let stale: Vec<String> = index
            .memberships(file)
            .into_iter()
            .filter(|current| *current != FAVORITES && !names.iter().any(|n| n == current))
            .map(str::to_string)
            .collect();
        for name in stale {
            if index.remove(&name, file) {
                tracing::debug!(book = book.id, collection = %name, "Removing from app collection");
                writes += 1;
            }
        }
        if writes > 0 {
            save_collection_index(&path, &index).await?;
        }
        Ok(writes)
    }
}

#[async_trait]
impl PositionBackend for KoReaderBackend {
    fn backend(&self) -> Backend {
        Backend::KoReader
    }

    /// The app does not time its positions; the sidecar's modification time
    /// stands in.
    async fn read(&self, ctx: &SessionContext, book: &ResolvedBook) -> Result<Option<DevicePosition>> {
        let Some((path, settings)) = doc_settings(ctx, book).await? else {
            return Ok(None);
        };
        let Some(token) = settings.last_xpointer.filter(|x| !x.is_empty()) else {
            return Ok(None);
        };
        Ok(Some(DevicePosition { token, timestamp: shelfsync_sidecar::modified(&path).await }))
    }

    async fn write(&self, ctx: &SessionContext, book: &ResolvedBook, position: &Position) -> Result<bool> {
        let Some(path) = book.sidecar(ctx).await else {
            return Ok(false);
        };
        let mut settings = DocSettings::load(&path).await.or_raise(|| ErrorKind::Sidecar)?.unwrap_or_default();
        if settings.last_xpointer.as_deref() == Some(position.token.as_str()) {
            return Ok(false);
        }
        settings.last_xpointer = Some(position.token.clone());
        settings.doc_path.get_or_insert_with(|| book.device_path.clone());
        save_doc_settings(&path, &settings).await?;
        Ok(true)
    }
}

#[async_trait]
impl AnnotationSource for KoReaderBackend {
    fn backend(&self) -> Backend {
        Backend::KoReader
    }

    async fn extract(&self, ctx: &SessionContext, book: &ResolvedBook) -> Result<Vec<Annotation>> {
        let Some((_, settings)) = doc_settings(ctx, book).await? else {
            return Ok(Vec::new());
        };
        Ok(settings.annotations.iter().filter_map(convert).collect())
    }
}

fn convert(annotation: &shelfsync_sidecar::Annotation) -> Option<Annotation> {
    let text = annotation.text.clone().filter(|t| !t.trim().is_empty());
    let note = annotation.note.clone().filter(|n| !n.trim().is_empty());
    if text.is_none() && note.is_none() {
        return None;
    }
    let Some(timestamp) = annotation.timestamp() else {
        tracing::debug!(datetime = ?annotation.datetime, "Skipping annotation with an unreadable time");
        return None;
    };
    let page = annotation.pageno.unwrap_or(0);
    let offset = annotation
        .xpointer()
        .and_then(|x| XPOINTER_OFFSET_REGEX.captures(x))
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);
    let title = annotation
        .chapter
        .clone()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| format!("Page {page}"));
    Some(Annotation {
        id: format!("{}_{timestamp}", Backend::KoReader.tag()),
        source: Backend::KoReader,
        text: text.unwrap_or_default(),
        note,
        color: annotation.color.clone(),
        title,
        sort_key: sort_key(page, offset),
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelfsync_sidecar::table::Value;

    fn highlight() -> shelfsync_sidecar::Annotation {
        shelfsync_sidecar::Annotation {
            datetime: Some("2023-11-14 22:13:20".into()),
            text: Some("Call me Ishmael.".into()),
            chapter: Some("Loomings".into()),
            pageno: Some(3),
            pos0: Some(Value::from("/body/DocFragment[3]/body/p[1]/text().12")),
            ..Default::default()
        }
    }

    #[test]
    fn test_convert() {
        let annotation = convert(&highlight()).unwrap();
        assert_eq!(annotation.id, "kr_1700000000");
        assert_eq!(annotation.sort_key, 3_000_012);
        assert_eq!(annotation.title, "Loomings");
    }

    #[test]
    fn test_convert_fallbacks() {
        let untitled = shelfsync_sidecar::Annotation { chapter: None, pos0: None, ..highlight() };
        let annotation = convert(&untitled).unwrap();
        assert_eq!(annotation.title, "Page 3");
        assert_eq!(annotation.sort_key, 3_000_000);

        let undated = shelfsync_sidecar::Annotation { datetime: Some("yesterday".into()), ..highlight() };
        assert_eq!(convert(&undated), None);
        let empty = shelfsync_sidecar::Annotation { text: None, ..highlight() };
        assert_eq!(convert(&empty), None);
    }
}
