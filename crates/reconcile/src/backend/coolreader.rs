//! The bookmark-history based reader app.

use super::{AnnotationSource, PositionBackend, sort_key};
use crate::annotations::Annotation;
use crate::consts::XPOINTER_OFFSET_REGEX;
use crate::error::{ErrorKind, Result};
use crate::position::{DevicePosition, Position};
use crate::resolve::ResolvedBook;
use crate::session::{Backend, SessionContext};
use async_trait::async_trait;
use exn::ResultExt;
use shelfsync_history::error::ErrorKind as HistoryErrorKind;
use shelfsync_history::{Bookmark, History};
use std::path::PathBuf;

/// Bookmark types that carry a highlight.
const ANNOTATION_KINDS: [&str; 2] = ["comment", "correction"];

pub struct CoolReaderBackend;

/// Load the bookmark history. A document that does not parse is left alone
/// and reads as `None`.
async fn history(ctx: &SessionContext) -> Result<Option<(PathBuf, History)>> {
    let path = shelfsync_history::history_path(&ctx.main_root);
    match History::load(&path).await {
        Ok(history) => Ok(Some((path, history))),
        Err(err) if matches!(&*err, HistoryErrorKind::Malformed(_)) => {
            tracing::warn!(path = %path.display(), error = %*err, "Ignoring malformed bookmark history");
            Ok(None)
        },
        Err(err) => Err(err).or_raise(|| ErrorKind::History),
    }
}

#[async_trait]
impl PositionBackend for CoolReaderBackend {
    fn backend(&self) -> Backend {
        Backend::CoolReader
    }

    async fn read(&self, ctx: &SessionContext, book: &ResolvedBook) -> Result<Option<DevicePosition>> {
        let Some(key) = book.history_key() else {
            return Ok(None);
        };
        let Some((_, history)) = history(ctx).await? else {
            return Ok(None);
        };
        Ok(history
            .last_position(&key)
            .and_then(|b| Some(DevicePosition { token: b.start_point?, timestamp: b.timestamp })))
    }

    async fn write(&self, ctx: &SessionContext, book: &ResolvedBook, position: &Position) -> Result<bool> {
        let Some(key) = book.history_key() else {
            return Ok(false);
        };
        let Some((path, mut history)) = history(ctx).await? else {
            tracing::warn!(book = book.id, backend = %Backend::CoolReader, "Not writing position into a malformed history");
            return Ok(false);
        };
        if !history.set_last_position(&key, &position.token, position.timestamp) {
            return Ok(false);
        }
        history.save(&path).await.or_raise(|| ErrorKind::History)?;
        tracing::info!(book = book.id, backend = %Backend::CoolReader, "Wrote reading position");
        Ok(true)
    }
}

#[async_trait]
impl AnnotationSource for CoolReaderBackend {
    fn backend(&self) -> Backend {
        Backend::CoolReader
    }

    async fn extract(&self, ctx: &SessionContext, book: &ResolvedBook) -> Result<Vec<Annotation>> {
        let Some(key) = book.history_key() else {
            return Ok(Vec::new());
        };
        let Some((_, history)) = history(ctx).await? else {
            return Ok(Vec::new());
        };
        Ok(history.bookmarks(&key).iter().filter_map(convert).collect())
    }
}

fn convert(bookmark: &Bookmark) -> Option<Annotation> {
    if !ANNOTATION_KINDS.contains(&bookmark.kind.as_str()) {
        return None;
    }
    let text = bookmark.selection_text.clone().filter(|t| !t.trim().is_empty());
    let note = bookmark.comment_text.clone().filter(|n| !n.trim().is_empty());
    if text.is_none() && note.is_none() {
        return None;
    }
    let percent = bookmark.percent_hundredths().unwrap_or(0);
    let offset: i64 = bookmark
        .start_point
        .as_deref()
        .and_then(|x| XPOINTER_OFFSET_REGEX.captures(x))
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0);
    let title = bookmark
        .header_text
        .clone()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| bookmark.percent.clone())
        .unwrap_or_default();
    Some(Annotation {
        id: format!("{}_{percent}{offset}", Backend::CoolReader.tag()),
        source: Backend::CoolReader,
        text: text.unwrap_or_default(),
        note,
        color: None,
        title,
        sort_key: sort_key(percent, offset),
        timestamp: bookmark.timestamp.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn comment() -> Bookmark {
        Bookmark {
            kind: "comment".into(),
            percent: Some("5.07%".into()),
            timestamp: Some(1_700_000_100),
            start_point: Some("/body/DocFragment[2]/body/p[1]/text().16".into()),
            header_text: Some("Loomings".into()),
            selection_text: Some("Call me Ishmael.".into()),
            comment_text: Some("famous".into()),
            ..Bookmark::default()
        }
    }

    #[test]
    fn test_convert() {
        let annotation = convert(&comment()).unwrap();
        assert_eq!(annotation.id, "cr_50716");
        assert_eq!(annotation.sort_key, 507_000_016);
        assert_eq!(annotation.text, "Call me Ishmael.");
        assert_eq!(annotation.note.as_deref(), Some("famous"));
        assert_eq!(annotation.title, "Loomings");
    }

    #[rstest]
    #[case::position(Bookmark { kind: "lastpos".into(), ..comment() })]
    #[case::empty(Bookmark { selection_text: None, comment_text: None, ..comment() })]
    fn test_not_annotations(#[case] bookmark: Bookmark) {
        assert_eq!(convert(&bookmark), None);
    }

    #[test]
    fn test_untitled_uses_percent() {
        let bookmark = Bookmark { header_text: None, kind: "correction".into(), ..comment() };
        assert_eq!(convert(&bookmark).unwrap().title, "5.07%");
    }
}
