//! Highlights and notes gathered from every reading app into one catalog
//! field.
//!
//! Annotations extracted in a run are rendered fresh. Blocks already stored in
//! the catalog are kept when no fresh annotation has their id, so notes
//! from a book that has since left the device (or an app that was
//! uninstalled) survive.

mod render;

pub use self::render::Renderer;
use crate::consts::ANNOTATION_SELECTOR;
use crate::error::Result;
use crate::session::Backend;
use scraper::Html;
use std::collections::HashSet;

/// One highlight or note, normalized across apps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Backend tag plus a disambiguator that is stable across extractions.
    pub id: String,
    pub source: Backend,
    pub text: String,
    pub note: Option<String>,
    pub color: Option<String>,
    /// Where the annotation is, for humans: a chapter or page.
    pub title: String,
    /// Position in document order within its backend.
    pub sort_key: i64,
    /// Epoch seconds.
    pub timestamp: i64,
}

/// A block previously rendered into the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlock {
    pub id: String,
    pub source: Option<Backend>,
    pub sort_key: i64,
    pub html: String,
}

/// Every annotation block found in stored catalog HTML.
pub fn stored_blocks(html: &str) -> Vec<StoredBlock> {
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&ANNOTATION_SELECTOR)
        .filter_map(|element| {
            let value = element.value();
            Some(StoredBlock {
                id: value.attr("data-id")?.to_string(),
                source: value.attr("data-source").and_then(Backend::from_tag),
                sort_key: value.attr("data-sort").and_then(|s| s.trim().parse().ok()).unwrap_or(0),
                html: element.html(),
            })
        })
        .collect()
}

/// Merge fresh annotations into the stored field.
///
/// Returns `None` when nothing was extracted; the stored field is then left
/// alone. Otherwise returns the complete new field: blocks grouped by backend
/// (native first), each group in document order.
pub fn merge(stored: Option<&str>, fresh: &[Annotation], renderer: &Renderer) -> Result<Option<String>> {
    if fresh.is_empty() {
        return Ok(None);
    }
    let mut seen = HashSet::new();
    let mut blocks = Vec::with_capacity(fresh.len());
    for annotation in fresh {
        if !seen.insert(annotation.id.as_str()) {
            continue;
        }
        blocks.push(StoredBlock {
            id: annotation.id.clone(),
            source: Some(annotation.source),
            sort_key: annotation.sort_key,
            html: renderer.block(annotation)?,
        });
    }
    let kept: Vec<StoredBlock> = stored
        .map(stored_blocks)
        .unwrap_or_default()
        .into_iter()
        .filter(|block| !seen.contains(block.id.as_str()))
        .collect();
    tracing::debug!(fresh = blocks.len(), kept = kept.len(), "Merging annotations");
    blocks.extend(kept);
    // Blocks of unknown origin go last.
    blocks.sort_by(|a, b| {
        let rank = |block: &StoredBlock| block.source.map_or(usize::MAX, |s| s as usize);
        rank(a).cmp(&rank(b)).then(a.sort_key.cmp(&b.sort_key)).then_with(|| a.id.cmp(&b.id))
    });
    Ok(Some(Renderer::container(blocks.iter().map(|b| b.html.as_str()))))
}

/// Dedupe-by-id helper for sources that may report the same annotation twice.
pub(crate) fn dedupe(annotations: &mut Vec<Annotation>) {
    let mut seen = HashSet::new();
    annotations.retain(|a| seen.insert(a.id.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn highlight(id: &str, source: Backend, sort_key: i64, text: &str) -> Annotation {
        Annotation {
            id: id.into(),
            source,
            text: text.into(),
            note: None,
            color: None,
            title: "Page 1".into(),
            sort_key,
            timestamp: 1_700_000_000,
        }
    }

    fn fresh() -> Vec<Annotation> {
        vec![
            highlight("cr_5070", Backend::CoolReader, 507_000_000, "third"),
            highlight("kr_1700000002", Backend::KoReader, 2_000_000, "second"),
            highlight("pb_1700000003", Backend::Native, 9_000_000, "first"),
        ]
    }

    #[test]
    fn test_merge_orders_by_backend_then_location() {
        let renderer = Renderer::new().unwrap();
        let html = merge(None, &fresh(), &renderer).unwrap().unwrap();
        let ids: Vec<String> = stored_blocks(&html).into_iter().map(|b| b.id).collect();
        assert_eq!(ids, ["pb_1700000003", "kr_1700000002", "cr_5070"]);
        assert!(html.starts_with(r#"<div class="annotations"><div class="annotation""#));
    }

    #[test]
    fn test_merge_is_idempotent_and_keeps_stale_blocks() {
        let renderer = Renderer::new().unwrap();
        let stale = highlight("kr_1700000001", Backend::KoReader, 1_000_000, "gone from the device");
        let stored = merge(None, &[stale], &renderer).unwrap().unwrap();

        let first = merge(Some(&stored), &fresh(), &renderer).unwrap().unwrap();
        let second = merge(Some(&first), &fresh(), &renderer).unwrap().unwrap();
        assert_eq!(first, second);

        let blocks = stored_blocks(&second);
        let ids: Vec<&str> = blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["pb_1700000003", "kr_1700000001", "kr_1700000002", "cr_5070"]);
        // The kept block is carried byte-for-byte.
        assert_eq!(blocks[1].html, stored_blocks(&stored)[0].html);
        assert!(second.contains("gone from the device"));
    }

    #[test]
    fn test_fresh_annotation_replaces_stored_block() {
        let renderer = Renderer::new().unwrap();
        let stored = merge(None, &[highlight("kr_1700000002", Backend::KoReader, 2_000_000, "old")], &renderer)
            .unwrap()
            .unwrap();
        let merged = merge(Some(&stored), &fresh(), &renderer).unwrap().unwrap();
        assert!(!merged.contains(">old<"));
        assert_eq!(stored_blocks(&merged).len(), 3);
    }

    #[test]
    fn test_nothing_extracted() {
        let renderer = Renderer::new().unwrap();
        assert_eq!(merge(Some("<p>anything</p>"), &[], &renderer).unwrap(), None);
        assert!(stored_blocks("<p>No annotations here</p>").is_empty());
    }

    #[test]
    fn test_dedupe() {
        let mut annotations = fresh();
        annotations.push(highlight("cr_5070", Backend::CoolReader, 1, "duplicate"));
        dedupe(&mut annotations);
        assert_eq!(annotations.len(), 3);
        assert_eq!(annotations[0].text, "third");
    }
}
