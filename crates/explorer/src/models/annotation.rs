use serde::Deserialize;

/// A highlight, note or bookmark made in the device's built-in reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeAnnotation {
    pub item_id: i64,
    pub timestamp: Option<i64>,
    /// `highlight`, `note`, `bookmark`...
    pub kind: Option<String>,
    pub text: Option<String>,
    /// Reader location, e.g. `pbr:/word?page=12&offs=340`.
    pub anchor: Option<String>,
    pub note: Option<String>,
    pub color: Option<String>,
}

/// One tag value of one bookmark item, as joined by `list_annotation_tags.sql`.
#[derive(sqlx::FromRow)]
pub(crate) struct AnnotationTagRow {
    pub(crate) item_id: i64,
    pub(crate) timestamp: Option<i64>,
    pub(crate) tag: String,
    pub(crate) value: Option<String>,
}

#[derive(Deserialize)]
struct Quotation {
    text: Option<String>,
    begin: Option<String>,
}

#[derive(Deserialize)]
struct Note {
    text: Option<String>,
}

impl NativeAnnotation {
    /// Fold tag rows (ordered by item) into one annotation per item.
    ///
    /// Tag values that fail to decode are skipped rather than failing the whole
    /// book: the device occasionally leaves half-written bookmark items behind.
    pub(crate) fn collect(rows: Vec<AnnotationTagRow>) -> Vec<Self> {
        let mut annotations: Vec<Self> = Vec::new();
        for row in rows {
            if annotations.last().is_none_or(|last| last.item_id != row.item_id) {
                annotations.push(Self { item_id: row.item_id, timestamp: row.timestamp, ..Self::default() });
            }
            let Some(current) = annotations.last_mut() else { continue };
            let Some(value) = row.value else { continue };
            match row.tag.as_str() {
                "bm.quotation" => match serde_json::from_str::<Quotation>(&value) {
                    Ok(quote) => {
                        current.text = quote.text.filter(|t| !t.is_empty());
                        current.anchor = quote.begin;
                    },
                    Err(e) => tracing::warn!(item = row.item_id, error = %e, "Skipping undecodable quotation"),
                },
                "bm.note" => match serde_json::from_str::<Note>(&value) {
                    Ok(note) => current.note = note.text.filter(|t| !t.is_empty()),
                    Err(e) => tracing::warn!(item = row.item_id, error = %e, "Skipping undecodable note"),
                },
                "bm.color" => current.color = Some(value).filter(|c| !c.is_empty()),
                "bm.type" => current.kind = Some(value),
                _ => (),
            }
        }
        annotations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(item_id: i64, tag: &str, value: &str) -> AnnotationTagRow {
        AnnotationTagRow {
            item_id,
            timestamp: Some(1_700_000_000 + item_id),
            tag: tag.to_string(),
            value: Some(value.to_string()),
        }
    }

    #[test]
    fn test_collect_groups_by_item() {
        let rows = vec![
            row(1, "bm.color", "yellow"),
            row(1, "bm.quotation", r#"{"text": "Call me Ishmael.", "begin": "pbr:/word?page=1&offs=0"}"#),
            row(1, "bm.type", "highlight"),
            row(2, "bm.note", r#"{"text": "remember this"}"#),
            row(2, "bm.quotation", r#"{"text": "Some years ago", "begin": "pbr:/word?page=1&offs=17"}"#),
        ];
        let annotations = NativeAnnotation::collect(rows);
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].text.as_deref(), Some("Call me Ishmael."));
        assert_eq!(annotations[0].color.as_deref(), Some("yellow"));
        assert_eq!(annotations[0].kind.as_deref(), Some("highlight"));
        assert_eq!(annotations[0].timestamp, Some(1_700_000_001));
        assert_eq!(annotations[1].note.as_deref(), Some("remember this"));
        assert_eq!(annotations[1].anchor.as_deref(), Some("pbr:/word?page=1&offs=17"));
    }

    #[test]
    fn test_collect_skips_broken_json() {
        let rows = vec![row(1, "bm.quotation", "{not json"), row(1, "bm.color", "red")];
        let annotations = NativeAnnotation::collect(rows);
        assert_eq!(annotations.len(), 1);
        assert!(annotations[0].text.is_none());
        assert_eq!(annotations[0].color.as_deref(), Some("red"));
    }
}
