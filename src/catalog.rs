//! A catalog kept in a JSON file.
//!
//! ```json
//! {
//!   "columns": {"#read": "bool", "#shelves": "names", "rating": "rating"},
//!   "books": [
//!     {"id": 1, "last_modified": 1700000000, "fields": {"#read": true, "#shelves": ["Classics"]}}
//!   ]
//! }
//! ```

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shelfsync_reconcile::error::ErrorKind as ReconcileErrorKind;
use shelfsync_reconcile::{BookId, Catalog, ColumnKind, FieldValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Kind {
    Bool,
    Names,
    Comments,
    Rating,
    Text,
}
impl From<Kind> for ColumnKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Bool => Self::Bool,
            Kind::Names => Self::Names,
            Kind::Comments => Self::Comments,
            Kind::Rating => Self::Rating,
            Kind::Text => Self::Text,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    columns: BTreeMap<String, Kind>,
    #[serde(default)]
    books: Vec<Book>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Book {
    id: BookId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_modified: Option<i64>,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

#[derive(Debug)]
pub struct JsonCatalog {
    path: PathBuf,
    document: Document,
}
impl JsonCatalog {
    #[instrument(level = "debug", fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.or_raise(|| ErrorKind::CatalogFile(path.to_path_buf()))?;
        let document: Document =
            serde_json::from_slice(&bytes).or_raise(|| ErrorKind::CatalogFile(path.to_path_buf()))?;
        tracing::debug!(books = document.books.len(), columns = document.columns.len(), "Loaded catalog");
        Ok(Self { path: path.to_path_buf(), document })
    }

    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub async fn save(&self) -> Result<()> {
        let mut bytes =
            serde_json::to_vec_pretty(&self.document).or_raise(|| ErrorKind::CatalogFile(self.path.clone()))?;
        bytes.push(b'\n');
        tokio::fs::write(&self.path, bytes).await.or_raise(|| ErrorKind::CatalogFile(self.path.clone()))?;
        Ok(())
    }

    fn book(&self, id: BookId) -> Option<&Book> {
        self.document.books.iter().find(|b| b.id == id)
    }
}

/// Read a stored value as the column's kind. Values of the wrong shape read
/// as empty.
fn decode(kind: ColumnKind, value: &Value) -> Option<FieldValue> {
    match kind {
        ColumnKind::Bool => value.as_bool().map(FieldValue::Bool),
        ColumnKind::Names => {
            let names: Vec<String> = value.as_array()?.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            (!names.is_empty()).then_some(FieldValue::Names(names))
        },
        ColumnKind::Rating => value.as_i64().map(FieldValue::Rating),
        ColumnKind::Comments | ColumnKind::Text => {
            value.as_str().filter(|s| !s.is_empty()).map(|s| FieldValue::Text(s.to_string()))
        },
    }
}

fn encode(value: FieldValue) -> Value {
    match value {
        FieldValue::Bool(b) => Value::Bool(b),
        FieldValue::Names(names) => Value::Array(names.into_iter().map(Value::String).collect()),
        FieldValue::Rating(r) => Value::from(r),
        FieldValue::Text(t) => Value::String(t),
    }
}

impl Catalog for JsonCatalog {
    fn book_ids(&self) -> Vec<BookId> {
        self.document.books.iter().map(|b| b.id).collect()
    }

    fn column_kind(&self, column: &str) -> Option<ColumnKind> {
        self.document.columns.get(column).copied().map(ColumnKind::from)
    }

    fn last_modified(&self, book: BookId) -> Option<i64> {
        self.book(book)?.last_modified
    }

    fn field(&self, book: BookId, column: &str) -> Option<FieldValue> {
        let kind = self.column_kind(column)?;
        decode(kind, self.book(book)?.fields.get(column)?)
    }

    fn set_field(&mut self, book: BookId, column: &str, value: Option<FieldValue>) -> shelfsync_reconcile::error::Result<()> {
        if self.column_kind(column).is_none() {
            exn::bail!(ReconcileErrorKind::Catalog(format!("no column `{column}`")));
        }
        let Some(entry) = self.document.books.iter_mut().find(|b| b.id == book) else {
            exn::bail!(ReconcileErrorKind::Catalog(format!("no book {book}")));
        };
        match value {
            Some(value) => {
                entry.fields.insert(column.to_string(), encode(value));
            },
            None => {
                entry.fields.remove(column);
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CATALOG: &str = r##"{
        "columns": {"#read": "bool", "#shelves": "names", "rating": "rating", "#review": "comments"},
        "books": [
            {"id": 1, "last_modified": 1700000000, "fields": {"#read": true, "#shelves": ["Classics", "Whales"], "rating": 8}},
            {"id": 2, "fields": {"#read": "yes", "#review": ""}}
        ]
    }"##;

    async fn catalog() -> (tempfile::TempDir, JsonCatalog) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        tokio::fs::write(&path, CATALOG).await.unwrap();
        let catalog = JsonCatalog::load(&path).await.unwrap();
        (dir, catalog)
    }

    #[rstest]
    #[case(1, "#read", Some(FieldValue::Bool(true)))]
    #[case(1, "#shelves", Some(FieldValue::Names(vec!["Classics".into(), "Whales".into()])))]
    #[case(1, "rating", Some(FieldValue::Rating(8)))]
    #[case(1, "#review", None)]
    #[case(2, "#read", None)]
    #[case(2, "#review", None)]
    #[case(1, "#unknown", None)]
    #[case(3, "#read", None)]
    #[tokio::test]
    async fn test_field(#[case] book: BookId, #[case] column: &str, #[case] expected: Option<FieldValue>) {
        let (_dir, catalog) = catalog().await;
        assert_eq!(catalog.field(book, column), expected);
    }

    #[tokio::test]
    async fn test_metadata() {
        let (_dir, catalog) = catalog().await;
        assert_eq!(catalog.book_ids(), [1, 2]);
        assert_eq!(catalog.column_kind("#review"), Some(ColumnKind::Comments));
        assert_eq!(catalog.column_kind("#position"), None);
        assert_eq!(catalog.last_modified(1), Some(1_700_000_000));
        assert_eq!(catalog.last_modified(2), None);
    }

    #[tokio::test]
    async fn test_set_field_and_save() {
        let (dir, mut catalog) = catalog().await;
        catalog.set_field(2, "#read", Some(FieldValue::Bool(false))).unwrap();
        catalog.set_field(1, "#shelves", None).unwrap();
        catalog.save().await.unwrap();

        let reloaded = JsonCatalog::load(&dir.path().join("catalog.json")).await.unwrap();
        assert_eq!(reloaded.field(2, "#read"), Some(FieldValue::Bool(false)));
        assert_eq!(reloaded.field(1, "#shelves"), None);
        assert_eq!(reloaded.field(1, "rating"), Some(FieldValue::Rating(8)));
    }

    #[tokio::test]
    async fn test_set_field_rejects_unknown() {
        let (_dir, mut catalog) = catalog().await;
        let err = catalog.set_field(3, "#read", Some(FieldValue::Bool(true))).unwrap_err();
        assert!(matches!(&*err, ReconcileErrorKind::Catalog(_)));
        let err = catalog.set_field(1, "#nope", None).unwrap_err();
        assert!(matches!(&*err, ReconcileErrorKind::Catalog(_)));
    }

    #[tokio::test]
    async fn test_load_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        let err = JsonCatalog::load(&path).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::CatalogFile(_)));
    }
}
