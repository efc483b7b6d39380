//! Per-book settings of the reader app.
//!
//! Only the keys shelfsync reads or writes are typed. Everything else is
//! carried in `extras` bags and written back untouched.

use crate::error::Result;
use crate::file;
use crate::table::{Key, Table, Value};
use std::path::Path;
use time::PrimitiveDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// Status value the app uses for a finished book.
pub const STATUS_COMPLETE: &str = "complete";
/// Highest rating the app supports.
pub const MAX_RATING: i64 = 5;

const DATETIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocSettings {
    pub doc_path: Option<String>,
    /// Current reading position.
    pub last_xpointer: Option<String>,
    pub cre_dom_version: Option<i64>,
    pub summary: Summary,
    pub annotations: Vec<Annotation>,
    /// Entries of the `annotations` table that are not indexed tables. They
    /// keep their keys; annotations are numbered around them.
    pub annotation_extras: Table,
    pub extras: Table,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    /// `reading`, `complete`, `abandoned`...
    pub status: Option<String>,
    /// Stars, 0 to 5.
    pub rating: Option<i64>,
    /// Review text.
    pub note: Option<String>,
    pub extras: Table,
}

/// A highlight or note.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotation {
    /// Local time the annotation was made, `YYYY-MM-DD HH:MM:SS`.
    pub datetime: Option<String>,
    pub text: Option<String>,
    pub note: Option<String>,
    pub color: Option<String>,
    pub chapter: Option<String>,
    pub pageno: Option<i64>,
    /// Start of the highlighted range: an xpointer string for reflowable
    /// documents, a coordinate table for fixed-layout ones.
    pub pos0: Option<Value>,
    pub page: Option<Value>,
    pub extras: Table,
}
impl Annotation {
    fn from_table(mut table: Table) -> Self {
        Self {
            datetime: take(&mut table, "datetime", string),
            text: take(&mut table, "text", string),
            note: take(&mut table, "note", string),
            color: take(&mut table, "color", string),
            chapter: take(&mut table, "chapter", string),
            pageno: take(&mut table, "pageno", Value::as_i64),
            pos0: table.remove("pos0"),
            page: table.remove("page"),
            extras: table,
        }
    }

    fn to_table(&self) -> Table {
        let mut table = self.extras.clone();
        put(&mut table, "datetime", self.datetime.clone());
        put(&mut table, "text", self.text.clone());
        put(&mut table, "note", self.note.clone());
        put(&mut table, "color", self.color.clone());
        put(&mut table, "chapter", self.chapter.clone());
        put(&mut table, "pageno", self.pageno);
        put(&mut table, "pos0", self.pos0.clone());
        put(&mut table, "page", self.page.clone());
        table
    }

    /// Creation time as epoch seconds. The app records local time without a
    /// zone; it is read as UTC.
    pub fn timestamp(&self) -> Option<i64> {
        let datetime = self.datetime.as_deref()?;
        let parsed = PrimitiveDateTime::parse(datetime.trim(), DATETIME_FORMAT).ok()?;
        Some(parsed.assume_utc().unix_timestamp())
    }

    /// The reflowable position of the highlight start, when there is one.
    pub fn xpointer(&self) -> Option<&str> {
        self.pos0.as_ref().and_then(Value::as_str).or_else(|| self.page.as_ref().and_then(Value::as_str))
    }
}

impl Summary {
    fn from_table(mut table: Table) -> Self {
        Self {
            status: take(&mut table, "status", string),
            rating: take(&mut table, "rating", Value::as_i64),
            note: take(&mut table, "note", string),
            extras: table,
        }
    }

    fn to_table(&self) -> Table {
        let mut table = self.extras.clone();
        put(&mut table, "status", self.status.clone());
        put(&mut table, "rating", self.rating);
        put(&mut table, "note", self.note.clone());
        table
    }
}

impl DocSettings {
    pub fn from_table(mut table: Table) -> Self {
        let summary = match table.remove("summary") {
            Some(Value::Table(summary)) => Summary::from_table(summary),
            Some(other) => {
                table.insert("summary", other);
                Summary::default()
            },
            None => Summary::default(),
        };
        let (annotations, annotation_extras) = match table.remove("annotations") {
            Some(Value::Table(list)) => split_annotations(list),
            Some(other) => {
                table.insert("annotations", other);
                (Vec::new(), Table::new())
            },
            None => (Vec::new(), Table::new()),
        };
        Self {
            doc_path: take(&mut table, "doc_path", string),
            last_xpointer: take(&mut table, "last_xpointer", string),
            cre_dom_version: take(&mut table, "cre_dom_version", Value::as_i64),
            summary,
            annotations,
            annotation_extras,
            extras: table,
        }
    }

    pub fn to_table(&self) -> Table {
        let mut table = self.extras.clone();
        put(&mut table, "doc_path", self.doc_path.clone());
        put(&mut table, "last_xpointer", self.last_xpointer.clone());
        put(&mut table, "cre_dom_version", self.cre_dom_version);
        let summary = self.summary.to_table();
        if !summary.is_empty() {
            table.insert("summary", summary);
        }
        if !self.annotations.is_empty() || !self.annotation_extras.is_empty() {
            let mut list = self.annotation_extras.clone();
            let free = (1_i64..).filter(|i| self.annotation_extras.get(*i).is_none());
            for (i, annotation) in free.zip(&self.annotations) {
                list.insert(i, annotation.to_table());
            }
            table.insert("annotations", list);
        }
        table
    }

    /// Load a sidecar file; `None` when it is missing or malformed.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        Ok(file::read_table(path).await?.map(Self::from_table))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        file::write_table(path, &self.to_table()).await
    }

    pub fn is_complete(&self) -> bool {
        self.summary.status.as_deref() == Some(STATUS_COMPLETE)
    }

    /// Mark the book finished, or drop a finished status. Other statuses
    /// (`reading`, `abandoned`) are left alone when clearing. Returns whether
    /// anything changed.
    pub fn set_complete(&mut self, complete: bool) -> bool {
        match (complete, self.is_complete()) {
            (true, false) => {
                self.summary.status = Some(STATUS_COMPLETE.to_string());
                true
            },
            (false, true) => {
                self.summary.status = None;
                true
            },
            _ => false,
        }
    }
}

/// Indexed tables are annotations, in index order. Anything else stays as it
/// was found.
fn split_annotations(list: Table) -> (Vec<Annotation>, Table) {
    let mut indexed = Vec::new();
    let mut extras = Table::new();
    for (key, value) in list {
        match (key, value) {
            (Key::Index(i), Value::Table(t)) => indexed.push((i, t)),
            (key, value) => {
                tracing::debug!(%key, "Keeping annotation entry that is not an indexed table");
                extras.insert(key, value);
            },
        }
    }
    indexed.sort_by_key(|(i, _)| *i);
    (indexed.into_iter().map(|(_, t)| Annotation::from_table(t)).collect(), extras)
}

fn string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

/// Remove `key` when its value has the expected shape; otherwise leave it in
/// place so it is written back as it was.
fn take<T>(table: &mut Table, key: &str, shape: impl Fn(&Value) -> Option<T>) -> Option<T> {
    let value = table.get(key).and_then(shape)?;
    table.remove(key);
    Some(value)
}

fn put<V: Into<Value>>(table: &mut Table, key: &str, value: Option<V>) {
    match value {
        Some(value) => {
            table.insert(key, value);
        },
        None => {
            table.remove(key);
        },
    }
}
