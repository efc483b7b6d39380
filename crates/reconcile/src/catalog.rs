//! The catalog side of a sync: a field store keyed by book and column.

use crate::error::Result;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Identifier of a book in the catalog.
pub type BookId = i64;

/// Shape of a catalog column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Bool,
    /// An ordered set of names (tags, collections).
    Names,
    /// Long-form HTML text.
    Comments,
    /// Stars on a 0 to 10 scale in steps of one half star.
    Rating,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Bool(bool),
    Names(Vec<String>),
    Rating(i64),
    Text(String),
}
impl FieldValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_names(&self) -> Option<&[String]> {
        match self {
            Self::Names(names) => Some(names),
            _ => None,
        }
    }

    pub fn as_rating(&self) -> Option<i64> {
        match self {
            Self::Rating(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }
}
impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Names(names) => write!(f, "{}", names.join(", ")),
            Self::Rating(r) => write!(f, "{r}"),
            Self::Text(t) => write!(f, "{t}"),
        }
    }
}

/// Field-level access to the catalog.
///
/// Reads happen during a run; writes only when a [`PendingChanges`](crate::PendingChanges)
/// batch is applied after it.
pub trait Catalog {
    fn book_ids(&self) -> Vec<BookId>;

    /// Kind of the named column, or `None` when the catalog has no such column.
    fn column_kind(&self, column: &str) -> Option<ColumnKind>;

    /// Last time anything about the book changed, as epoch seconds.
    fn last_modified(&self, book: BookId) -> Option<i64>;

    /// Current value; `None` when the field is empty.
    fn field(&self, book: BookId, column: &str) -> Option<FieldValue>;

    /// Replace a value; `None` clears the field.
    fn set_field(&mut self, book: BookId, column: &str, value: Option<FieldValue>) -> Result<()>;
}
