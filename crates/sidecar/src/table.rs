//! Loosely-typed nested tables, as written by the reader app.
//!
//! A [`Table`] is an ordered list of key/value pairs. Keys are either names
//! (`["doc_path"]`) or integer indexes (`[1]`); values are booleans, numbers,
//! strings or nested tables. `nil` values are dropped on decode since they
//! never round-trip anyway.

mod parse;
mod write;

pub use self::parse::parse;
pub use self::write::{PROVENANCE, encode};

use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Index(i64),
    Name(String),
}
impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}
impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}
impl From<i64> for Key {
    fn from(index: i64) -> Self {
        Self::Index(index)
    }
}
impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Table(Table),
}
impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integers, and floats without a fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}
impl From<Table> for Value {
    fn from(t: Table) -> Self {
        Self::Table(t)
    }
}

/// An ordered table. Inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    entries: Vec<(Key, Value)>,
}
impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<&Value> {
        let key = key.into();
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: impl Into<Key>) -> Option<&mut Value> {
        let key = key.into();
        self.entries.iter_mut().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Follow a chain of named sub-tables, e.g. `["summary", "status"]`.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let (last, parents) = path.split_last()?;
        let mut table = self;
        for name in parents {
            table = table.get(*name)?.as_table()?;
        }
        table.get(*last)
    }

    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            },
        }
    }

    pub fn remove(&mut self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        let position = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(position).1)
    }

    /// Take every entry out, leaving the table empty.
    pub fn drain(&mut self) -> impl Iterator<Item = (Key, Value)> + '_ {
        self.entries.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Values stored under integer keys, in key order.
    pub fn sequence(&self) -> Vec<&Value> {
        let mut indexed: Vec<(i64, &Value)> = self
            .entries
            .iter()
            .filter_map(|(k, v)| match k {
                Key::Index(i) => Some((*i, v)),
                Key::Name(_) => None,
            })
            .collect();
        indexed.sort_by_key(|(i, _)| *i);
        indexed.into_iter().map(|(_, v)| v).collect()
    }
}
impl FromIterator<(Key, Value)> for Table {
    fn from_iter<T: IntoIterator<Item = (Key, Value)>>(iter: T) -> Self {
        let mut table = Self::new();
        for (k, v) in iter {
            table.insert(k, v);
        }
        table
    }
}
impl IntoIterator for Table {
    type Item = (Key, Value);
    type IntoIter = std::vec::IntoIter<(Key, Value)>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut table = Table::new();
        table.insert("a", 1);
        table.insert("b", 2);
        assert_eq!(table.insert("a", 3), Some(Value::Int(1)));
        let keys: Vec<String> = table.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn test_get_path() {
        let mut summary = Table::new();
        summary.insert("status", "complete");
        let mut table = Table::new();
        table.insert("summary", summary);
        assert_eq!(table.get_path(&["summary", "status"]).and_then(Value::as_str), Some("complete"));
        assert!(table.get_path(&["summary", "rating"]).is_none());
        assert!(table.get_path(&["nope", "status"]).is_none());
        assert!(table.get_path(&[]).is_none());
    }

    #[test]
    fn test_sequence_orders_by_index() {
        let table: Table = [(Key::Index(2), Value::from("b")), (Key::Index(1), Value::from("a")), (Key::from("x"), 0.into())]
            .into_iter()
            .collect();
        let values: Vec<&str> = table.sequence().into_iter().filter_map(Value::as_str).collect();
        assert_eq!(values, ["a", "b"]);
    }
}
