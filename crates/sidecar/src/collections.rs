//! The reader app's shared collection index.
//!
//! One file lists every collection by name. Each collection holds its
//! members as an ordered sequence of `{file = <full path>, order = n}`
//! entries plus a `settings` table carrying the collection's own display
//! order. The `favorites` collection always exists in the app and backs the
//! favorite flag rather than a user collection.

use crate::error::Result;
use crate::file;
use crate::table::{Key, Table, Value};
use std::path::Path;

/// Name of the collection that holds favorites.
pub const FAVORITES: &str = "favorites";

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub file: String,
    pub order: i64,
    pub extras: Table,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub name: String,
    /// Members, kept sorted by `order`.
    pub entries: Vec<Entry>,
    /// The `settings` sub-table, `order` included.
    pub settings: Table,
    pub extras: Table,
}
impl Collection {
    fn new(name: &str, order: i64) -> Self {
        let mut settings = Table::new();
        settings.insert("order", order);
        Self { name: name.to_string(), entries: Vec::new(), settings, extras: Table::new() }
    }

    fn from_table(name: String, table: Table) -> Self {
        let mut entries = Vec::new();
        let mut unordered = Vec::new();
        let mut settings = Table::new();
        let mut extras = Table::new();
        for (key, value) in table {
            match (key, value) {
                (Key::Index(_), Value::Table(mut entry)) => {
                    let Some(file) = entry.remove("file").and_then(|f| f.as_str().map(str::to_string)) else {
                        tracing::warn!(collection = %name, "Dropping collection entry without a file");
                        continue;
                    };
                    match entry.remove("order").and_then(|o| o.as_i64()) {
                        Some(order) => entries.push(Entry { file, order, extras: entry }),
                        None => unordered.push(Entry { file, order: 0, extras: entry }),
                    }
                },
                (Key::Name(n), Value::Table(t)) if n == "settings" => settings = t,
                (key, value) => {
                    extras.insert(key, value);
                },
            }
        }
        // Entries without an order go last, in file order.
        let next = entries.iter().map(|e| e.order).max().unwrap_or(0) + 1;
        for (order, mut entry) in (next..).zip(unordered) {
            entry.order = order;
            entries.push(entry);
        }
        entries.sort_by_key(|e| e.order);
        Self { name, entries, settings, extras }
    }

    fn to_table(&self) -> Table {
        let mut table = self.extras.clone();
        for (i, entry) in (1_i64..).zip(&self.entries) {
            let mut row = entry.extras.clone();
            row.insert("file", entry.file.as_str());
            row.insert("order", entry.order);
            table.insert(i, row);
        }
        table.insert("settings", self.settings.clone());
        table
    }

    pub fn order(&self) -> Option<i64> {
        self.settings.get("order").and_then(Value::as_i64)
    }

    pub fn contains(&self, file: &str) -> bool {
        self.entries.iter().any(|e| e.file == file)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionIndex {
    collections: Vec<Collection>,
    /// Top-level values that are not collection tables.
    extras: Table,
}
impl CollectionIndex {
    pub fn from_table(table: Table) -> Self {
        let mut index = Self::default();
        for (key, value) in table {
            match (key, value) {
                (Key::Name(name), Value::Table(t)) => index.collections.push(Collection::from_table(name, t)),
                (key, value) => {
                    index.extras.insert(key, value);
                },
            }
        }
        index
    }

    pub fn to_table(&self) -> Table {
        let mut table = self.extras.clone();
        for collection in &self.collections {
            table.insert(collection.name.as_str(), collection.to_table());
        }
        table
    }

    /// Load the index. A missing or malformed file is an empty index.
    pub async fn load(path: &Path) -> Result<Self> {
        Ok(file::read_table(path).await?.map(Self::from_table).unwrap_or_default())
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        file::write_table(path, &self.to_table()).await
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Names of the collections (favorites excluded) that list `file`.
    pub fn memberships(&self, file: &str) -> Vec<&str> {
        self.collections
            .iter()
            .filter(|c| c.name != FAVORITES && c.contains(file))
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str, file: &str) -> bool {
        self.get(name).is_some_and(|c| c.contains(file))
    }

    /// Add `file` to the named collection, creating the collection after all
    /// existing ones. Returns whether anything changed.
    pub fn add(&mut self, name: &str, file: &str) -> bool {
        if self.contains(name, file) {
            return false;
        }
        let position = match self.collections.iter().position(|c| c.name == name) {
            Some(position) => position,
            None => {
                let order = self.collections.iter().filter_map(Collection::order).max().unwrap_or(0) + 1;
                self.collections.push(Collection::new(name, order));
                self.collections.len() - 1
            },
        };
        let collection = &mut self.collections[position];
        let order = collection.entries.iter().map(|e| e.order).max().unwrap_or(0) + 1;
        collection.entries.push(Entry { file: file.to_string(), order, extras: Table::new() });
        true
    }

    /// Remove `file` from the named collection. The collection itself stays,
    /// even when empty. Returns whether anything changed.
    pub fn remove(&mut self, name: &str, file: &str) -> bool {
        let Some(collection) = self.collections.iter_mut().find(|c| c.name == name) else {
            return false;
        };
        let before = collection.entries.len();
        collection.entries.retain(|e| e.file != file);
        collection.entries.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{encode, parse};

    const SAMPLE: &str = r#"-- we can read Lua syntax here!
return {
    ["Classics"] = {
        [1] = {
            ["file"] = "/mnt/ext1/Books/moby.epub",
            ["order"] = 2,
        },
        [2] = {
            ["file"] = "/mnt/ext1/Books/emma.epub",
            ["order"] = 1,
        },
        ["settings"] = {
            ["order"] = 2,
        },
    },
    ["favorites"] = {
        [1] = {
            ["file"] = "/mnt/ext1/Books/moby.epub",
            ["order"] = 1,
        },
        ["settings"] = {
            ["order"] = 1,
        },
    },
}
"#;

    #[test]
    fn test_memberships_exclude_favorites() {
        let index = CollectionIndex::from_table(parse(SAMPLE).unwrap());
        assert_eq!(index.memberships("/mnt/ext1/Books/moby.epub"), ["Classics"]);
        assert!(index.contains(FAVORITES, "/mnt/ext1/Books/moby.epub"));
        assert!(!index.contains(FAVORITES, "/mnt/ext1/Books/emma.epub"));
        // Entries come back in display order.
        let classics = index.get("Classics").unwrap();
        assert_eq!(classics.entries[0].file, "/mnt/ext1/Books/emma.epub");
    }

    #[test]
    fn test_add_and_remove() {
        let mut index = CollectionIndex::from_table(parse(SAMPLE).unwrap());
        assert!(index.add("Whales", "/mnt/ext1/Books/moby.epub"));
        assert!(!index.add("Whales", "/mnt/ext1/Books/moby.epub"));
        let whales = index.get("Whales").unwrap();
        assert_eq!(whales.order(), Some(3));
        assert_eq!(whales.entries[0].order, 1);

        assert!(index.add("Classics", "/mnt/ext1/Books/new.epub"));
        assert_eq!(index.get("Classics").unwrap().entries.last().map(|e| e.order), Some(3));

        assert!(index.remove("Classics", "/mnt/ext1/Books/moby.epub"));
        assert!(!index.remove("Classics", "/mnt/ext1/Books/moby.epub"));
        assert!(!index.remove("Nope", "/mnt/ext1/Books/moby.epub"));
        assert_eq!(index.memberships("/mnt/ext1/Books/moby.epub"), ["Whales"]);
    }

    #[test]
    fn test_entries_without_order_go_last() {
        let text = r#"return {
    ["Classics"] = {
        [1] = { ["file"] = "/mnt/ext1/Books/a.epub" },
        [2] = { ["file"] = "/mnt/ext1/Books/b.epub", ["order"] = 4 },
        [3] = { ["file"] = "/mnt/ext1/Books/c.epub" },
    },
}"#;
        let index = CollectionIndex::from_table(parse(text).unwrap());
        let orders: Vec<(&str, i64)> =
            index.get("Classics").unwrap().entries.iter().map(|e| (e.file.as_str(), e.order)).collect();
        assert_eq!(orders, [("/mnt/ext1/Books/b.epub", 4), ("/mnt/ext1/Books/a.epub", 5), ("/mnt/ext1/Books/c.epub", 6)]);

        let encoded = encode(&index.to_table());
        assert!(!encoded.contains(&i64::MAX.to_string()));
        assert!(encoded.contains("[\"order\"] = 6"));
    }

    #[test]
    fn test_rewrite_is_stable() {
        let index = CollectionIndex::from_table(parse(SAMPLE).unwrap());
        let once = encode(&index.to_table());
        let twice = encode(&CollectionIndex::from_table(parse(&once).unwrap()).to_table());
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings/collection.lua");
        let mut index = CollectionIndex::load(&path).await.unwrap();
        assert_eq!(index.collections().count(), 0);
        index.add(FAVORITES, "/mnt/ext1/a.epub");
        index.save(&path).await.unwrap();
        let reloaded = CollectionIndex::load(&path).await.unwrap();
        assert!(reloaded.contains(FAVORITES, "/mnt/ext1/a.epub"));
    }
}
