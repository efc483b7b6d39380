#![allow(dead_code)]

use shelfsync_config::Config;
use shelfsync_explorer::Explorer;
use shelfsync_reconcile::error::Result;
use shelfsync_reconcile::{BookId, Catalog, ColumnKind, FieldValue, SessionContext};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const COLLECTIONS: &str = "#shelves";
pub const READ: &str = "#read";
pub const FAVORITE: &str = "#fav";
pub const RATING: &str = "rating";
pub const REVIEW: &str = "#review";
pub const POSITION: &str = "#position";
pub const ANNOTATIONS: &str = "#annotations";

/// Moby Dick: catalog 1, device book 10. Emma: catalog 2, device book 11.
pub const MOBY: BookId = 1;
pub const EMMA: BookId = 2;
pub const MOBY_NATIVE: i64 = 10;

const INDEX: &str = r#"[
    {"application_id": 1, "lpath": "Books/moby.epub", "size": 1000, "title": "Moby Dick", "authors": ["Herman Melville"]},
    {"application_id": 2, "lpath": "Books/emma.epub", "size": 2000, "title": "Emma", "authors": ["Jane Austen"]}
]"#;

const DEVICE_BOOKS: &str = r#"
    INSERT INTO folders (id, storageid, name) VALUES (1, 1, '/mnt/ext1/Books');
    INSERT INTO books_impl (id, title, author, firstauthor) VALUES (10, 'Moby Dick', '', ''), (11, 'Emma', 'Jane Austen', 'Jane Austen');
    INSERT INTO files (folder_id, book_id, filename, size) VALUES (1, 10, 'moby.epub', 1000), (1, 11, 'emma.epub', 2000);
"#;

/// An in-memory catalog.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    pub books: Vec<BookId>,
    pub columns: HashMap<String, ColumnKind>,
    pub fields: HashMap<(BookId, String), FieldValue>,
    pub modified: HashMap<BookId, i64>,
}
impl MemoryCatalog {
    pub fn new(books: &[BookId]) -> Self {
        let columns = [
            (COLLECTIONS, ColumnKind::Names),
            (READ, ColumnKind::Bool),
            (FAVORITE, ColumnKind::Bool),
            (RATING, ColumnKind::Rating),
            (REVIEW, ColumnKind::Comments),
            (POSITION, ColumnKind::Text),
            (ANNOTATIONS, ColumnKind::Comments),
        ]
        .into_iter()
        .map(|(c, k)| (c.to_string(), k))
        .collect();
        Self { books: books.to_vec(), columns, ..Self::default() }
    }

    pub fn set(&mut self, book: BookId, column: &str, value: FieldValue) {
        self.fields.insert((book, column.to_string()), value);
    }

    pub fn get(&self, book: BookId, column: &str) -> Option<&FieldValue> {
        self.fields.get(&(book, column.to_string()))
    }
}
impl Catalog for MemoryCatalog {
    fn book_ids(&self) -> Vec<BookId> {
        self.books.clone()
    }

    fn column_kind(&self, column: &str) -> Option<ColumnKind> {
        self.columns.get(column).copied()
    }

    fn last_modified(&self, book: BookId) -> Option<i64> {
        self.modified.get(&book).copied()
    }

    fn field(&self, book: BookId, column: &str) -> Option<FieldValue> {
        self.get(book, column).cloned()
    }

    fn set_field(&mut self, book: BookId, column: &str, value: Option<FieldValue>) -> Result<()> {
        match value {
            Some(value) => self.set(book, column, value),
            None => {
                self.fields.remove(&(book, column.to_string()));
            },
        }
        Ok(())
    }
}

pub fn names(names: &[&str]) -> FieldValue {
    FieldValue::Names(names.iter().map(|n| n.to_string()).collect())
}

/// A mounted device: a main storage root with a book index, and the
/// explorer database in memory.
pub struct Device {
    pub root: TempDir,
    pub explorer: Explorer,
    pub config: Config,
}
impl Device {
    pub async fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        tokio::fs::write(root.path().join("metadata.calibre"), INDEX).await.unwrap();
        let explorer = Explorer::connect_in_memory().await.unwrap();
        sqlx::raw_sql(DEVICE_BOOKS).execute(explorer.pool()).await.unwrap();

        let mut config = Config::default();
        config.device.main_root = root.path().to_path_buf();
        config.columns.collections = Some(COLLECTIONS.into());
        config.columns.read = Some(READ.into());
        config.columns.favorite = Some(FAVORITE.into());
        config.columns.rating = Some(RATING.into());
        config.columns.review = Some(REVIEW.into());
        config.columns.position = Some(POSITION.into());
        config.columns.annotations = Some(ANNOTATIONS.into());
        Self { root, explorer, config }
    }

    pub fn main_root(&self) -> &Path {
        self.root.path()
    }

    /// Pretend the sidecar-based app is installed.
    pub async fn install_koreader(&self) {
        tokio::fs::create_dir_all(self.main_root().join("applications/koreader")).await.unwrap();
    }

    /// Pretend the bookmark-history based app is installed.
    pub async fn install_coolreader(&self) {
        tokio::fs::create_dir_all(self.main_root().join("system/config/cr3")).await.unwrap();
    }

    /// Where the app keeps Moby Dick's settings.
    pub fn moby_sidecar(&self) -> PathBuf {
        self.main_root().join("Books/moby.sdr/metadata.epub.lua")
    }

    pub async fn write_moby_sidecar(&self, content: &str) {
        let path = self.moby_sidecar();
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, content).await.unwrap();
    }

    pub async fn sql(&self, sql: &str) {
        sqlx::raw_sql(sql).execute(self.explorer.pool()).await.unwrap();
    }

    pub async fn session(&self, catalog: &MemoryCatalog) -> SessionContext {
        SessionContext::with_explorer(&self.config, catalog, self.explorer.clone()).await.unwrap()
    }
}
