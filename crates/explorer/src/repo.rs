//! Queries against the explorer database.
//!
//! Book lookups go through the folder index (`folders` → `files`), shelves
//! and memberships are soft-deleted only, and reading state is keyed by
//! `(book, profile)`.

use crate::error::{ErrorKind, Result};
use crate::models::{
    AnnotationTagRow, Membership, MembershipRow, NativeAnnotation, Settings, SettingsRow, Shelf, ShelfRow,
    StoragePrefixes, encode_flag,
};
use crate::{NativeBookId, ProfileId};
use exn::{OptionExt, ResultExt};
use sqlx::SqlitePool;
use tracing::instrument;

/// Profile used when none is configured (or the device has no profile table).
pub const DEFAULT_PROFILE_ID: ProfileId = 1;

/// Repository for reading and mutating the explorer database.
///
/// Every mutating method is a single auto-committed statement.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Device facts
    // =========================================================================

    /// Path prefixes of the internal storage and the memory card as the device
    /// sees them. Storages the database does not know about keep their
    /// conventional prefixes.
    pub async fn storage_prefixes(&self) -> Result<StoragePrefixes> {
        let mut prefixes = StoragePrefixes::default();
        if let Some(main) = self.storage_prefix("InternalStorage").await? {
            prefixes.main = main;
        }
        if let Some(card) = self.storage_prefix("SDCard%").await? {
            prefixes.card = card;
        }
        Ok(prefixes)
    }

    async fn storage_prefix(&self, storage: &str) -> Result<Option<String>> {
        let folder: Option<String> = sqlx::query_scalar(include_str!("../queries/storage_prefix.sql"))
            .bind(storage)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(folder.as_deref().and_then(StoragePrefixes::prefix_of))
    }

    /// Resolve the id of the named profile, falling back to
    /// [`DEFAULT_PROFILE_ID`] when no name is given, the name is unknown, or
    /// the device keeps no profile table.
    pub async fn profile_id(&self, name: Option<&str>) -> Result<ProfileId> {
        let Some(name) = name else {
            return Ok(DEFAULT_PROFILE_ID);
        };
        match sqlx::query_scalar::<_, i64>(include_str!("../queries/profile_id.sql"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(Some(id)) => Ok(id),
            Ok(None) => {
                tracing::warn!(profile = name, "Unknown device profile; using the default profile");
                Ok(DEFAULT_PROFILE_ID)
            },
            // Older firmware has no profiles at all.
            Err(sqlx::Error::Database(e)) if e.message().contains("no such table") => Ok(DEFAULT_PROFILE_ID),
            Err(e) => Err(e).or_raise(|| ErrorKind::Database),
        }
    }

    // =========================================================================
    // Books
    // =========================================================================

    /// Find the book stored as `filename` inside the folder named exactly
    /// `folder` (e.g. `/mnt/ext1/Books`).
    #[instrument(level = "trace", skip(self))]
    pub async fn find_book(&self, folder: &str, filename: &str) -> Result<Option<NativeBookId>> {
        let folder_id: Option<i64> = sqlx::query_scalar(include_str!("../queries/folder_id.sql"))
            .bind(folder)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let Some(folder_id) = folder_id else {
            return Ok(None);
        };
        sqlx::query_scalar(include_str!("../queries/file_by_name.sql"))
            .bind(folder_id)
            .bind(filename)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// The author string the device shows for a book, if the book row exists.
    pub async fn book_author(&self, book: NativeBookId) -> Result<Option<String>> {
        let author: Option<Option<String>> = sqlx::query_scalar(include_str!("../queries/book_author.sql"))
            .bind(book)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(author.map(Option::unwrap_or_default))
    }

    pub async fn set_authors(&self, book: NativeBookId, authors: &[String]) -> Result<()> {
        let first = authors.first().ok_or_raise(|| ErrorKind::InvalidData("empty author list"))?;
        sqlx::query(include_str!("../queries/update_authors.sql"))
            .bind(authors.join(", "))
            .bind(first)
            .bind(book)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Shelves
    // =========================================================================

    pub async fn shelves(&self) -> Result<Vec<Shelf>> {
        let rows: Vec<ShelfRow> = sqlx::query_as(include_str!("../queries/list_shelves.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().map(Shelf::from).collect())
    }

    /// Look up a shelf by exact name, preferring a live shelf over a deleted
    /// one when both exist.
    pub async fn shelf_by_name(&self, name: &str) -> Result<Option<Shelf>> {
        let row: Option<ShelfRow> = sqlx::query_as(include_str!("../queries/shelf_by_name.sql"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row.map(Shelf::from))
    }

    /// Create a shelf and return its id.
    pub async fn create_shelf(&self, name: &str, ts: i64) -> Result<i64> {
        let result = sqlx::query(include_str!("../queries/insert_shelf.sql"))
            .bind(name)
            .bind(ts)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.last_insert_rowid())
    }

    /// Clear the deleted flag of a shelf that was removed on the device.
    pub async fn revive_shelf(&self, shelf_id: i64, ts: i64) -> Result<()> {
        sqlx::query(include_str!("../queries/revive_shelf.sql"))
            .bind(ts)
            .bind(shelf_id)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Every membership row of a book, deleted ones included.
    pub async fn memberships(&self, book: NativeBookId) -> Result<Vec<Membership>> {
        let rows: Vec<MembershipRow> = sqlx::query_as(include_str!("../queries/memberships_for_book.sql"))
            .bind(book)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().map(Membership::from).collect())
    }

    pub async fn add_membership(&self, shelf_id: i64, book: NativeBookId, ts: i64) -> Result<()> {
        sqlx::query(include_str!("../queries/insert_membership.sql"))
            .bind(shelf_id)
            .bind(book)
            .bind(ts)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Flip the soft-delete flag of an existing membership row.
    pub async fn set_membership_deleted(&self, shelf_id: i64, book: NativeBookId, deleted: bool, ts: i64) -> Result<()> {
        sqlx::query(include_str!("../queries/update_membership.sql"))
            .bind(encode_flag(deleted))
            .bind(ts)
            .bind(shelf_id)
            .bind(book)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Reading state
    // =========================================================================

    /// Reading state of a book for a profile; `None` when the device has
    /// never recorded anything for it.
    pub async fn settings(&self, book: NativeBookId, profile: ProfileId) -> Result<Option<Settings>> {
        let row: Option<SettingsRow> = sqlx::query_as(include_str!("../queries/get_settings.sql"))
            .bind(book)
            .bind(profile)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row.map(Settings::from))
    }

    pub async fn upsert_completed(&self, book: NativeBookId, profile: ProfileId, completed: bool, ts: i64) -> Result<()> {
        self.upsert(
            include_str!("../queries/update_completed.sql"),
            include_str!("../queries/insert_completed.sql"),
            book,
            profile,
            Value::Int(encode_flag(completed)),
            ts,
        )
        .await
    }

    pub async fn upsert_favorite(&self, book: NativeBookId, profile: ProfileId, favorite: bool, ts: i64) -> Result<()> {
        self.upsert(
            include_str!("../queries/update_favorite.sql"),
            include_str!("../queries/insert_favorite.sql"),
            book,
            profile,
            Value::Int(encode_flag(favorite)),
            ts,
        )
        .await
    }

    pub async fn upsert_position(&self, book: NativeBookId, profile: ProfileId, position: &str, ts: i64) -> Result<()> {
        self.upsert(
            include_str!("../queries/update_position.sql"),
            include_str!("../queries/insert_position.sql"),
            book,
            profile,
            Value::Text(position),
            ts,
        )
        .await
    }

    /// Field-level update of the `(book, profile)` settings row, inserting the
    /// row when the update touched nothing.
    async fn upsert(
        &self,
        update: &'static str,
        insert: &'static str,
        book: NativeBookId,
        profile: ProfileId,
        value: Value<'_>,
        ts: i64,
    ) -> Result<()> {
        let updated = value
            .bind(sqlx::query(update))
            .bind(ts)
            .bind(book)
            .bind(profile)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if updated.rows_affected() > 0 {
            return Ok(());
        }
        value
            .bind(sqlx::query(insert).bind(book).bind(profile))
            .bind(ts)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Annotations
    // =========================================================================

    /// Highlights and notes made in the built-in reader, in item order.
    pub async fn annotations(&self, book: NativeBookId) -> Result<Vec<NativeAnnotation>> {
        let rows: Vec<AnnotationTagRow> = sqlx::query_as(include_str!("../queries/list_annotation_tags.sql"))
            .bind(book)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(NativeAnnotation::collect(rows))
    }
}

/// A settings column value; flags are integers, positions are text.
#[derive(Clone, Copy)]
enum Value<'a> {
    Int(i64),
    Text(&'a str),
}
impl<'a> Value<'a> {
    fn bind<'q>(
        self,
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>
    where
        'a: 'q,
    {
        match self {
            Self::Int(v) => query.bind(v),
            Self::Text(v) => query.bind(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Explorer;

    async fn seed(explorer: &Explorer) {
        sqlx::raw_sql(
            r#"
                INSERT INTO folders (id, storageid, name) VALUES (1, 1, '/mnt/ext1/Books'), (2, 2, '/mnt/ext2/Library');
                INSERT INTO books_impl (id, title, author, firstauthor) VALUES (10, 'Moby Dick', '', ''), (11, 'Emma', 'Jane Austen', 'Jane Austen');
                INSERT INTO files (folder_id, book_id, filename, size) VALUES (1, 10, 'moby.epub', 1000), (2, 11, 'emma.epub', 2000);
                INSERT INTO profiles (id, name) VALUES (2, 'reader');
            "#,
        )
        .execute(explorer.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_storage_prefixes() {
        let explorer = Explorer::connect_in_memory().await.unwrap();
        let repo = explorer.repository();
        // Nothing indexed yet: conventional defaults.
        assert_eq!(repo.storage_prefixes().await.unwrap(), StoragePrefixes::default());
        sqlx::raw_sql("INSERT INTO folders (id, storageid, name) VALUES (1, 1, '/mnt/secure/Books'), (2, 2, '/mnt/card/x');")
            .execute(explorer.pool())
            .await
            .unwrap();
        let prefixes = repo.storage_prefixes().await.unwrap();
        assert_eq!(prefixes.main, "/mnt/secure");
        assert_eq!(prefixes.card, "/mnt/card");
    }

    #[tokio::test]
    async fn test_profile_id() {
        let explorer = Explorer::connect_in_memory().await.unwrap();
        seed(&explorer).await;
        let repo = explorer.repository();
        assert_eq!(repo.profile_id(None).await.unwrap(), DEFAULT_PROFILE_ID);
        assert_eq!(repo.profile_id(Some("reader")).await.unwrap(), 2);
        assert_eq!(repo.profile_id(Some("nobody")).await.unwrap(), DEFAULT_PROFILE_ID);
        sqlx::raw_sql("DROP TABLE profiles;").execute(explorer.pool()).await.unwrap();
        assert_eq!(repo.profile_id(Some("reader")).await.unwrap(), DEFAULT_PROFILE_ID);
    }

    #[tokio::test]
    async fn test_find_book() {
        let explorer = Explorer::connect_in_memory().await.unwrap();
        seed(&explorer).await;
        let repo = explorer.repository();
        assert_eq!(repo.find_book("/mnt/ext1/Books", "moby.epub").await.unwrap(), Some(10));
        assert_eq!(repo.find_book("/mnt/ext2/Library", "emma.epub").await.unwrap(), Some(11));
        assert_eq!(repo.find_book("/mnt/ext1/Books", "emma.epub").await.unwrap(), None);
        assert_eq!(repo.find_book("/mnt/ext1/Nope", "moby.epub").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_authors() {
        let explorer = Explorer::connect_in_memory().await.unwrap();
        seed(&explorer).await;
        let repo = explorer.repository();
        assert_eq!(repo.book_author(10).await.unwrap().as_deref(), Some(""));
        assert_eq!(repo.book_author(99).await.unwrap(), None);
        repo.set_authors(10, &["Herman Melville".to_string(), "Editor".to_string()]).await.unwrap();
        assert_eq!(repo.book_author(10).await.unwrap().as_deref(), Some("Herman Melville, Editor"));
        assert!(repo.set_authors(10, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_shelves_and_soft_delete() {
        let explorer = Explorer::connect_in_memory().await.unwrap();
        seed(&explorer).await;
        let repo = explorer.repository();
        let shelf = repo.create_shelf("Classics", 100).await.unwrap();
        repo.add_membership(shelf, 10, 100).await.unwrap();
        let memberships = repo.memberships(10).await.unwrap();
        assert_eq!(memberships.len(), 1);
        assert!(memberships[0].is_active());
        assert_eq!(memberships[0].name, "Classics");

        repo.set_membership_deleted(shelf, 10, true, 200).await.unwrap();
        let memberships = repo.memberships(10).await.unwrap();
        // The row survives, flagged.
        assert_eq!(memberships.len(), 1);
        assert!(memberships[0].is_deleted);
        assert_eq!(memberships[0].ts, Some(200));

        assert_eq!(repo.shelf_by_name("Classics").await.unwrap().map(|s| s.id), Some(shelf));
        assert!(repo.shelf_by_name("classics").await.unwrap().is_none());
        assert_eq!(repo.shelves().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revive_shelf() {
        let explorer = Explorer::connect_in_memory().await.unwrap();
        let repo = explorer.repository();
        sqlx::raw_sql("INSERT INTO bookshelfs (id, name, is_deleted, ts) VALUES (5, 'Old', 1, 10);")
            .execute(explorer.pool())
            .await
            .unwrap();
        assert!(repo.shelf_by_name("Old").await.unwrap().unwrap().is_deleted);
        repo.revive_shelf(5, 20).await.unwrap();
        let shelf = repo.shelf_by_name("Old").await.unwrap().unwrap();
        assert!(!shelf.is_deleted);
        assert_eq!(shelf.ts, Some(20));
    }

    #[tokio::test]
    async fn test_membership_of_deleted_shelf_is_inactive() {
        let explorer = Explorer::connect_in_memory().await.unwrap();
        seed(&explorer).await;
        let repo = explorer.repository();
        sqlx::raw_sql(
            "INSERT INTO bookshelfs (id, name, is_deleted, ts) VALUES (5, 'Old', 1, 10);
             INSERT INTO bookshelfs_books (bookshelfid, bookid, ts, is_deleted) VALUES (5, 10, 10, 0);",
        )
        .execute(explorer.pool())
        .await
        .unwrap();
        let memberships = repo.memberships(10).await.unwrap();
        assert_eq!(memberships.len(), 1);
        assert!(!memberships[0].is_deleted);
        assert!(memberships[0].shelf_deleted);
        assert!(!memberships[0].is_active());
    }

    #[tokio::test]
    async fn test_settings_upserts() {
        let explorer = Explorer::connect_in_memory().await.unwrap();
        seed(&explorer).await;
        let repo = explorer.repository();
        assert!(repo.settings(10, 1).await.unwrap().is_none());

        repo.upsert_completed(10, 1, true, 100).await.unwrap();
        let settings = repo.settings(10, 1).await.unwrap().unwrap();
        assert_eq!(settings.completed, Some(true));
        assert_eq!(settings.completed_ts, Some(100));
        assert_eq!(settings.favorite, None);

        repo.upsert_favorite(10, 1, true, 150).await.unwrap();
        repo.upsert_position(10, 1, "pbr:/page?page=12", 175).await.unwrap();
        let settings = repo.settings(10, 1).await.unwrap().unwrap();
        assert_eq!(settings.completed, Some(true));
        assert_eq!(settings.favorite, Some(true));
        assert_eq!(settings.position.as_deref(), Some("pbr:/page?page=12"));
        assert_eq!(settings.position_ts, Some(175));

        // Still a single row, and other profiles are untouched.
        let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM books_settings").fetch_one(explorer.pool()).await.unwrap();
        assert_eq!(rows.0, 1);
        assert!(repo.settings(10, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_annotations() {
        let explorer = Explorer::connect_in_memory().await.unwrap();
        seed(&explorer).await;
        sqlx::raw_sql(
            r#"
                INSERT INTO items (id, parentid, typeid, state, is_deleted, time_alt) VALUES
                    (1, 10, 4, 0, 0, 1700000000),
                    (2, 10, 4, 0, 1, 1700000100),
                    (3, 11, 4, 0, 0, 1700000200);
                INSERT INTO tags (itemid, tagid, val) VALUES
                    (1, 101, '{"text": "Call me Ishmael.", "begin": "pbr:/word?page=1&offs=0"}'),
                    (1, 105, 'highlight'),
                    (2, 101, '{"text": "deleted", "begin": "pbr:/word?page=2&offs=0"}'),
                    (3, 101, '{"text": "other book", "begin": "pbr:/word?page=3&offs=0"}');
            "#,
        )
        .execute(explorer.pool())
        .await
        .unwrap();
        let annotations = explorer.repository().annotations(10).await.unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].text.as_deref(), Some("Call me Ishmael."));
        assert_eq!(annotations[0].timestamp, Some(1_700_000_000));
    }
}
