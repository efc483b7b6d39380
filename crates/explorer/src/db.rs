//! Database connection and pool management.

use crate::error::{ErrorKind, Result};
use crate::repo::Repository;
use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

/// Explorer database versions to look for, newest first.
const EXPLORER_VERSIONS: [u8; 2] = [3, 2];
/// The device is single-user storage; one connection keeps writes ordered.
const MAX_CONNECTIONS: u32 = 1;

/// Connection pool to the device's explorer database.
#[derive(Debug, Clone)]
pub struct Explorer {
    pool: SqlitePool,
}

impl Explorer {
    async fn new(options: SqliteConnectOptions) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(Self { pool })
    }

    /// Locate the explorer database under the device's main storage root.
    ///
    /// Returns the first of `system/explorer-3/explorer-3.db` and
    /// `system/explorer-2/explorer-2.db` that exists.
    pub fn discover(main_root: impl AsRef<Path>) -> Option<PathBuf> {
        EXPLORER_VERSIONS
            .iter()
            .map(|version| {
                let name = format!("explorer-{version}");
                main_root.as_ref().join("system").join(&name).join(format!("{name}.db"))
            })
            .find(|path| path.is_file())
    }

    /// Open an existing explorer database.
    ///
    /// The file is never created: a missing database raises
    /// [`ErrorKind::Missing`].
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            exn::bail!(ErrorKind::Missing(path.to_path_buf()));
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            // The device may still be flushing its own writes right after mounting.
            .busy_timeout(Duration::from_millis(1500));
        Self::new(options).await
    }

    /// Connect to an in-memory database that carries the representative
    /// device schema (see `fixtures/schema.sql`).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Do NOT apply `#[cfg(test)]` so that other crates can also use this in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:");
        let explorer = Self::new(options).await?;
        sqlx::raw_sql(include_str!("../fixtures/schema.sql"))
            .execute(&explorer.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(explorer)
    }

    /// Get a reference to the underlying connection pool.
    ///
    /// This is useful for running custom queries (seeding test fixtures).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Repository over this connection.
    pub fn repository(&self) -> Repository {
        Repository::new(self.pool.clone())
    }

    /// Close the database connection pool, waiting for connections to be
    /// returned first.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let explorer = Explorer::connect_in_memory().await.unwrap();
        assert!(!explorer.pool().is_closed());
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM storages").fetch_one(explorer.pool()).await.unwrap();
        assert_eq!(row.0, 2);
        explorer.close().await;
    }

    #[tokio::test]
    async fn test_open_missing_database() {
        let err = Explorer::open("/definitely/not/here/explorer-3.db").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Missing(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_discover_prefers_newest() {
        let root = tempfile::tempdir().unwrap();
        assert!(Explorer::discover(root.path()).is_none());
        for version in [2, 3] {
            let dir = root.path().join("system").join(format!("explorer-{version}"));
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(format!("explorer-{version}.db")), b"").unwrap();
        }
        let found = Explorer::discover(root.path()).unwrap();
        assert!(found.ends_with("system/explorer-3/explorer-3.db"));
    }
}
