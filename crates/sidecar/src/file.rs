//! Scoped file access. Nothing is held open between calls.

use crate::error::{ErrorKind, Result};
use crate::table::{self, Table};
use std::path::Path;
use time::OffsetDateTime;
use tokio::fs;
use tracing::instrument;

/// Read and decode a table file.
///
/// A missing file and a file that does not decode are both `Ok(None)`: there
/// is no existing data to honor. Other I/O failures are errors.
#[instrument(level = "trace", skip_all, fields(path = %path.display()))]
pub async fn read_table(path: &Path) -> Result<Option<Table>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => exn::bail!(ErrorKind::from_io(e, path)),
    };
    let Ok(text) = String::from_utf8(bytes) else {
        tracing::warn!(path = %path.display(), "Ignoring sidecar that is not UTF-8");
        return Ok(None);
    };
    match table::parse(&text) {
        Ok(table) => Ok(Some(table)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed sidecar");
            Ok(None)
        },
    }
}

/// Encode and write a table file, creating parent directories as needed.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn write_table(path: &Path, table: &Table) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, parent))?;
    }
    Ok(fs::write(path, table::encode(table)).await.map_err(|e| ErrorKind::from_io(e, path))?)
}

/// Last-modified time of a file as epoch seconds, if it can be read.
pub async fn modified(path: &Path) -> Option<i64> {
    let metadata = fs::metadata(path).await.ok()?;
    let modified: OffsetDateTime = metadata.modified().ok()?.into();
    Some(modified.unix_timestamp())
}
