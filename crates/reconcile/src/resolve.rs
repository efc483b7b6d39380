//! From a catalog id to the book's records on the device.

use crate::catalog::BookId;
use crate::error::{ErrorKind, Result};
use crate::session::SessionContext;
use exn::ResultExt;
use shelfsync_explorer::NativeBookId;
use shelfsync_history::FileKey;
use std::path::PathBuf;
use tracing::instrument;

/// A catalog book that is on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBook {
    pub id: BookId,
    /// Path as the device sees it.
    pub device_path: String,
    /// Path on this host.
    pub host_path: PathBuf,
    pub size: Option<u64>,
    /// Book row in the device database, once the device has indexed the file.
    pub native: Option<NativeBookId>,
}
impl ResolvedBook {
    /// Directory and file name of the device path.
    pub fn split(&self) -> Option<(&str, &str)> {
        self.device_path.rsplit_once('/').filter(|(_, name)| !name.is_empty())
    }

    /// The app sidecar of this book: the first existing candidate, or where a
    /// new one belongs.
    pub async fn sidecar(&self, ctx: &SessionContext) -> Option<PathBuf> {
        shelfsync_sidecar::path::locate_sidecar(&self.host_path, &self.device_path, &ctx.main_root).await
    }

    /// The book's key in the bookmark history.
    pub fn history_key(&self) -> Option<FileKey> {
        FileKey::from_device_path(&self.device_path, self.size)
    }
}

/// Find a catalog book on the device. `None` when the device index does not
/// list it; such books take no further part in the run.
#[instrument(level = "trace", skip(ctx))]
pub async fn resolve(ctx: &SessionContext, id: BookId) -> Result<Option<ResolvedBook>> {
    let Some(entry) = ctx.index.get(id) else {
        return Ok(None);
    };
    let mut book = ResolvedBook {
        id,
        device_path: entry.device_path.clone(),
        host_path: entry.host_path.clone(),
        size: entry.size,
        native: None,
    };
    if let Some((folder, filename)) = book.split() {
        book.native = ctx.repo.find_book(folder, filename).await.or_raise(|| ErrorKind::Explorer)?;
    }
    if book.native.is_none() {
        tracing::debug!(book = id, path = %book.device_path, "Book is not in the device database yet");
    }
    Ok(Some(book))
}
