//! The device-wide book index written by the catalog when it sends books.
//!
//! Each storage root carries a `metadata.calibre` JSON array describing the
//! books on that storage, keyed by catalog id. Paths (`lpath`) are relative
//! to the storage root.

use crate::catalog::BookId;
use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use serde::Deserialize;
use shelfsync_explorer::StoragePrefixes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::instrument;

pub const INDEX_FILE: &str = "metadata.calibre";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Main,
    Card,
}

#[derive(Deserialize)]
struct IndexEntry {
    application_id: Option<BookId>,
    lpath: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    authors: Vec<String>,
}

/// A book that exists on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBook {
    pub id: BookId,
    pub storage: Storage,
    /// Path relative to the storage root.
    pub lpath: String,
    /// Full path as the device sees it (`/mnt/ext1/Books/moby.epub`).
    pub device_path: String,
    /// The same file as mounted on this host.
    pub host_path: PathBuf,
    pub size: Option<u64>,
    pub authors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceIndex {
    books: HashMap<BookId, DeviceBook>,
}
impl DeviceIndex {
    /// Read the index of the main storage and, when a card is mounted, of the
    /// card. A book listed on both is taken from the main storage.
    ///
    /// The main index must be readable: without it the device is either not
    /// mounted or still indexing. A card without an index file holds no books.
    #[instrument(level = "debug", skip(prefixes))]
    pub async fn load(main_root: &Path, card_root: Option<&Path>, prefixes: &StoragePrefixes) -> Result<Self> {
        let mut index = Self::default();
        let main = read_entries(&main_root.join(INDEX_FILE))
            .await?
            .ok_or_raise(|| ErrorKind::DeviceUnavailable(format!("no {INDEX_FILE} under {}", main_root.display())))?;
        index.extend(main, Storage::Main, main_root, &prefixes.main);
        if let Some(card_root) = card_root
            && let Some(card) = read_entries(&card_root.join(INDEX_FILE)).await?
        {
            index.extend(card, Storage::Card, card_root, &prefixes.card);
        }
        tracing::debug!(books = index.books.len(), "Loaded device index");
        Ok(index)
    }

    fn extend(&mut self, entries: Vec<IndexEntry>, storage: Storage, root: &Path, prefix: &str) {
        for entry in entries {
            let Some(id) = entry.application_id else {
                continue;
            };
            let lpath = entry.lpath.trim_start_matches('/').to_string();
            self.books.entry(id).or_insert_with(|| DeviceBook {
                id,
                storage,
                device_path: format!("{}/{lpath}", prefix.trim_end_matches('/')),
                host_path: root.join(&lpath),
                lpath,
                size: entry.size,
                authors: entry.authors,
            });
        }
    }

    pub fn get(&self, id: BookId) -> Option<&DeviceBook> {
        self.books.get(&id)
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceBook> {
        self.books.values()
    }
}

/// `Ok(None)` when the file does not exist; unreadable content is an error.
async fn read_entries(path: &Path) -> Result<Option<Vec<IndexEntry>>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => exn::bail!(ErrorKind::DeviceUnavailable(format!("cannot read {}: {e}", path.display()))),
    };
    match serde_json::from_slice(&bytes) {
        Ok(entries) => Ok(Some(entries)),
        Err(e) => exn::bail!(ErrorKind::DeviceUnavailable(format!("cannot parse {}: {e}", path.display()))),
    }
}
