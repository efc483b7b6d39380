//! Where the reader app keeps its files.

use std::path::{Path, PathBuf};

/// App directory, relative to the main storage root.
const APP_DIR: &str = "applications/koreader";

/// Whether the app is installed under this main storage root.
pub fn is_installed(main_root: &Path) -> bool {
    main_root.join(APP_DIR).is_dir()
}

/// The shared collection index.
pub fn collection_index(main_root: &Path) -> PathBuf {
    main_root.join(APP_DIR).join("settings").join("collection.lua")
}

/// Possible locations of a book's sidecar file, in lookup order.
///
/// The app stores sidecars next to the book (`<dir>/<stem>.sdr/metadata.<ext>.lua`)
/// or, when configured to, in a central `docsettings` tree that mirrors the
/// book's path on the device.
///
/// `host_book` is the book as mounted here; `device_book` is the same file as
/// the device sees it (`/mnt/ext1/...`).
pub fn sidecar_candidates(host_book: &Path, device_book: &str, main_root: &Path) -> Option<[PathBuf; 2]> {
    let name = sidecar_relative(Path::new(device_book))?;
    let beside = host_book.parent()?.join(&name);
    let device_dir = Path::new(device_book).parent()?.strip_prefix("/").ok()?;
    let central = main_root.join(APP_DIR).join("docsettings").join(device_dir).join(&name);
    Some([beside, central])
}

/// First candidate that exists; the same-folder location when neither does.
pub async fn locate_sidecar(host_book: &Path, device_book: &str, main_root: &Path) -> Option<PathBuf> {
    let [beside, central] = sidecar_candidates(host_book, device_book, main_root)?;
    for candidate in [&beside, &central] {
        if tokio::fs::try_exists(candidate).await.unwrap_or(false) {
            return Some(candidate.clone());
        }
    }
    Some(beside)
}

/// `<stem>.sdr/metadata.<ext>.lua`
fn sidecar_relative(book: &Path) -> Option<PathBuf> {
    let stem = book.file_stem()?.to_str()?;
    let ext = book.extension().and_then(|e| e.to_str()).unwrap_or_default();
    Some(PathBuf::from(format!("{stem}.sdr")).join(format!("metadata.{ext}.lua")))
}
