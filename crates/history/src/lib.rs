//! Bookmark history of the XML-based reader app (CoolReader).
//!
//! The app records every opened book in one shared document: a `file` entry
//! per book with a `file-info` block and a `bookmark-list`. The `lastpos`
//! bookmark is the current reading position; `comment` and `correction`
//! bookmarks are highlights.

mod dom;
pub mod error;
mod history;

pub use crate::dom::{Element, Node};
pub use crate::history::{Bookmark, FileKey, History, LASTPOS, ROOT};

use std::path::{Path, PathBuf};

/// App configuration directory, relative to the main storage root.
const CONFIG_DIR: &str = "system/config/cr3";

/// Whether the app is installed under this main storage root.
pub fn is_installed(main_root: &Path) -> bool {
    main_root.join(CONFIG_DIR).is_dir()
}

/// Location of the history document.
pub fn history_path(main_root: &Path) -> PathBuf {
    main_root.join(CONFIG_DIR).join("cr3hist.bmk")
}
