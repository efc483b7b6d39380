use crate::dom::{self, Element};
use crate::error::{ErrorKind, Result};
use std::path::Path;
use tokio::fs;
use tracing::instrument;

/// Root element of the history document.
pub const ROOT: &str = "FictionBookMarks";
/// Bookmark type holding the current reading position.
pub const LASTPOS: &str = "lastpos";

/// A book as the history identifies it: the file name plus the directory it
/// lives in on the device (with a trailing slash).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileKey {
    pub filename: String,
    pub filepath: String,
    pub size: Option<u64>,
}
impl FileKey {
    /// Split a device path such as `/mnt/ext1/Books/moby.epub`.
    pub fn from_device_path(path: &str, size: Option<u64>) -> Option<Self> {
        let (dir, filename) = path.rsplit_once('/')?;
        if filename.is_empty() {
            return None;
        }
        Some(Self { filename: filename.to_string(), filepath: format!("{dir}/"), size })
    }

    fn matches(&self, file: &Element) -> bool {
        let Some(info) = file.child("file-info") else {
            return false;
        };
        let dir = info.child_text("doc-filepath").unwrap_or_default();
        info.child_text("doc-filename").as_deref() == Some(self.filename.as_str())
            && dir.trim_end_matches('/') == self.filepath.trim_end_matches('/')
    }

    fn file_info(&self) -> Element {
        let mut info = Element::new("file-info");
        info.push(Element::with_text("doc-filename", self.filename.as_str()));
        info.push(Element::with_text("doc-filepath", self.filepath.as_str()));
        if let Some(size) = self.size {
            info.push(Element::with_text("doc-filesize", size.to_string()));
        }
        info
    }
}

/// A bookmark of any type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bookmark {
    /// `lastpos`, `position`, `comment`, `correction`...
    pub kind: String,
    /// Progress through the book, as written by the app (`"12.34%"`).
    pub percent: Option<String>,
    pub timestamp: Option<i64>,
    pub start_point: Option<String>,
    pub end_point: Option<String>,
    pub header_text: Option<String>,
    pub selection_text: Option<String>,
    pub comment_text: Option<String>,
}
impl Bookmark {
    fn from_element(element: &Element) -> Self {
        Self {
            kind: element.attr("type").unwrap_or_default().to_string(),
            percent: element.attr("percent").map(str::to_string),
            timestamp: element.attr("timestamp").and_then(|t| t.trim().parse().ok()),
            start_point: element.child_text("start-point"),
            end_point: element.child_text("end-point"),
            header_text: element.child_text("header-text"),
            selection_text: element.child_text("selection-text"),
            comment_text: element.child_text("comment-text"),
        }
    }

    /// The position as a fraction of 10000 (`"12.34%"` is `1234`).
    pub fn percent_hundredths(&self) -> Option<i64> {
        let percent = self.percent.as_deref()?.trim().trim_end_matches('%');
        let (whole, fraction) = percent.split_once('.').unwrap_or((percent, ""));
        let fraction = format!("{fraction:0<2}");
        let whole: i64 = whole.parse().ok()?;
        let fraction: i64 = fraction.get(..2)?.parse().ok()?;
        Some(whole * 100 + fraction)
    }
}

/// The bookmark history document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    root: Element,
}
impl Default for History {
    fn default() -> Self {
        Self { root: Element::new(ROOT) }
    }
}
impl History {
    pub fn parse(content: &str) -> Result<Self> {
        let root = dom::parse(content)?;
        if root.name != ROOT {
            exn::bail!(ErrorKind::Malformed(format!("unexpected root element `{}`", root.name)));
        }
        Ok(Self { root })
    }

    pub fn to_xml(&self) -> Result<String> {
        dom::write(&self.root)
    }

    /// Load the history. A missing file is an empty document; nothing is
    /// written until [`History::save`].
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        match fs::read(path).await {
            Ok(bytes) => {
                let content = String::from_utf8(bytes).map_err(|e| ErrorKind::Malformed(e.to_string()))?;
                Self::parse(&content)
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => exn::bail!(ErrorKind::from_io(e, path)),
        }
    }

    /// Write the document, creating the file and its directories as needed.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| ErrorKind::from_io(e, parent))?;
        }
        let xml = self.to_xml()?;
        Ok(fs::write(path, xml).await.map_err(|e| ErrorKind::from_io(e, path))?)
    }

    fn file(&self, key: &FileKey) -> Option<&Element> {
        self.root.elements().filter(|e| e.name == "file").find(|e| key.matches(e))
    }

    fn file_mut(&mut self, key: &FileKey) -> Option<&mut Element> {
        self.root.elements_mut().filter(|e| e.name == "file").find(|e| key.matches(e))
    }

    pub fn contains(&self, key: &FileKey) -> bool {
        self.file(key).is_some()
    }

    /// Every bookmark of the book, in document order.
    pub fn bookmarks(&self, key: &FileKey) -> Vec<Bookmark> {
        let Some(list) = self.file(key).and_then(|f| f.child("bookmark-list")) else {
            return Vec::new();
        };
        list.elements().filter(|e| e.name == "bookmark").map(Bookmark::from_element).collect()
    }

    pub fn last_position(&self, key: &FileKey) -> Option<Bookmark> {
        self.bookmarks(key).into_iter().find(|b| b.kind == LASTPOS)
    }

    /// Set the reading position of a book, adding the book when the history
    /// does not know it yet. Returns whether the document changed.
    pub fn set_last_position(&mut self, key: &FileKey, start_point: &str, timestamp: i64) -> bool {
        if let Some(current) = self.last_position(key)
            && current.start_point.as_deref() == Some(start_point)
            && current.timestamp == Some(timestamp)
        {
            return false;
        }
        if self.file(key).is_none() {
            let mut file = Element::new("file");
            file.push(key.file_info());
            file.push(Element::new("bookmark-list"));
            self.root.push(file);
        }
        let Some(file) = self.file_mut(key) else {
            return false;
        };
        let list = file.ensure_child("bookmark-list");
        let is_lastpos = |e: &Element| e.name == "bookmark" && e.attr("type") == Some(LASTPOS);
        if !list.elements().any(is_lastpos) {
            let mut bookmark = Element::new("bookmark");
            bookmark.set_attr("type", LASTPOS);
            bookmark.set_attr("percent", "0.00%");
            bookmark.set_attr("shortcut", "0");
            list.push(bookmark);
        }
        let Some(bookmark) = list.elements_mut().find(|e| is_lastpos(e)) else {
            return false;
        };
        bookmark.set_attr("timestamp", timestamp.to_string());
        bookmark.ensure_child("start-point").set_text(start_point);
        true
    }
}
