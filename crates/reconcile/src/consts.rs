use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

/// Multiplier between the coarse and fine parts of a location sort key.
pub const SORT_KEY_MULTIPLIER: i64 = 1_000_000;
/// Separator between a position token and its timestamp in the catalog.
pub const TIMESTAMP_SEPARATOR: &str = "_TIMESTAMP_";

// Built-in reader anchors: `pbr:/word?page=12&offs=340`.
regex!(NATIVE_ANCHOR_REGEX, r"[?&]page=(\d+)(?:&offs=(\d+))?");
// Character offset at the end of an xpointer: `/body/DocFragment[3]/body/p[5]/text().12`.
regex!(XPOINTER_OFFSET_REGEX, r"\.(\d+)$");
// Previously rendered annotation blocks in the catalog's annotations field.
selector!(ANNOTATION_SELECTOR, "div.annotation[data-id]");
