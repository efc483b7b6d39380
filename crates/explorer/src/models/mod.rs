mod annotation;
mod settings;
mod shelf;

pub(crate) use self::annotation::AnnotationTagRow;
pub use self::annotation::NativeAnnotation;
pub(crate) use self::settings::{SettingsRow, encode_flag};
pub use self::settings::Settings;
pub(crate) use self::shelf::{MembershipRow, ShelfRow};
pub use self::shelf::{Membership, Shelf};

/// Path prefixes under which the device sees each of its storages, such as
/// `/mnt/ext1` for internal storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePrefixes {
    pub main: String,
    pub card: String,
}
impl Default for StoragePrefixes {
    fn default() -> Self {
        Self { main: "/mnt/ext1".to_string(), card: "/mnt/ext2".to_string() }
    }
}
impl StoragePrefixes {
    /// Reduce a folder name such as `/mnt/ext1/Books/Fiction` to its storage
    /// prefix (`/mnt/ext1`): the first two path components.
    pub(crate) fn prefix_of(folder: &str) -> Option<String> {
        let mut components = folder.split('/').filter(|c| !c.is_empty());
        let first = components.next()?;
        let second = components.next()?;
        Some(format!("/{first}/{second}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/mnt/ext1/Books", Some("/mnt/ext1"))]
    #[case("/mnt/ext2", Some("/mnt/ext2"))]
    #[case("/mnt/ext1/Books/Fiction/Deep", Some("/mnt/ext1"))]
    #[case("/mnt", None)]
    #[case("", None)]
    fn test_prefix_of(#[case] folder: &str, #[case] expected: Option<&str>) {
        assert_eq!(StoragePrefixes::prefix_of(folder).as_deref(), expected);
    }
}
