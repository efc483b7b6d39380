//! Per-run state: device facts and the features the run may touch.

use crate::catalog::{BookId, Catalog, ColumnKind};
use crate::error::{ErrorKind, Result};
use crate::index::DeviceIndex;
use exn::ResultExt;
use shelfsync_config::Config;
use shelfsync_explorer::{Explorer, ProfileId, Repository, StoragePrefixes};
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::instrument;

/// What a run can synchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    Collections,
    Read,
    Favorite,
    Rating,
    Review,
    Position,
    Annotations,
}
impl Feature {
    /// Column kinds that can hold this feature's value.
    fn accepts(self, kind: ColumnKind) -> bool {
        match self {
            Self::Collections => kind == ColumnKind::Names,
            Self::Read | Self::Favorite => kind == ColumnKind::Bool,
            Self::Rating => kind == ColumnKind::Rating,
            Self::Review | Self::Position | Self::Annotations => {
                matches!(kind, ColumnKind::Comments | ColumnKind::Text)
            },
        }
    }
}

/// The reading apps on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Backend {
    /// The device's built-in reader and library.
    Native,
    KoReader,
    CoolReader,
}
impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Native, Backend::KoReader, Backend::CoolReader];

    /// Two-letter tag used in position fields and annotation ids.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Native => "pb",
            Self::KoReader => "kr",
            Self::CoolReader => "cr",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.tag() == tag)
    }
}
impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.tag())
    }
}

/// Which features are enabled for which backends, and the catalog column
/// each feature maps to. Fixed for the duration of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFlags {
    columns: HashMap<Feature, String>,
    enabled: BTreeSet<(Feature, Backend)>,
    /// Load collections from the app's collection index instead of the
    /// device database.
    pub prefer_app_collections: bool,
    /// Load the favorite flag from the app's favorites collection.
    pub prefer_app_favorites: bool,
}
impl SessionFlags {
    /// Work out the flags from the configuration, the catalog's columns and
    /// which apps are installed on the device.
    pub fn compute(config: &Config, catalog: &dyn Catalog, koreader: bool, coolreader: bool) -> Self {
        let mut flags = Self::default();
        let configured = [
            (Feature::Collections, &config.columns.collections),
            (Feature::Read, &config.columns.read),
            (Feature::Favorite, &config.columns.favorite),
            (Feature::Rating, &config.columns.rating),
            (Feature::Review, &config.columns.review),
            (Feature::Position, &config.columns.position),
            (Feature::Annotations, &config.columns.annotations),
        ];
        for (feature, column) in configured {
            let Some(column) = column.as_deref().filter(|c| !c.is_empty()) else {
                continue;
            };
            match catalog.column_kind(column) {
                Some(kind) if feature.accepts(kind) => {
                    flags.columns.insert(feature, column.to_string());
                },
                Some(kind) => {
                    tracing::warn!(?feature, column, ?kind, "Column has the wrong kind, feature disabled");
                },
                None => tracing::warn!(?feature, column, "Column does not exist, feature disabled"),
            }
        }

        let native = [
            (Feature::Collections, true),
            (Feature::Read, true),
            (Feature::Favorite, true),
            (Feature::Position, config.native.positions),
            (Feature::Annotations, config.native.annotations),
        ];
        flags.enable(Backend::Native, native);
        if koreader {
            let kr = &config.koreader;
            flags.enable(
                Backend::KoReader,
                [
                    (Feature::Collections, kr.collections),
                    (Feature::Read, kr.status),
                    (Feature::Favorite, kr.favorites),
                    (Feature::Rating, true),
                    (Feature::Review, true),
                    (Feature::Position, kr.positions),
                    (Feature::Annotations, kr.annotations),
                ],
            );
            flags.prefer_app_collections = kr.prefer_collections && flags.is_enabled(Feature::Collections, Backend::KoReader);
            flags.prefer_app_favorites = kr.prefer_favorites && flags.is_enabled(Feature::Favorite, Backend::KoReader);
        }
        if coolreader {
            let cr = &config.coolreader;
            flags.enable(Backend::CoolReader, [(Feature::Position, cr.positions), (Feature::Annotations, cr.annotations)]);
        }
        tracing::debug!(enabled = ?flags.enabled, "Computed session flags");
        flags
    }

    fn enable(&mut self, backend: Backend, features: impl IntoIterator<Item = (Feature, bool)>) {
        for (feature, on) in features {
            if on && self.columns.contains_key(&feature) {
                self.enabled.insert((feature, backend));
            }
        }
    }

    /// Catalog column of a feature, when the feature is usable at all.
    pub fn column(&self, feature: Feature) -> Option<&str> {
        self.columns.get(&feature).map(String::as_str)
    }

    pub fn is_enabled(&self, feature: Feature, backend: Backend) -> bool {
        self.enabled.contains(&(feature, backend))
    }

    /// Backends a feature is enabled for, native first.
    pub fn backends(&self, feature: Feature) -> Vec<Backend> {
        Backend::ALL.into_iter().filter(|b| self.is_enabled(feature, *b)).collect()
    }
}

/// Everything a run needs to know about the device, gathered once.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub main_root: PathBuf,
    pub card_root: Option<PathBuf>,
    pub explorer: Explorer,
    pub repo: Repository,
    pub profile: ProfileId,
    pub prefixes: StoragePrefixes,
    pub index: DeviceIndex,
    pub flags: SessionFlags,
    /// Books the device lists without an author while the index knows them.
    pub authors_missing: Vec<BookId>,
    /// Timestamp stamped on device writes that have no better one.
    pub now: i64,
}
impl SessionContext {
    /// Connect to the device named by the configuration.
    ///
    /// Fails with [`ErrorKind::DeviceUnavailable`] when the device database
    /// or its book index cannot be read.
    #[instrument(level = "debug", skip_all, fields(main_root = %config.device.main_root.display()))]
    pub async fn open(config: &Config, catalog: &dyn Catalog) -> Result<Self> {
        let main_root = &config.device.main_root;
        let Some(path) = Explorer::discover(main_root) else {
            exn::bail!(ErrorKind::DeviceUnavailable(format!("no explorer database under {}", main_root.display())));
        };
        let explorer = Explorer::open(&path)
            .await
            .or_raise(|| ErrorKind::DeviceUnavailable(format!("cannot open {}", path.display())))?;
        Self::with_explorer(config, catalog, explorer).await
    }

    /// Build the context over an already-open explorer database.
    pub async fn with_explorer(config: &Config, catalog: &dyn Catalog, explorer: Explorer) -> Result<Self> {
        let main_root = config.device.main_root.clone();
        let card_root = config.device.card_root.clone();
        let repo = explorer.repository();
        let prefixes = repo.storage_prefixes().await.or_raise(|| ErrorKind::Explorer)?;
        let profile = repo.profile_id(config.device.profile.as_deref()).await.or_raise(|| ErrorKind::Explorer)?;
        let index = DeviceIndex::load(&main_root, card_root.as_deref(), &prefixes).await?;

        let koreader = shelfsync_sidecar::path::is_installed(&main_root);
        let coolreader = shelfsync_history::is_installed(&main_root);
        let flags = SessionFlags::compute(config, catalog, koreader, coolreader);

        let mut authors_missing = Vec::new();
        for book in index.iter().filter(|b| !b.authors.is_empty()) {
            let Some((folder, filename)) = book.device_path.rsplit_once('/') else {
                continue;
            };
            let Some(native) = repo.find_book(folder, filename).await.or_raise(|| ErrorKind::Explorer)? else {
                continue;
            };
            let author = repo.book_author(native).await.or_raise(|| ErrorKind::Explorer)?;
            if author.is_some_and(|a| a.trim().is_empty()) {
                authors_missing.push(book.id);
            }
        }
        authors_missing.sort_unstable();

        tracing::info!(
            books = index.len(),
            profile,
            koreader,
            coolreader,
            authors_missing = authors_missing.len(),
            "Connected to device"
        );
        Ok(Self {
            main_root,
            card_root,
            explorer,
            repo,
            profile,
            prefixes,
            index,
            flags,
            authors_missing,
            now: OffsetDateTime::now_utc().unix_timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldValue;
    use rstest::rstest;

    struct Columns(Vec<(&'static str, ColumnKind)>);
    impl Catalog for Columns {
        fn book_ids(&self) -> Vec<BookId> {
            Vec::new()
        }

        fn column_kind(&self, column: &str) -> Option<ColumnKind> {
            self.0.iter().find(|(c, _)| *c == column).map(|(_, k)| *k)
        }

        fn last_modified(&self, _: BookId) -> Option<i64> {
            None
        }

        fn field(&self, _: BookId, _: &str) -> Option<FieldValue> {
            None
        }

        fn set_field(&mut self, _: BookId, _: &str, _: Option<FieldValue>) -> Result<()> {
            Ok(())
        }
    }

    fn catalog() -> Columns {
        Columns(vec![
            ("#shelves", ColumnKind::Names),
            ("#read", ColumnKind::Bool),
            ("#fav", ColumnKind::Bool),
            ("rating", ColumnKind::Rating),
            ("#review", ColumnKind::Comments),
            ("#position", ColumnKind::Text),
            ("#notes", ColumnKind::Comments),
        ])
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.columns.collections = Some("#shelves".into());
        config.columns.read = Some("#read".into());
        config.columns.favorite = Some("#fav".into());
        config.columns.rating = Some("rating".into());
        config.columns.review = Some("#review".into());
        config.columns.position = Some("#position".into());
        config.columns.annotations = Some("#notes".into());
        config
    }

    #[test]
    fn test_native_only() {
        let flags = SessionFlags::compute(&config(), &catalog(), false, false);
        assert_eq!(flags.column(Feature::Read), Some("#read"));
        assert_eq!(flags.backends(Feature::Collections), [Backend::Native]);
        assert_eq!(flags.backends(Feature::Position), [Backend::Native]);
        // Ratings and reviews only live in the app sidecars.
        assert!(flags.backends(Feature::Rating).is_empty());
        assert!(flags.backends(Feature::Review).is_empty());
    }

    #[test]
    fn test_apps_installed() {
        let mut config = config();
        config.koreader.positions = true;
        config.koreader.favorites = true;
        config.koreader.prefer_favorites = true;
        config.koreader.prefer_collections = true;
        config.coolreader.annotations = true;
        let flags = SessionFlags::compute(&config, &catalog(), true, true);
        assert_eq!(flags.backends(Feature::Position), [Backend::Native, Backend::KoReader]);
        assert_eq!(flags.backends(Feature::Favorite), [Backend::Native, Backend::KoReader]);
        assert_eq!(flags.backends(Feature::Rating), [Backend::KoReader]);
        assert_eq!(
            flags.backends(Feature::Annotations),
            [Backend::Native, Backend::KoReader, Backend::CoolReader]
        );
        assert!(flags.prefer_app_favorites);
        // Collections are not synced with the app, so there is nothing to prefer.
        assert!(!flags.prefer_app_collections);
    }

    #[rstest]
    #[case::wrong_kind("#review", Feature::Read)]
    #[case::missing("#nope", Feature::Read)]
    fn test_unusable_column_disables_feature(#[case] column: &str, #[case] feature: Feature) {
        let mut config = config();
        config.columns.read = Some(column.into());
        let flags = SessionFlags::compute(&config, &catalog(), true, true);
        assert_eq!(flags.column(feature), None);
        assert!(flags.backends(feature).is_empty());
    }

    #[rstest]
    #[case(Backend::Native, "pb")]
    #[case(Backend::KoReader, "kr")]
    #[case(Backend::CoolReader, "cr")]
    fn test_tags(#[case] backend: Backend, #[case] tag: &str) {
        assert_eq!(backend.tag(), tag);
        assert_eq!(Backend::from_tag(tag), Some(backend));
    }
}
