//! Layered configuration for shelfsync.
//!
//! Values are resolved in order, later layers overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A configuration file (TOML, YAML or JSON, chosen by extension). When no
//!    path is given, `config.toml` in the platform configuration directory is
//!    used if it exists.
//! 3. Environment variables prefixed with `SHELFSYNC_`, using `__` to reach
//!    nested keys (`SHELFSYNC_DEVICE__MAIN_ROOT=/media/reader`).
//!
//! Columns name fields in the catalog. A column left unset disables every
//! feature that depends on it; whether a configured column actually exists
//! (with the right kind) is only known once the catalog is opened.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::instrument;

const ENV_PREFIX: &str = "SHELFSYNC_";
const DEFAULT_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub columns: Columns,
    pub native: NativeConfig,
    pub koreader: KoReaderConfig,
    pub coolreader: CoolReaderConfig,
}

/// Where the device is mounted on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Mount point of the internal storage.
    pub main_root: PathBuf,
    /// Mount point of the memory card, if one is inserted.
    pub card_root: Option<PathBuf>,
    /// Name of the device profile to sync against. The first profile is used
    /// when unset.
    pub profile: Option<String>,
}
impl Default for DeviceConfig {
    fn default() -> Self {
        Self { main_root: PathBuf::from("/media/reader"), card_root: None, profile: None }
    }
}

/// Catalog column names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Columns {
    pub collections: Option<String>,
    pub read: Option<String>,
    pub favorite: Option<String>,
    pub rating: Option<String>,
    pub review: Option<String>,
    pub position: Option<String>,
    pub annotations: Option<String>,
}

/// Toggles for the device's built-in reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    pub positions: bool,
    pub annotations: bool,
}
impl Default for NativeConfig {
    fn default() -> Self {
        Self { positions: true, annotations: true }
    }
}

/// Toggles for the sidecar-based reader app. Everything is off by default:
/// only enable these when the app is installed on the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KoReaderConfig {
    pub positions: bool,
    pub annotations: bool,
    pub collections: bool,
    pub status: bool,
    pub favorites: bool,
    /// Load collections from the app's collection file instead of the
    /// device database.
    pub prefer_collections: bool,
    /// Load favorites from the app's collection file instead of the device
    /// database.
    pub prefer_favorites: bool,
}

/// Toggles for the bookmark-history based reader app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoolReaderConfig {
    pub positions: bool,
    pub annotations: bool,
}

impl Config {
    /// Load configuration from all layers.
    ///
    /// An explicitly given `path` must exist; the default location is
    /// silently skipped when missing.
    #[instrument(level = "debug")]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::Invalid("configuration file does not exist"));
                }
                figment = Self::merge_file(figment, path);
            },
            None => {
                if let Some(default) = Self::default_path()
                    && default.is_file()
                {
                    tracing::debug!(path = %default.display(), "Using default configuration file");
                    figment = Self::merge_file(figment, &default);
                }
            },
        }
        let config: Config = figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Platform-specific default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "shelfsync").map(|dirs| dirs.config_dir().join(DEFAULT_FILE_NAME))
    }

    fn merge_file(figment: Figment, path: &Path) -> Figment {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => figment.merge(Toml::file(path)),
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.device.main_root.is_absolute() {
            exn::bail!(ErrorKind::Invalid("device.main_root must be an absolute path"));
        }
        if let Some(card) = &self.device.card_root
            && !card.is_absolute()
        {
            exn::bail!(ErrorKind::Invalid("device.card_root must be an absolute path"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.native.positions);
        assert!(config.native.annotations);
        assert!(!config.koreader.positions);
        assert!(!config.coolreader.annotations);
        assert!(config.columns.read.is_none());
    }

    #[rstest]
    #[case(
        "config.toml",
        "[device]\nmain_root = \"/mnt/reader\"\n[columns]\nread = \"#read\"\n[koreader]\npositions = true\n"
    )]
    #[case(
        "config.yaml",
        "device:\n  main_root: /mnt/reader\ncolumns:\n  read: \"#read\"\nkoreader:\n  positions: true\n"
    )]
    #[case(
        "config.json",
        r##"{"device": {"main_root": "/mnt/reader"}, "columns": {"read": "#read"}, "koreader": {"positions": true}}"##
    )]
    fn test_load_file_formats(#[case] name: &str, #[case] contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.device.main_root, PathBuf::from("/mnt/reader"));
        assert_eq!(config.columns.read.as_deref(), Some("#read"));
        assert!(config.koreader.positions);
        // Untouched values keep their defaults.
        assert!(config.native.positions);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_relative_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[device]\nmain_root = \"relative/reader\"\n").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }
}
