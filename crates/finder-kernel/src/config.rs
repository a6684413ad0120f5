//! Connector configuration.
//!
//! Configuration is a RON document:
//!
//! ```ron
//! (
//!     debug: true,
//!     upload_max_size: 1048576,
//!     roots: [
//!         (driver: "Memory", alias: "Home", seed: ["docs/", "docs/readme.txt"]),
//!         (driver: "LocalFileSystem", path: "/srv/files"),
//!     ],
//! )
//! ```
//!
//! Every field has a default, so `()` is a valid (volume-less) config.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Default permissions applied to every node of a root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
        }
    }
}

/// One root (volume) to mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    /// Driver name, looked up in the registry's driver set.
    pub driver: String,
    /// Backend location of the root.
    pub path: String,
    /// Directory opened on `init` when the client names none.
    pub start_path: String,
    /// Base URL for direct file access.
    pub url: String,
    /// Display name of the root.
    pub alias: String,
    /// Thumbnail directory, relative to the root.
    pub tmb_path: String,
    pub copy_overwrite: bool,
    pub upload_overwrite: bool,
    /// Per-root upload limit in bytes, 0 = use the connector limit.
    pub upload_max_size: u64,
    pub defaults: Permissions,
    /// Command names disabled on this root.
    pub disabled: Vec<String>,
    /// Archive mime types this root can create/extract.
    pub archive_mimes: Vec<String>,
    /// Names treated as hidden.
    pub hidden: Vec<String>,
    /// Initial nodes for in-memory roots. A trailing `/` marks a directory.
    pub seed: Vec<String>,
    /// Driver-specific options.
    pub options: BTreeMap<String, String>,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            driver: "LocalFileSystem".to_string(),
            path: String::new(),
            start_path: String::new(),
            url: String::new(),
            alias: String::new(),
            tmb_path: ".tmb".to_string(),
            copy_overwrite: true,
            upload_overwrite: true,
            upload_max_size: 0,
            defaults: Permissions::default(),
            disabled: Vec::new(),
            archive_mimes: Vec::new(),
            hidden: Vec::new(),
            seed: Vec::new(),
            options: BTreeMap::new(),
        }
    }
}

impl RootConfig {
    /// A root using the given driver, everything else defaulted.
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            ..Self::default()
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_seed<I, S>(mut self, seed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed = seed.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_start_path(mut self, start_path: impl Into<String>) -> Self {
        self.start_path = start_path.into();
        self
    }

    pub fn with_permissions(mut self, read: bool, write: bool) -> Self {
        self.defaults = Permissions { read, write };
        self
    }
}

/// Connector-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Allow `debug` blocks in responses.
    pub debug: bool,
    pub locale: String,
    /// Upload limit in bytes, 0 = unlimited.
    pub upload_max_size: u64,
    /// Roots, mounted in order.
    pub roots: Vec<RootConfig>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            debug: false,
            locale: "en_US.UTF-8".to_string(),
            upload_max_size: 0,
            roots: Vec::new(),
        }
    }
}

impl ConnectorConfig {
    /// Parse a RON document.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Load a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    pub fn with_root(mut self, root: RootConfig) -> Self {
        self.roots.push(root);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config() {
        let config = ConnectorConfig::from_ron_str("()").unwrap();
        assert_eq!(config, ConnectorConfig::default());
        assert!(config.roots.is_empty());
    }

    #[test]
    fn test_roots_fill_defaults() {
        let config = ConnectorConfig::from_ron_str(
            r#"(
                debug: true,
                roots: [
                    (driver: "Memory", alias: "Home", seed: ["docs/", "docs/a.txt"]),
                    (driver: "FTP", options: {"host": "localhost"}),
                ],
            )"#,
        )
        .unwrap();

        assert!(config.debug);
        assert_eq!(config.roots.len(), 2);
        assert_eq!(config.roots[0].driver, "Memory");
        assert_eq!(config.roots[0].seed, vec!["docs/", "docs/a.txt"]);
        assert_eq!(config.roots[0].tmb_path, ".tmb");
        assert!(config.roots[0].defaults.read);
        assert_eq!(config.roots[1].options.get("host").map(String::as_str), Some("localhost"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"(roots: [(driver: "Test")])"#).unwrap();

        let config = ConnectorConfig::load(file.path()).unwrap();
        assert_eq!(config.roots, vec![RootConfig::new("Test")]);
    }

    #[test]
    fn test_parse_error() {
        let err = ConnectorConfig::from_ron_str("(roots: 5)").unwrap_err();
        assert!(matches!(err, ConfigError::Ron(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ConnectorConfig::load("/nonexistent/finder.ron").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
