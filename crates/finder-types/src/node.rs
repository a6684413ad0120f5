//! File nodes: the per-response description of one file or directory.

use serde::{Deserialize, Serialize};

/// Mime type used for directories.
pub const DIRECTORY_MIME: &str = "directory";

/// One file or directory as seen by the client.
///
/// Nodes are built per response and never cached by the connector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Opaque path token.
    pub hash: String,
    /// Display name.
    pub name: String,
    /// Parent hash. Absent for volume roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phash: Option<String>,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Modification time, unix seconds.
    pub ts: i64,
    pub mime: String,
    pub read: bool,
    pub write: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    /// Link target path, relative to the volume root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Link target hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thash: Option<String>,
    /// Directory has sub-directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirs: Option<bool>,
    /// Volume id, set on volume roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumeid: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub isroot: bool,
    /// Image dimensions as `WxH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<String>,
}

impl FileNode {
    /// A readable, writable node with the given identity.
    pub fn new(hash: impl Into<String>, name: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            name: name.into(),
            phash: None,
            size: 0,
            ts: crate::now_secs(),
            mime: mime.into(),
            read: true,
            write: true,
            locked: false,
            hidden: false,
            alias: None,
            thash: None,
            dirs: None,
            volumeid: None,
            isroot: false,
            dim: None,
        }
    }

    /// A directory node.
    pub fn directory(hash: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(hash, name, DIRECTORY_MIME)
    }

    pub fn with_parent(mut self, phash: impl Into<String>) -> Self {
        self.phash = Some(phash.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn is_dir(&self) -> bool {
        self.mime == DIRECTORY_MIME
    }

    pub fn is_root(&self) -> bool {
        self.isroot
    }
}
