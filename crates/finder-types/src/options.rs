//! Per-volume client options (`options` in the `open` response).

use serde::{Deserialize, Serialize};

/// Archive mime types a volume can create and extract.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archivers {
    pub create: Vec<String>,
    pub extract: Vec<String>,
}

/// Client-facing options of the volume owning the current directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeOptions {
    /// Display path of the current directory (alias-prefixed, never the
    /// backend's real location).
    pub path: String,
    /// Base URL for direct file access, empty when files are not served
    /// directly.
    pub url: String,
    pub tmb_url: String,
    /// Commands disabled on this volume.
    pub disabled: Vec<String>,
    pub separator: String,
    pub copy_overwrite: bool,
    pub upload_overwrite: bool,
    /// Upload limit in bytes, 0 = unlimited.
    pub upload_max_size: u64,
    pub archivers: Archivers,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            path: String::new(),
            url: String::new(),
            tmb_url: String::new(),
            disabled: Vec::new(),
            separator: "/".to_string(),
            copy_overwrite: true,
            upload_overwrite: true,
            upload_max_size: 0,
            archivers: Archivers::default(),
        }
    }
}
