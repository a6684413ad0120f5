//! Volume capability contract.
//!
//! Every backend implements [`Volume`] in full. Operations a backend cannot
//! perform keep the default implementation, which reports
//! [`VolumeError::Unsupported`], so the dispatcher never has to ask whether
//! a method exists.
//!
//! All node-addressing arguments are hashes minted by the volume itself.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use finder_types::{FileNode, VolumeOptions};

use super::types::{FileStream, ResizeRequest, UploadFile};
use super::{VolumeError, VolumeResult};
use crate::config::RootConfig;

/// A mounted backend instance owning one hash namespace.
#[async_trait]
pub trait Volume: Send + Sync {
    // ========================================================================
    // Identity
    // ========================================================================

    /// Volume id, which is also the hash namespace prefix (`m1_`).
    fn id(&self) -> &str;

    /// Name of the driver that mounted this volume.
    fn driver(&self) -> &str;

    /// Whether the root can be listed.
    fn is_readable(&self) -> bool;

    /// Hash of the volume root.
    fn root(&self) -> String;

    /// Hash of the directory to open when the client names none.
    fn default_path(&self) -> String {
        self.root()
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Directory node for `hash`.
    async fn dir(&self, hash: &str) -> VolumeResult<FileNode>;

    /// Children of a directory, after hidden and mime filtering.
    async fn scan_dir(&self, hash: &str) -> VolumeResult<Vec<FileNode>>;

    /// Every child of a directory, hidden ones included, ignoring the mime
    /// filter. Cross-volume copies walk the source with this.
    async fn list_dir(&self, hash: &str) -> VolumeResult<Vec<FileNode>>;

    /// The directory `hash` and every directory below it.
    async fn tree(&self, hash: &str) -> VolumeResult<Vec<FileNode>>;

    /// Ancestors of `hash` up to the root, with their sub-directories.
    async fn parents(&self, hash: &str) -> VolumeResult<Vec<FileNode>>;

    /// Node for `hash`, file or directory.
    async fn file(&self, hash: &str) -> VolumeResult<FileNode>;

    /// Open a file for reading.
    async fn open(&self, hash: &str) -> VolumeResult<FileStream>;

    /// Size in bytes; directories report the sum of their contents.
    async fn size(&self, hash: &str) -> VolumeResult<u64>;

    async fn get_contents(&self, hash: &str) -> VolumeResult<Vec<u8>>;

    /// Search names below the root.
    async fn search(&self, query: &str, mimes: &[String]) -> VolumeResult<Vec<FileNode>> {
        let _ = (query, mimes);
        Err(VolumeError::Unsupported("search"))
    }

    /// Image dimensions as `WxH`.
    async fn dimensions(&self, hash: &str) -> VolumeResult<String> {
        let _ = hash;
        Err(VolumeError::Unsupported("dimensions"))
    }

    /// Create (or locate) the thumbnail of an image and return its name.
    async fn tmb(&self, hash: &str) -> VolumeResult<String> {
        let _ = hash;
        Err(VolumeError::Unsupported("tmb"))
    }

    /// Backend-internal location of a node.
    fn realpath(&self, hash: &str) -> VolumeResult<String>;

    // ========================================================================
    // Writing
    // ========================================================================

    async fn mkdir(&self, parent: &str, name: &str) -> VolumeResult<FileNode>;

    async fn mkfile(&self, parent: &str, name: &str) -> VolumeResult<FileNode>;

    /// Remove a node (recursively for directories). Returns the removed node.
    async fn rm(&self, hash: &str) -> VolumeResult<FileNode>;

    /// Rename in place. Returns the node under its new hash.
    async fn rename(&self, hash: &str, name: &str) -> VolumeResult<FileNode>;

    async fn duplicate(&self, hash: &str, suffix: &str) -> VolumeResult<FileNode>;

    /// Copy (or move, with `cut`) `src_hash` from `src` into the directory
    /// `dst_hash` of this volume. `src` may be this volume or another one.
    async fn paste(
        &self,
        src: &dyn Volume,
        src_hash: &str,
        dst_hash: &str,
        cut: bool,
    ) -> VolumeResult<FileNode>;

    async fn upload(&self, file: &UploadFile, dst_hash: &str) -> VolumeResult<FileNode>;

    async fn put_contents(&self, hash: &str, content: &[u8]) -> VolumeResult<FileNode>;

    /// Pack `hashes` into a new archive of type `mime`.
    async fn archive(&self, hashes: &[String], mime: &str) -> VolumeResult<FileNode> {
        let _ = (hashes, mime);
        Err(VolumeError::Unsupported("archive"))
    }

    /// Unpack an archive next to it. Returns every created node.
    async fn extract(&self, hash: &str) -> VolumeResult<Vec<FileNode>> {
        let _ = hash;
        Err(VolumeError::Unsupported("extract"))
    }

    async fn resize(&self, hash: &str, request: &ResizeRequest) -> VolumeResult<FileNode> {
        let _ = (hash, request);
        Err(VolumeError::Unsupported("resize"))
    }

    // ========================================================================
    // Bookkeeping
    // ========================================================================

    /// Message of the last failed operation.
    fn last_error(&self) -> Option<String>;

    /// Nodes removed since the last reset, including nodes whose hash
    /// changed (renamed or moved subtrees).
    fn removed(&self) -> Vec<FileNode>;

    fn reset_removed(&self);

    /// Replace the mime filter. An empty list accepts everything.
    fn set_mimes_filter(&self, mimes: Vec<String>);

    fn mime_accepted(&self, mime: &str) -> bool;

    /// Client options for the directory `hash`.
    fn options(&self, hash: &str) -> VolumeOptions;

    /// Debug snapshot.
    fn debug(&self) -> Value;

    /// Release backend resources. Called once, on unmount.
    async fn umount(&self) {}
}

/// A backend driver: turns a root configuration into a live volume.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Lowercase letter(s) used in volume ids (`m` → `m1_`).
    fn prefix(&self) -> &str;

    /// Mount `config` as volume `volume_id`.
    async fn mount(&self, volume_id: &str, config: &RootConfig) -> VolumeResult<Arc<dyn Volume>>;
}
