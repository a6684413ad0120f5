//! Volume registry.
//!
//! Mounts configured roots through their drivers, assigns every volume a
//! namespaced id and routes hashes back to the owning volume by that
//! namespace.
//!
//! Volume ids are `<driver prefix><n>_` with `n` counting successful mounts
//! from 1 for the lifetime of the registry, so ids are never reused.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use thiserror::Error;

use crate::config::RootConfig;
use crate::hash::{HashCodec, namespace_of};
use crate::volume::{Driver, Volume};

/// Errors mounting a root. The message is what clients see in the
/// mount-error list.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MountError {
    #[error("Driver {0} does not exist")]
    UnknownDriver(String),

    /// The driver refused the root; carries the backend's own message.
    #[error("{0}")]
    Backend(String),
}

/// Whether `prefix` can lead a volume id.
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// A mounted volume and how it got there.
#[derive(Clone)]
pub struct MountRecord {
    pub id: String,
    pub driver: String,
    pub config: RootConfig,
    pub readable: bool,
    /// Hash of the volume root.
    pub root: String,
    codec: HashCodec,
    volume: Arc<dyn Volume>,
}

impl MountRecord {
    pub fn volume(&self) -> &Arc<dyn Volume> {
        &self.volume
    }
}

impl std::fmt::Debug for MountRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountRecord")
            .field("id", &self.id)
            .field("driver", &self.driver)
            .field("readable", &self.readable)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Registry of drivers and mounted volumes.
#[derive(Default)]
pub struct VolumeRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
    /// Mounted volumes in mount order, keyed by id.
    mounts: IndexMap<String, MountRecord>,
    mount_errors: Vec<String>,
    default_id: Option<String>,
    mounted: u64,
    resolutions: AtomicU64,
}

impl std::fmt::Debug for VolumeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeRegistry")
            .field("drivers", &self.drivers.keys().collect::<Vec<_>>())
            .field("mounts", &self.mounts.keys().collect::<Vec<_>>())
            .field("default", &self.default_id)
            .finish_non_exhaustive()
    }
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under `name`. A later registration replaces an
    /// earlier one with the same name.
    ///
    /// The driver's prefix starts every volume id it mounts, so it must be
    /// non-empty ASCII alphanumerics; anything else (a `_` in particular
    /// would end the namespace early) is refused and `false` returned.
    pub fn register_driver(&mut self, name: impl Into<String>, driver: Arc<dyn Driver>) -> bool {
        let name = name.into();
        if !is_valid_prefix(driver.prefix()) {
            tracing::warn!(driver = %name, prefix = %driver.prefix(), "refusing driver with invalid prefix");
            return false;
        }
        self.drivers.insert(name, driver);
        true
    }

    /// Registered driver names, sorted.
    pub fn drivers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Mount one root. Failures are also appended to [`mount_errors`].
    ///
    /// [`mount_errors`]: VolumeRegistry::mount_errors
    pub async fn mount(&mut self, config: &RootConfig) -> Result<String, MountError> {
        let result = self.try_mount(config).await;
        if let Err(err) = &result {
            tracing::warn!(driver = %config.driver, error = %err, "mount failed");
            self.mount_errors.push(err.to_string());
        }
        result
    }

    async fn try_mount(&mut self, config: &RootConfig) -> Result<String, MountError> {
        let driver = self
            .drivers
            .get(&config.driver)
            .cloned()
            .ok_or_else(|| MountError::UnknownDriver(config.driver.clone()))?;

        let id = format!("{}{}_", driver.prefix(), self.mounted + 1);
        let volume = driver
            .mount(&id, config)
            .await
            .map_err(|e| MountError::Backend(e.to_string()))?;
        self.mounted += 1;

        let record = MountRecord {
            id: id.clone(),
            driver: config.driver.clone(),
            config: config.clone(),
            readable: volume.is_readable(),
            root: volume.root(),
            codec: HashCodec::new(id.clone()),
            volume,
        };
        if self.default_id.is_none() && record.readable {
            self.default_id = Some(id.clone());
        }
        tracing::info!(volume = %id, driver = %config.driver, readable = record.readable, "mounted volume");
        self.mounts.insert(id.clone(), record);
        Ok(id)
    }

    /// Mount every root in order.
    pub async fn mount_all(&mut self, roots: &[RootConfig]) -> Vec<Result<String, MountError>> {
        let mut results = Vec::with_capacity(roots.len());
        for root in roots {
            results.push(self.mount(root).await);
        }
        results
    }

    /// Find the volume owning `hash`.
    ///
    /// Returns `None` for unknown namespaces and for tokens the owning volume
    /// could not decode. Every call is counted.
    pub fn resolve(&self, hash: &str) -> Option<Arc<dyn Volume>> {
        self.resolutions.fetch_add(1, Ordering::Relaxed);
        let record = self.mounts.get(namespace_of(hash)?)?;
        record.codec.decode(hash).ok()?;
        Some(Arc::clone(&record.volume))
    }

    /// Number of `resolve` calls so far.
    pub fn resolutions(&self) -> u64 {
        self.resolutions.load(Ordering::Relaxed)
    }

    /// Mounted volumes in mount order.
    pub fn all(&self) -> impl Iterator<Item = (&str, &Arc<dyn Volume>)> {
        self.mounts.iter().map(|(id, r)| (id.as_str(), &r.volume))
    }

    pub fn records(&self) -> impl Iterator<Item = &MountRecord> {
        self.mounts.values()
    }

    /// Unmount a volume. Returns `false` if nothing was mounted under `id`.
    pub async fn unmount(&mut self, id: &str) -> bool {
        let Some(record) = self.mounts.shift_remove(id) else {
            return false;
        };
        record.volume.umount().await;
        if self.default_id.as_deref() == Some(id) {
            self.default_id = self
                .mounts
                .values()
                .find(|r| r.readable)
                .map(|r| r.id.clone());
        }
        tracing::info!(volume = %id, "unmounted volume");
        true
    }

    pub fn mount_errors(&self) -> &[String] {
        &self.mount_errors
    }

    /// The volume used when a request names none.
    pub fn default_volume(&self) -> Option<Arc<dyn Volume>> {
        self.default_id.as_deref().and_then(|id| self.get(id))
    }

    pub fn default_id(&self) -> Option<&str> {
        self.default_id.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Volume>> {
        self.mounts.get(id).map(|r| Arc::clone(&r.volume))
    }

    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}
