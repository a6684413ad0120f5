//! In-memory volume.
//!
//! Registered as the `Memory` (and `Test`) driver. All data is ephemeral and
//! kept in one ordered map keyed by volume-relative path (`/`, `/docs`,
//! `/docs/readme.txt`). Archives are stored as a serialized manifest of the
//! packed nodes and "resizing" only updates the recorded image dimensions,
//! so the volume exercises the whole capability contract without doing any
//! real storage or image work.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use finder_types::{Archivers, DIRECTORY_MIME, FileNode, VolumeOptions, now_secs};

use super::mime::{MimeFilter, archive_extension, guess_mime, mime_matches};
use super::ops::{Driver, Volume};
use super::types::{FileStream, ResizeMode, ResizeRequest, UploadFile};
use super::{VolumeError, VolumeResult};
use crate::config::RootConfig;
use crate::hash::HashCodec;

const ROOT: &str = "/";

const DEFAULT_ARCHIVE_MIMES: &[&str] = &["application/zip", "application/x-tar", "application/x-gzip"];

/// Node attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Attr {
    mime: String,
    mtime: i64,
    read: bool,
    write: bool,
    locked: bool,
    dim: Option<(u32, u32)>,
}

/// Entry in the memory volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Entry {
    File { data: Vec<u8>, attr: Attr },
    Directory { attr: Attr },
}

impl Entry {
    fn attr(&self) -> &Attr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
        }
    }

    fn attr_mut(&mut self) -> &mut Attr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }

    fn size(&self) -> u64 {
        match self {
            Entry::File { data, .. } => data.len() as u64,
            Entry::Directory { .. } => 0,
        }
    }
}

/// One packed node inside an archive, path relative to the archive's
/// directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArchiveEntry {
    path: String,
    entry: Entry,
}

type Entries = BTreeMap<String, Entry>;

fn parent_of(path: &str) -> Option<&str> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) | None => Some(ROOT),
        Some(i) => Some(&path[..i]),
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn join(dir: &str, name: &str) -> String {
    if dir == ROOT {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// True if `path` is `ancestor` or lies below it.
fn is_within(path: &str, ancestor: &str) -> bool {
    ancestor == ROOT
        || path == ancestor
        || (path.starts_with(ancestor) && path[ancestor.len()..].starts_with('/'))
}

fn validate_name(name: &str) -> VolumeResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(VolumeError::invalid_name(name));
    }
    Ok(())
}

fn split_ext(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

/// First free name in `dir` of the form `base.ext`, `base 1.ext`, ...
fn unique_name(entries: &Entries, dir: &str, base: &str, ext: Option<&str>) -> String {
    let with_ext = |b: String| match ext {
        Some(ext) => format!("{b}.{ext}"),
        None => b,
    };
    let mut candidate = with_ext(base.to_string());
    let mut n = 1;
    while entries.contains_key(&join(dir, &candidate)) {
        candidate = with_ext(format!("{base} {n}"));
        n += 1;
    }
    candidate
}

fn children<'a>(entries: &'a Entries, dir: &'a str) -> impl Iterator<Item = (&'a String, &'a Entry)> {
    entries
        .iter()
        .filter(move |(path, _)| parent_of(path) == Some(dir))
}

fn subtree_keys(entries: &Entries, path: &str) -> Vec<String> {
    entries
        .keys()
        .filter(|k| is_within(k, path))
        .cloned()
        .collect()
}

/// In-memory volume.
///
/// Thread-safe via internal locks. All data is lost when dropped.
pub struct MemoryVolume {
    id: String,
    driver: String,
    codec: HashCodec,
    config: RootConfig,
    start_path: String,
    entries: RwLock<Entries>,
    removed: Mutex<Vec<FileNode>>,
    mimes: MimeFilter,
    last_error: Mutex<Option<String>>,
}

impl std::fmt::Debug for MemoryVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryVolume")
            .field("id", &self.id)
            .field("driver", &self.driver)
            .field("entries", &self.entries.read().len())
            .finish_non_exhaustive()
    }
}

impl MemoryVolume {
    /// Create an empty volume with default root options.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let config = RootConfig::new("Memory");
        let mut entries = Entries::new();
        entries.insert(
            ROOT.to_string(),
            Entry::Directory {
                attr: Self::default_attr(&config, DIRECTORY_MIME),
            },
        );
        Self {
            codec: HashCodec::new(id.clone()),
            driver: config.driver.clone(),
            id,
            config,
            start_path: ROOT.to_string(),
            entries: RwLock::new(entries),
            removed: Mutex::new(Vec::new()),
            mimes: MimeFilter::new(),
            last_error: Mutex::new(None),
        }
    }

    /// Create a volume from a root configuration, seeding its nodes.
    pub fn from_config(id: impl Into<String>, config: RootConfig) -> VolumeResult<Self> {
        let mut volume = Self::new(id);
        volume.driver = config.driver.clone();
        volume.config = config;
        if let Some(Entry::Directory { attr }) = volume.entries.get_mut().get_mut(ROOT) {
            *attr = Self::default_attr(&volume.config, DIRECTORY_MIME);
        }

        let seeds = volume.config.seed.clone();
        for spec in &seeds {
            volume.seed(spec)?;
        }

        let start = format!("/{}", volume.config.start_path.trim_matches('/'));
        if volume.entries.get_mut().get(&start).is_some_and(Entry::is_dir) {
            volume.start_path = start;
        } else if !volume.config.start_path.is_empty() {
            tracing::debug!(volume = %volume.id, start_path = %volume.config.start_path, "start path not found, using root");
        }
        Ok(volume)
    }

    /// Hash of a volume-relative path.
    pub fn hash_of(&self, path: &str) -> String {
        self.codec.encode(path)
    }

    /// Add one seed node: `dir/`, `dir/file`, or `dir/file=content`.
    fn seed(&mut self, spec: &str) -> VolumeResult<()> {
        let (path, content) = match spec.split_once('=') {
            Some((path, content)) => (path, Some(content)),
            None => (spec, None),
        };
        let is_dir = path.ends_with('/') && content.is_none();
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(());
        }

        let components: Vec<&str> = trimmed.split('/').collect();
        let mut current = ROOT.to_string();
        for (i, name) in components.iter().enumerate() {
            validate_name(name)?;
            current = join(&current, name);
            let last = i + 1 == components.len();
            if last && !is_dir {
                let data = content.unwrap_or_default().as_bytes().to_vec();
                let entry = self.new_file(name, data);
                self.entries.get_mut().insert(current.clone(), entry);
            } else {
                let entry = self.new_dir();
                self.entries.get_mut().entry(current.clone()).or_insert(entry);
            }
        }
        Ok(())
    }

    fn default_attr(config: &RootConfig, mime: &str) -> Attr {
        Attr {
            mime: mime.to_string(),
            mtime: now_secs(),
            read: config.defaults.read,
            write: config.defaults.write,
            locked: false,
            dim: None,
        }
    }

    fn new_dir(&self) -> Entry {
        Entry::Directory {
            attr: Self::default_attr(&self.config, DIRECTORY_MIME),
        }
    }

    fn new_file(&self, name: &str, data: Vec<u8>) -> Entry {
        Entry::File {
            data,
            attr: Self::default_attr(&self.config, guess_mime(name)),
        }
    }

    fn root_name(&self) -> String {
        if !self.config.alias.is_empty() {
            return self.config.alias.clone();
        }
        match self.config.path.trim_end_matches('/').rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.driver.clone(),
        }
    }

    fn is_hidden(&self, path: &str) -> bool {
        path.split('/').filter(|c| !c.is_empty()).any(|c| {
            c == self.config.tmb_path.trim_matches('/') || self.config.hidden.iter().any(|h| h == c)
        })
    }

    fn archive_mimes(&self) -> Vec<String> {
        if self.config.archive_mimes.is_empty() {
            DEFAULT_ARCHIVE_MIMES.iter().map(|m| m.to_string()).collect()
        } else {
            self.config.archive_mimes.clone()
        }
    }

    fn path_of(&self, hash: &str) -> VolumeResult<String> {
        Ok(self.codec.decode(hash)?)
    }

    fn track<T>(&self, result: VolumeResult<T>) -> VolumeResult<T> {
        if let Err(err) = &result {
            *self.last_error.lock() = Some(err.to_string());
        }
        result
    }

    fn tracked<T>(&self, op: impl FnOnce() -> VolumeResult<T>) -> VolumeResult<T> {
        self.track(op())
    }

    fn node(&self, entries: &Entries, path: &str, entry: &Entry) -> FileNode {
        let attr = entry.attr();
        let is_root = path == ROOT;
        let name = if is_root {
            self.root_name()
        } else {
            name_of(path).to_string()
        };

        let mut node = FileNode::new(self.codec.encode(path), name, attr.mime.clone())
            .with_size(entry.size());
        node.ts = attr.mtime;
        node.read = attr.read;
        node.write = attr.write;
        node.locked = attr.locked;
        node.hidden = !is_root && self.is_hidden(path);
        node.phash = parent_of(path).map(|p| self.codec.encode(p));
        if entry.is_dir() {
            node.dirs = Some(children(entries, path).any(|(_, e)| e.is_dir()));
        }
        if is_root {
            node.volumeid = Some(self.id.clone());
            node.isroot = true;
        }
        if let Some((w, h)) = attr.dim {
            node.dim = Some(format!("{w}x{h}"));
        }
        node
    }

    fn node_at(&self, entries: &Entries, path: &str) -> Option<FileNode> {
        entries.get(path).map(|e| self.node(entries, path, e))
    }

    fn visible(&self, node: &FileNode) -> bool {
        !node.hidden && self.mimes.accepts(&node.mime)
    }

    fn lookup<'a>(entries: &'a Entries, path: &str, hash: &str) -> VolumeResult<&'a Entry> {
        entries.get(path).ok_or_else(|| VolumeError::not_found(hash))
    }

    fn lookup_dir<'a>(entries: &'a Entries, path: &str, hash: &str) -> VolumeResult<&'a Attr> {
        match Self::lookup(entries, path, hash)? {
            Entry::Directory { attr } => Ok(attr),
            Entry::File { .. } => Err(VolumeError::not_a_directory(hash)),
        }
    }

    fn writable_dir(entries: &Entries, path: &str, hash: &str) -> VolumeResult<()> {
        if Self::lookup_dir(entries, path, hash)?.write {
            Ok(())
        } else {
            Err(VolumeError::permission_denied(hash))
        }
    }

    /// Remove the subtree at `path`, recording every removed node.
    fn remove_subtree(&self, entries: &mut Entries, path: &str) -> Vec<FileNode> {
        let keys = subtree_keys(entries, path);
        let nodes: Vec<FileNode> = keys
            .iter()
            .filter_map(|k| self.node_at(entries, k))
            .collect();
        for key in &keys {
            entries.remove(key);
        }
        self.removed.lock().extend(nodes.iter().cloned());
        nodes
    }

    /// Copy the subtree at `src` to `dst` (same volume).
    fn copy_subtree(entries: &mut Entries, src: &str, dst: &str) {
        let now = now_secs();
        let copies: Vec<(String, Entry)> = entries
            .iter()
            .filter(|(k, _)| is_within(k, src))
            .map(|(k, e)| {
                let mut e = e.clone();
                e.attr_mut().mtime = now;
                e.attr_mut().locked = false;
                (format!("{dst}{}", &k[src.len()..]), e)
            })
            .collect();
        entries.extend(copies);
    }

    /// Move the subtree at `src` to `dst` (same volume). The old nodes are
    /// recorded as removed since their hashes no longer resolve.
    fn move_subtree(&self, entries: &mut Entries, src: &str, dst: &str) {
        let keys = subtree_keys(entries, src);
        let old: Vec<FileNode> = keys
            .iter()
            .filter_map(|k| self.node_at(entries, k))
            .collect();
        for key in keys {
            if let Some(mut entry) = entries.remove(&key) {
                if key == src {
                    if let Entry::File { attr, .. } = &mut entry {
                        attr.mime = guess_mime(name_of(dst)).to_string();
                    }
                    entry.attr_mut().mtime = now_secs();
                }
                entries.insert(format!("{dst}{}", &key[src.len()..]), entry);
            }
        }
        self.removed.lock().extend(old);
    }

    /// Make room for `target` before a paste: overwrite when allowed.
    fn clear_target(&self, entries: &mut Entries, target: &str) -> VolumeResult<()> {
        if !entries.contains_key(target) {
            return Ok(());
        }
        if !self.config.copy_overwrite {
            return Err(VolumeError::already_exists(name_of(target)));
        }
        self.remove_subtree(entries, target);
        Ok(())
    }

    fn create(&self, parent: &str, name: &str, dir: bool) -> VolumeResult<FileNode> {
        validate_name(name)?;
        let parent_path = self.path_of(parent)?;
        let mut entries = self.entries.write();
        Self::writable_dir(&entries, &parent_path, parent)?;

        let path = join(&parent_path, name);
        if entries.contains_key(&path) {
            return Err(VolumeError::already_exists(name));
        }
        let entry = if dir {
            self.new_dir()
        } else {
            self.new_file(name, Vec::new())
        };
        entries.insert(path.clone(), entry);
        self.node_at(&entries, &path)
            .ok_or_else(|| VolumeError::other("created node vanished"))
    }

    fn remove(&self, hash: &str) -> VolumeResult<FileNode> {
        let path = self.path_of(hash)?;
        if path == ROOT {
            return Err(VolumeError::permission_denied(hash));
        }
        let mut entries = self.entries.write();
        let attr = Self::lookup(&entries, &path, hash)?.attr();
        if attr.locked || !attr.write {
            return Err(VolumeError::permission_denied(hash));
        }
        let nodes = self.remove_subtree(&mut entries, &path);
        nodes
            .into_iter()
            .next()
            .ok_or_else(|| VolumeError::not_found(hash))
    }

    fn rename_node(&self, hash: &str, name: &str) -> VolumeResult<FileNode> {
        validate_name(name)?;
        let path = self.path_of(hash)?;
        let parent = parent_of(&path).ok_or_else(|| VolumeError::permission_denied(hash))?;
        let mut entries = self.entries.write();
        let attr = Self::lookup(&entries, &path, hash)?.attr();
        if attr.locked || !attr.write {
            return Err(VolumeError::permission_denied(hash));
        }

        let target = join(parent, name);
        if target == path {
            return self
                .node_at(&entries, &path)
                .ok_or_else(|| VolumeError::not_found(hash));
        }
        if entries.contains_key(&target) {
            return Err(VolumeError::already_exists(name));
        }
        self.move_subtree(&mut entries, &path, &target);
        self.node_at(&entries, &target)
            .ok_or_else(|| VolumeError::not_found(hash))
    }

    fn duplicate_node(&self, hash: &str, suffix: &str) -> VolumeResult<FileNode> {
        let path = self.path_of(hash)?;
        let parent = parent_of(&path).ok_or_else(|| VolumeError::permission_denied(hash))?;
        let mut entries = self.entries.write();
        let entry = Self::lookup(&entries, &path, hash)?;
        Self::writable_dir(&entries, parent, hash)?;

        let name = name_of(&path);
        let (stem, ext) = if entry.is_dir() {
            (name, None)
        } else {
            split_ext(name)
        };
        let copy_name = unique_name(&entries, parent, &format!("{stem} {suffix}"), ext);
        let target = join(parent, &copy_name);
        Self::copy_subtree(&mut entries, &path, &target);
        self.node_at(&entries, &target)
            .ok_or_else(|| VolumeError::other("duplicate vanished"))
    }

    /// Copy or move within this volume.
    fn paste_local(&self, src_hash: &str, dst_hash: &str, cut: bool) -> VolumeResult<FileNode> {
        let src = self.path_of(src_hash)?;
        let dst = self.path_of(dst_hash)?;
        if src == ROOT {
            return Err(VolumeError::permission_denied(src_hash));
        }
        let mut entries = self.entries.write();
        let src_attr = Self::lookup(&entries, &src, src_hash)?.attr();
        if cut && (src_attr.locked || !src_attr.write) {
            return Err(VolumeError::permission_denied(src_hash));
        }
        Self::writable_dir(&entries, &dst, dst_hash)?;
        if is_within(&dst, &src) {
            return Err(VolumeError::other(format!("cannot paste {src_hash} into itself")));
        }

        let target = join(&dst, name_of(&src));
        if target == src {
            if cut {
                return self
                    .node_at(&entries, &src)
                    .ok_or_else(|| VolumeError::not_found(src_hash));
            }
            return Err(VolumeError::already_exists(name_of(&src)));
        }
        self.clear_target(&mut entries, &target)?;
        if cut {
            self.move_subtree(&mut entries, &src, &target);
        } else {
            Self::copy_subtree(&mut entries, &src, &target);
        }
        self.node_at(&entries, &target)
            .ok_or_else(|| VolumeError::other("pasted node vanished"))
    }

    /// Read a subtree of another volume into entries rooted at `target`.
    /// Nothing is written here; the caller inserts the result in one step.
    async fn collect_foreign(
        &self,
        src: &dyn Volume,
        src_hash: &str,
        target: &str,
    ) -> VolumeResult<Vec<(String, Entry)>> {
        let mut copies = Vec::new();
        let mut pending = vec![(src_hash.to_string(), target.to_string())];
        while let Some((hash, path)) = pending.pop() {
            let node = src.file(&hash).await?;
            let entry = if node.is_dir() {
                for child in src.list_dir(&hash).await? {
                    validate_name(&child.name)?;
                    pending.push((child.hash.clone(), join(&path, &child.name)));
                }
                self.new_dir()
            } else {
                let data = src.get_contents(&hash).await?;
                let mut attr = Self::default_attr(&self.config, &node.mime);
                attr.dim = node.dim.as_deref().and_then(parse_dim);
                Entry::File { data, attr }
            };
            copies.push((path, entry));
        }
        Ok(copies)
    }

    /// Copy (or move) a subtree from another volume. The copy lands all at
    /// once; a failed source removal after a cut takes it back out and puts
    /// back whatever it replaced.
    async fn paste_foreign(
        &self,
        src: &dyn Volume,
        src_hash: &str,
        dst_hash: &str,
        cut: bool,
    ) -> VolumeResult<FileNode> {
        let source = src.file(src_hash).await?;
        validate_name(&source.name)?;
        if cut && (source.locked || !source.write) {
            return Err(VolumeError::permission_denied(src_hash));
        }
        let dst = self.path_of(dst_hash)?;
        let target = join(&dst, &source.name);
        {
            let entries = self.entries.read();
            Self::writable_dir(&entries, &dst, dst_hash)?;
            if entries.contains_key(&target) && !self.config.copy_overwrite {
                return Err(VolumeError::already_exists(&source.name));
            }
        }

        let copies = self.collect_foreign(src, src_hash, &target).await?;

        let (displaced, replaced) = {
            let mut entries = self.entries.write();
            Self::writable_dir(&entries, &dst, dst_hash)?;
            if entries.contains_key(&target) && !self.config.copy_overwrite {
                return Err(VolumeError::already_exists(&source.name));
            }
            let keys = subtree_keys(&entries, &target);
            let replaced: Vec<FileNode> = keys
                .iter()
                .filter_map(|k| self.node_at(&entries, k))
                .collect();
            let displaced: Vec<(String, Entry)> = keys
                .into_iter()
                .filter_map(|k| entries.remove(&k).map(|e| (k, e)))
                .collect();
            entries.extend(copies);
            (displaced, replaced)
        };

        if cut {
            if let Err(err) = src.rm(src_hash).await {
                tracing::warn!(src = %src_hash, error = %err, "source removal failed, undoing copy");
                let mut entries = self.entries.write();
                for key in subtree_keys(&entries, &target) {
                    entries.remove(&key);
                }
                entries.extend(displaced);
                return Err(err);
            }
        }

        self.removed.lock().extend(replaced);
        let entries = self.entries.read();
        self.node_at(&entries, &target)
            .ok_or_else(|| VolumeError::other("pasted node vanished"))
    }

    fn store_upload(&self, file: &UploadFile, dst_hash: &str) -> VolumeResult<FileNode> {
        validate_name(&file.name)?;
        let max = self.config.upload_max_size;
        if max > 0 && file.size() > max {
            return Err(VolumeError::other(format!(
                "{} exceeds the upload limit of {max} bytes",
                file.name
            )));
        }

        let dst = self.path_of(dst_hash)?;
        let mut entries = self.entries.write();
        Self::writable_dir(&entries, &dst, dst_hash)?;

        let path = join(&dst, &file.name);
        match entries.get(&path) {
            Some(Entry::Directory { .. }) => return Err(VolumeError::is_a_directory(&file.name)),
            Some(Entry::File { attr, .. }) if attr.locked || !self.config.upload_overwrite => {
                return Err(VolumeError::already_exists(&file.name));
            }
            _ => {}
        }
        let entry = self.new_file(&file.name, file.content.clone());
        entries.insert(path.clone(), entry);
        self.node_at(&entries, &path)
            .ok_or_else(|| VolumeError::other("uploaded node vanished"))
    }

    fn write_contents(&self, hash: &str, content: &[u8]) -> VolumeResult<FileNode> {
        let path = self.path_of(hash)?;
        let mut entries = self.entries.write();
        match entries.get_mut(&path) {
            Some(Entry::File { data, attr }) => {
                if attr.locked || !attr.write {
                    return Err(VolumeError::permission_denied(hash));
                }
                *data = content.to_vec();
                attr.mtime = now_secs();
            }
            Some(Entry::Directory { .. }) => return Err(VolumeError::is_a_directory(hash)),
            None => return Err(VolumeError::not_found(hash)),
        }
        self.node_at(&entries, &path)
            .ok_or_else(|| VolumeError::not_found(hash))
    }

    fn pack(&self, hashes: &[String], mime: &str) -> VolumeResult<FileNode> {
        let ext = archive_extension(mime)
            .filter(|_| self.archive_mimes().iter().any(|m| m == mime))
            .ok_or_else(|| VolumeError::other(format!("unsupported archive type {mime}")))?;
        let first = hashes
            .first()
            .ok_or_else(|| VolumeError::other("nothing to archive"))?;
        let first_path = self.path_of(first)?;
        let dir = parent_of(&first_path)
            .ok_or_else(|| VolumeError::permission_denied(first.as_str()))?
            .to_string();

        let mut entries = self.entries.write();
        Self::writable_dir(&entries, &dir, first)?;

        let mut manifest = Vec::new();
        for hash in hashes {
            let path = self.path_of(hash)?;
            Self::lookup(&entries, &path, hash)?;
            if parent_of(&path) != Some(dir.as_str()) {
                return Err(VolumeError::other("archived nodes must share a directory"));
            }
            for key in subtree_keys(&entries, &path) {
                if let Some(entry) = entries.get(&key) {
                    let rel = key[dir.len()..].trim_start_matches('/').to_string();
                    manifest.push(ArchiveEntry {
                        path: rel,
                        entry: entry.clone(),
                    });
                }
            }
        }
        let data = serde_json::to_vec(&manifest).map_err(|e| VolumeError::other(e.to_string()))?;

        let name = unique_name(&entries, &dir, "Archive", Some(ext));
        let path = join(&dir, &name);
        entries.insert(
            path.clone(),
            Entry::File {
                data,
                attr: Self::default_attr(&self.config, mime),
            },
        );
        self.node_at(&entries, &path)
            .ok_or_else(|| VolumeError::other("archive vanished"))
    }

    fn unpack(&self, hash: &str) -> VolumeResult<Vec<FileNode>> {
        let path = self.path_of(hash)?;
        let dir = parent_of(&path)
            .ok_or_else(|| VolumeError::is_a_directory(hash))?
            .to_string();
        let mut entries = self.entries.write();
        let (data, mime) = match Self::lookup(&entries, &path, hash)? {
            Entry::File { data, attr } => (data.clone(), attr.mime.clone()),
            Entry::Directory { .. } => return Err(VolumeError::is_a_directory(hash)),
        };
        if !self.archive_mimes().contains(&mime) {
            return Err(VolumeError::other(format!("cannot extract {mime}")));
        }
        Self::writable_dir(&entries, &dir, hash)?;

        let manifest: Vec<ArchiveEntry> = serde_json::from_slice(&data)
            .map_err(|_| VolumeError::other(format!("{hash} is not a readable archive")))?;
        for item in &manifest {
            for component in item.path.split('/') {
                validate_name(component)?;
            }
        }

        let (stem, _) = split_ext(name_of(&path));
        let folder = join(&dir, &unique_name(&entries, &dir, stem, None));
        let mut created = BTreeSet::new();
        entries.insert(folder.clone(), self.new_dir());
        created.insert(folder.clone());
        for item in manifest {
            let target = join(&folder, &item.path);
            // Parents first, in case the manifest omitted them.
            let mut parent = parent_of(&target);
            while let Some(p) = parent {
                if p == folder || entries.contains_key(p) {
                    break;
                }
                entries.insert(p.to_string(), self.new_dir());
                created.insert(p.to_string());
                parent = parent_of(p);
            }
            let mut entry = item.entry;
            entry.attr_mut().mtime = now_secs();
            entries.insert(target.clone(), entry);
            created.insert(target);
        }

        Ok(created
            .iter()
            .filter_map(|p| self.node_at(&entries, p))
            .collect())
    }

    fn apply_resize(&self, hash: &str, request: &ResizeRequest) -> VolumeResult<FileNode> {
        let path = self.path_of(hash)?;
        let mut entries = self.entries.write();
        match entries.get_mut(&path) {
            Some(Entry::File { attr, .. }) => {
                if !attr.mime.starts_with("image/") {
                    return Err(VolumeError::other(format!("{hash} is not an image")));
                }
                if attr.locked || !attr.write {
                    return Err(VolumeError::permission_denied(hash));
                }
                let current = attr.dim.unwrap_or((request.width, request.height));
                attr.dim = Some(match request.mode {
                    ResizeMode::Resize | ResizeMode::Crop => (request.width, request.height),
                    ResizeMode::Rotate if request.degree.rem_euclid(180) == 90 => {
                        (current.1, current.0)
                    }
                    ResizeMode::Rotate => current,
                });
                attr.mtime = now_secs();
            }
            Some(Entry::Directory { .. }) => return Err(VolumeError::is_a_directory(hash)),
            None => return Err(VolumeError::not_found(hash)),
        }
        self.node_at(&entries, &path)
            .ok_or_else(|| VolumeError::not_found(hash))
    }
}

fn parse_dim(dim: &str) -> Option<(u32, u32)> {
    let (w, h) = dim.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

#[async_trait]
impl Volume for MemoryVolume {
    fn id(&self) -> &str {
        &self.id
    }

    fn driver(&self) -> &str {
        &self.driver
    }

    fn is_readable(&self) -> bool {
        self.config.defaults.read
    }

    fn root(&self) -> String {
        self.codec.encode(ROOT)
    }

    fn default_path(&self) -> String {
        self.codec.encode(&self.start_path)
    }

    async fn dir(&self, hash: &str) -> VolumeResult<FileNode> {
        self.tracked(|| {
            let path = self.path_of(hash)?;
            let entries = self.entries.read();
            let entry = Self::lookup(&entries, &path, hash)?;
            if !entry.is_dir() {
                return Err(VolumeError::not_a_directory(hash));
            }
            Ok(self.node(&entries, &path, entry))
        })
    }

    async fn scan_dir(&self, hash: &str) -> VolumeResult<Vec<FileNode>> {
        self.tracked(|| {
            let path = self.path_of(hash)?;
            let entries = self.entries.read();
            if !Self::lookup_dir(&entries, &path, hash)?.read {
                return Err(VolumeError::permission_denied(hash));
            }
            Ok(children(&entries, &path)
                .map(|(p, e)| self.node(&entries, p, e))
                .filter(|n| self.visible(n))
                .collect())
        })
    }

    async fn list_dir(&self, hash: &str) -> VolumeResult<Vec<FileNode>> {
        self.tracked(|| {
            let path = self.path_of(hash)?;
            let entries = self.entries.read();
            if !Self::lookup_dir(&entries, &path, hash)?.read {
                return Err(VolumeError::permission_denied(hash));
            }
            Ok(children(&entries, &path)
                .map(|(p, e)| self.node(&entries, p, e))
                .collect())
        })
    }

    async fn tree(&self, hash: &str) -> VolumeResult<Vec<FileNode>> {
        self.tracked(|| {
            let path = self.path_of(hash)?;
            let entries = self.entries.read();
            Self::lookup_dir(&entries, &path, hash)?;
            Ok(entries
                .iter()
                .filter(|(p, e)| e.is_dir() && is_within(p, &path))
                .map(|(p, e)| self.node(&entries, p, e))
                .filter(|n| !n.hidden)
                .collect())
        })
    }

    async fn parents(&self, hash: &str) -> VolumeResult<Vec<FileNode>> {
        self.tracked(|| {
            let path = self.path_of(hash)?;
            let entries = self.entries.read();
            Self::lookup(&entries, &path, hash)?;

            let mut paths = BTreeSet::new();
            let mut current = parent_of(&path);
            while let Some(dir) = current {
                paths.insert(dir.to_string());
                for (child, entry) in children(&entries, dir) {
                    if entry.is_dir() {
                        paths.insert(child.clone());
                    }
                }
                current = parent_of(dir);
            }
            Ok(paths
                .iter()
                .filter_map(|p| self.node_at(&entries, p))
                .filter(|n| !n.hidden)
                .collect())
        })
    }

    async fn file(&self, hash: &str) -> VolumeResult<FileNode> {
        self.tracked(|| {
            let path = self.path_of(hash)?;
            let entries = self.entries.read();
            let entry = Self::lookup(&entries, &path, hash)?;
            Ok(self.node(&entries, &path, entry))
        })
    }

    async fn open(&self, hash: &str) -> VolumeResult<FileStream> {
        self.tracked(|| {
            let path = self.path_of(hash)?;
            let entries = self.entries.read();
            match Self::lookup(&entries, &path, hash)? {
                Entry::File { data, attr } if attr.read => Ok(FileStream {
                    name: name_of(&path).to_string(),
                    mime: attr.mime.clone(),
                    size: data.len() as u64,
                    content: data.clone(),
                }),
                Entry::File { .. } => Err(VolumeError::permission_denied(hash)),
                Entry::Directory { .. } => Err(VolumeError::is_a_directory(hash)),
            }
        })
    }

    async fn size(&self, hash: &str) -> VolumeResult<u64> {
        self.tracked(|| {
            let path = self.path_of(hash)?;
            let entries = self.entries.read();
            Self::lookup(&entries, &path, hash)?;
            Ok(entries
                .iter()
                .filter(|(p, _)| is_within(p, &path))
                .map(|(_, e)| e.size())
                .sum())
        })
    }

    async fn get_contents(&self, hash: &str) -> VolumeResult<Vec<u8>> {
        self.tracked(|| {
            let path = self.path_of(hash)?;
            let entries = self.entries.read();
            match Self::lookup(&entries, &path, hash)? {
                Entry::File { data, attr } if attr.read => Ok(data.clone()),
                Entry::File { .. } => Err(VolumeError::permission_denied(hash)),
                Entry::Directory { .. } => Err(VolumeError::is_a_directory(hash)),
            }
        })
    }

    async fn search(&self, query: &str, mimes: &[String]) -> VolumeResult<Vec<FileNode>> {
        let needle = query.to_lowercase();
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|(p, _)| p.as_str() != ROOT && name_of(p).to_lowercase().contains(&needle))
            .map(|(p, e)| self.node(&entries, p, e))
            .filter(|n| self.visible(n) && mime_matches(mimes, &n.mime))
            .collect())
    }

    async fn dimensions(&self, hash: &str) -> VolumeResult<String> {
        self.tracked(|| {
            let path = self.path_of(hash)?;
            let entries = self.entries.read();
            let attr = Self::lookup(&entries, &path, hash)?.attr();
            if !attr.mime.starts_with("image/") {
                return Err(VolumeError::other(format!("{hash} is not an image")));
            }
            let (w, h) = attr.dim.unwrap_or((0, 0));
            Ok(format!("{w}x{h}"))
        })
    }

    async fn tmb(&self, hash: &str) -> VolumeResult<String> {
        self.tracked(|| {
            let path = self.path_of(hash)?;
            let entries = self.entries.read();
            let attr = Self::lookup(&entries, &path, hash)?.attr();
            if !attr.mime.starts_with("image/") {
                return Err(VolumeError::other(format!("{hash} is not an image")));
            }
            Ok(format!("{hash}.png"))
        })
    }

    fn realpath(&self, hash: &str) -> VolumeResult<String> {
        let path = self.path_of(hash)?;
        let base = self.config.path.trim_end_matches('/');
        Ok(if base.is_empty() {
            path
        } else if path == ROOT {
            base.to_string()
        } else {
            format!("{base}{path}")
        })
    }

    async fn mkdir(&self, parent: &str, name: &str) -> VolumeResult<FileNode> {
        self.track(self.create(parent, name, true))
    }

    async fn mkfile(&self, parent: &str, name: &str) -> VolumeResult<FileNode> {
        self.track(self.create(parent, name, false))
    }

    async fn rm(&self, hash: &str) -> VolumeResult<FileNode> {
        self.track(self.remove(hash))
    }

    async fn rename(&self, hash: &str, name: &str) -> VolumeResult<FileNode> {
        self.track(self.rename_node(hash, name))
    }

    async fn duplicate(&self, hash: &str, suffix: &str) -> VolumeResult<FileNode> {
        self.track(self.duplicate_node(hash, suffix))
    }

    async fn paste(
        &self,
        src: &dyn Volume,
        src_hash: &str,
        dst_hash: &str,
        cut: bool,
    ) -> VolumeResult<FileNode> {
        let result = if src.id() == self.id {
            self.paste_local(src_hash, dst_hash, cut)
        } else {
            self.paste_foreign(src, src_hash, dst_hash, cut).await
        };
        self.track(result)
    }

    async fn upload(&self, file: &UploadFile, dst_hash: &str) -> VolumeResult<FileNode> {
        self.track(self.store_upload(file, dst_hash))
    }

    async fn put_contents(&self, hash: &str, content: &[u8]) -> VolumeResult<FileNode> {
        self.track(self.write_contents(hash, content))
    }

    async fn archive(&self, hashes: &[String], mime: &str) -> VolumeResult<FileNode> {
        self.track(self.pack(hashes, mime))
    }

    async fn extract(&self, hash: &str) -> VolumeResult<Vec<FileNode>> {
        self.track(self.unpack(hash))
    }

    async fn resize(&self, hash: &str, request: &ResizeRequest) -> VolumeResult<FileNode> {
        self.track(self.apply_resize(hash, request))
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn removed(&self) -> Vec<FileNode> {
        self.removed.lock().clone()
    }

    fn reset_removed(&self) {
        self.removed.lock().clear();
    }

    fn set_mimes_filter(&self, mimes: Vec<String>) {
        self.mimes.set(mimes);
    }

    fn mime_accepted(&self, mime: &str) -> bool {
        self.mimes.accepts(mime)
    }

    fn options(&self, hash: &str) -> VolumeOptions {
        let path = self.path_of(hash).unwrap_or_else(|_| ROOT.to_string());
        let root = self.root_name();
        let url = self.config.url.trim_end_matches('/').to_string();
        let tmb_url = if url.is_empty() {
            String::new()
        } else {
            format!("{url}/{}/", self.config.tmb_path.trim_matches('/'))
        };
        let archivers = self.archive_mimes();
        VolumeOptions {
            path: if path == ROOT { root } else { format!("{root}{path}") },
            url,
            tmb_url,
            disabled: self.config.disabled.clone(),
            upload_max_size: self.config.upload_max_size,
            copy_overwrite: self.config.copy_overwrite,
            upload_overwrite: self.config.upload_overwrite,
            archivers: Archivers {
                create: archivers.clone(),
                extract: archivers,
            },
            ..VolumeOptions::default()
        }
    }

    fn debug(&self) -> Value {
        json!({
            "id": self.id,
            "driver": self.driver,
            "name": self.root_name(),
            "entries": self.entries.read().len(),
            "mimes": self.mimes.get(),
            "lastError": self.last_error(),
        })
    }

    async fn umount(&self) {
        tracing::debug!(volume = %self.id, "releasing memory volume");
        let mut entries = self.entries.write();
        entries.retain(|path, _| path == ROOT);
    }
}

/// Driver for [`MemoryVolume`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryDriver;

#[async_trait]
impl Driver for MemoryDriver {
    fn prefix(&self) -> &str {
        "m"
    }

    async fn mount(&self, volume_id: &str, config: &RootConfig) -> VolumeResult<Arc<dyn Volume>> {
        Ok(Arc::new(MemoryVolume::from_config(volume_id, config.clone())?))
    }
}
