//! Command handlers.
//!
//! One function per command. Handlers resolve their targets through the
//! registry, call the owning volume and fill in the response fields the
//! command defines. They return `Err` only for fatal conditions; per-item
//! failures of multi-target commands become warnings.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;

use finder_types::{
    API_VERSION, CommandError, ErrorKind, ErrorList, FileNode, RawFile, Response, Warning,
};

use super::args::Args;
use super::batch::Batch;
use crate::commands::Command;
use crate::config::ConnectorConfig;
use crate::registry::VolumeRegistry;
use crate::volume::{ResizeMode, ResizeRequest, Volume, VolumeError};

pub(super) type HandlerResult = Result<Response, CommandError>;

/// What a handler can see.
pub(super) struct Ctx<'a> {
    pub registry: &'a VolumeRegistry,
    pub config: &'a ConnectorConfig,
    pub args: &'a Args,
}

impl Ctx<'_> {
    /// Resolve `hash` or fail with `[kind, hash]`.
    fn resolve(&self, hash: &str, kind: ErrorKind) -> Result<Arc<dyn Volume>, CommandError> {
        self.registry.resolve(hash).ok_or_else(|| fatal(kind, hash))
    }

    /// Resolve a destination directory or fail with
    /// `[errTrgFolderNotFound, hash]`.
    async fn destination(&self, hash: &str) -> Result<Arc<dyn Volume>, CommandError> {
        let volume = self.resolve(hash, ErrorKind::TrgDirNotFound)?;
        volume
            .dir(hash)
            .await
            .map_err(|_| fatal(ErrorKind::TrgDirNotFound, hash))?;
        Ok(volume)
    }
}

fn fatal(kind: ErrorKind, subject: &str) -> CommandError {
    CommandError::new(ErrorList::new(kind).with(subject))
}

/// Append the backend cause: its own error kind when it has one, else its
/// message.
fn with_cause(mut errors: ErrorList, err: &VolumeError) -> ErrorList {
    match err.kind() {
        Some(kind) => errors.push_kind(kind),
        None => errors.push_context(err.to_string()),
    }
    errors
}

fn failure(kind: ErrorKind, subject: &str, err: &VolumeError) -> CommandError {
    CommandError::new(with_cause(ErrorList::new(kind).with(subject), err))
}

pub(super) async fn run(command: Command, ctx: &Ctx<'_>) -> HandlerResult {
    match command {
        Command::Open => open(ctx).await,
        Command::Ls => ls(ctx).await,
        Command::Tree => tree(ctx).await,
        Command::Parents => parents(ctx).await,
        Command::Tmb => tmb(ctx).await,
        Command::File => file(ctx).await,
        Command::Size => size(ctx).await,
        Command::Mkdir => create(ctx, true).await,
        Command::Mkfile => create(ctx, false).await,
        Command::Rm => rm(ctx).await,
        Command::Rename => rename(ctx).await,
        Command::Duplicate => duplicate(ctx).await,
        Command::Paste => paste(ctx).await,
        Command::Upload => upload(ctx).await,
        Command::Get => get(ctx).await,
        Command::Put => put(ctx).await,
        Command::Archive => archive(ctx).await,
        Command::Extract => extract(ctx).await,
        Command::Search => search(ctx).await,
        Command::Info => info(ctx).await,
        Command::Dim => dim(ctx).await,
        Command::Resize => resize(ctx).await,
        Command::Netmount => Err(CommandError::new(ErrorKind::UnknownCmd)),
    }
}

// ============================================================================
// Reading
// ============================================================================

async fn open(ctx: &Ctx<'_>) -> HandlerResult {
    let init = ctx.args.flag("init");
    let requested = ctx.args.string_or_empty("target");

    let mut resolved = ctx
        .registry
        .resolve(&requested)
        .map(|volume| (volume, requested.clone()));
    if init {
        let usable = match &resolved {
            Some((volume, hash)) => volume.dir(hash).await.is_ok_and(|dir| dir.read),
            None => false,
        };
        if !usable {
            let volume = ctx
                .registry
                .default_volume()
                .ok_or_else(|| fatal(ErrorKind::Open, &requested))?;
            let hash = volume.default_path();
            tracing::debug!(requested = %requested, fallback = %hash, "opening default volume");
            resolved = Some((volume, hash));
        }
    }
    let (volume, target) = resolved.ok_or_else(|| fatal(ErrorKind::Open, &requested))?;

    let cwd = volume.dir(&target).await.map_err(|err| match err {
        VolumeError::NotADirectory(_) => fatal(ErrorKind::DirNotFound, &target),
        _ => fatal(ErrorKind::Open, &target),
    })?;
    if !cwd.read {
        return Err(fatal(ErrorKind::PermDenied, &target));
    }

    let mut files: IndexMap<String, FileNode> = IndexMap::new();
    for node in volume
        .scan_dir(&target)
        .await
        .map_err(|err| failure(ErrorKind::Open, &target, &err))?
    {
        files.insert(node.hash.clone(), node);
    }
    if ctx.args.flag("tree") {
        for (id, other) in ctx.registry.all() {
            match other.tree(&other.root()).await {
                Ok(nodes) => {
                    for node in nodes {
                        files.entry(node.hash.clone()).or_insert(node);
                    }
                }
                Err(err) => tracing::warn!(volume = %id, error = %err, "tree failed"),
            }
        }
    }
    files
        .entry(cwd.hash.clone())
        .or_insert_with(|| cwd.clone());

    let mut response = Response {
        options: Some(volume.options(&target)),
        cwd: Some(cwd),
        files: Some(files.into_values().collect()),
        ..Response::new()
    };
    if init {
        response.api = Some(API_VERSION.to_string());
        response.upl_max_size = Some(ctx.config.upload_max_size.to_string());
        response.net_drivers = Some(Vec::new());
    }
    Ok(response)
}

async fn ls(ctx: &Ctx<'_>) -> HandlerResult {
    let target = ctx.args.string_or_empty("target");
    let volume = ctx.resolve(&target, ErrorKind::Open)?;
    let files = volume
        .scan_dir(&target)
        .await
        .map_err(|err| failure(ErrorKind::Open, &target, &err))?;
    Ok(Response {
        files: Some(files),
        ..Response::new()
    })
}

async fn tree(ctx: &Ctx<'_>) -> HandlerResult {
    let target = ctx.args.string_or_empty("target");
    let volume = ctx.resolve(&target, ErrorKind::Open)?;
    let files = volume
        .tree(&target)
        .await
        .map_err(|err| failure(ErrorKind::Open, &target, &err))?;
    Ok(Response {
        files: Some(files),
        ..Response::new()
    })
}

async fn parents(ctx: &Ctx<'_>) -> HandlerResult {
    let target = ctx.args.string_or_empty("target");
    let volume = ctx.resolve(&target, ErrorKind::Open)?;
    let files = volume
        .parents(&target)
        .await
        .map_err(|err| failure(ErrorKind::Open, &target, &err))?;
    Ok(Response {
        files: Some(files),
        ..Response::new()
    })
}

async fn tmb(ctx: &Ctx<'_>) -> HandlerResult {
    let mut batch = Batch::new();
    for hash in ctx.args.list("targets") {
        let Some(volume) = ctx.registry.resolve(&hash) else {
            batch.not_found(&hash);
            continue;
        };
        match volume.tmb(&hash).await {
            Ok(name) => batch.ok((hash, name)),
            Err(err) => batch.failed(err.kind().unwrap_or(ErrorKind::Unknown), &hash, &err),
        }
    }
    let (images, warning) = batch.into_parts();
    Ok(Response {
        images: Some(images.into_iter().collect::<BTreeMap<_, _>>()),
        warning,
        ..Response::new()
    })
}

/// Raw file answer. Never fails: problems are HTTP-style statuses.
async fn file(ctx: &Ctx<'_>) -> HandlerResult {
    let target = ctx.args.list("targets").into_iter().next().unwrap_or_default();
    let raw = match ctx.registry.resolve(&target) {
        None => RawFile::status(404),
        Some(volume) => match volume.open(&target).await {
            Ok(stream) => {
                let disposition = if ctx.args.flag("download") {
                    "attachment"
                } else {
                    "inline"
                };
                RawFile {
                    status: 200,
                    headers: vec![
                        ("Content-Type".to_string(), stream.mime),
                        ("Content-Length".to_string(), stream.size.to_string()),
                        (
                            "Content-Disposition".to_string(),
                            format!("{disposition}; filename=\"{}\"", stream.name),
                        ),
                    ],
                    body: stream.content,
                }
            }
            Err(VolumeError::PermissionDenied(_)) => RawFile::status(403),
            Err(_) => RawFile::status(404),
        },
    };
    Ok(Response {
        file: Some(raw),
        ..Response::new()
    })
}

async fn size(ctx: &Ctx<'_>) -> HandlerResult {
    let mut batch = Batch::new();
    for hash in ctx.args.list("targets") {
        let Some(volume) = ctx.registry.resolve(&hash) else {
            batch.not_found(&hash);
            continue;
        };
        match volume.size(&hash).await {
            Ok(bytes) => batch.ok(bytes),
            Err(err) => batch.failed(err.kind().unwrap_or(ErrorKind::Unknown), &hash, &err),
        }
    }
    let (sizes, warning) = batch.into_parts();
    Ok(Response {
        size: Some(sizes.iter().sum()),
        warning,
        ..Response::new()
    })
}

async fn get(ctx: &Ctx<'_>) -> HandlerResult {
    let target = ctx.args.string_or_empty("target");
    let volume = ctx.resolve(&target, ErrorKind::Open)?;
    let bytes = volume
        .get_contents(&target)
        .await
        .map_err(|err| failure(ErrorKind::Open, &target, &err))?;
    Ok(Response {
        content: Some(String::from_utf8_lossy(&bytes).into_owned()),
        ..Response::new()
    })
}

async fn search(ctx: &Ctx<'_>) -> HandlerResult {
    let query = ctx.args.string_or_empty("q");
    let mimes = ctx.args.list("mimes");
    let mut batch = Batch::new();
    for (id, volume) in ctx.registry.all() {
        match volume.search(&query, &mimes).await {
            Ok(nodes) => nodes.into_iter().for_each(|node| batch.ok(node)),
            Err(err) => batch.failed(err.kind().unwrap_or(ErrorKind::Unknown), id, &err),
        }
    }
    let (files, warning) = batch.into_parts();
    Ok(Response {
        files: Some(files),
        warning,
        ..Response::new()
    })
}

/// Nodes for each target. Targets that do not resolve are skipped.
async fn info(ctx: &Ctx<'_>) -> HandlerResult {
    let mut files = Vec::new();
    for hash in ctx.args.list("targets") {
        if let Some(volume) = ctx.registry.resolve(&hash) {
            if let Ok(node) = volume.file(&hash).await {
                files.push(node);
            }
        }
    }
    Ok(Response {
        files: Some(files),
        ..Response::new()
    })
}

async fn dim(ctx: &Ctx<'_>) -> HandlerResult {
    let target = ctx.args.string_or_empty("target");
    let volume = ctx.resolve(&target, ErrorKind::Open)?;
    let dim = volume
        .dimensions(&target)
        .await
        .map_err(|err| failure(ErrorKind::Open, &target, &err))?;
    Ok(Response {
        dim: Some(dim),
        ..Response::new()
    })
}

// ============================================================================
// Writing
// ============================================================================

async fn create(ctx: &Ctx<'_>, directory: bool) -> HandlerResult {
    let target = ctx.args.string_or_empty("target");
    let name = ctx.args.string_or_empty("name");
    let volume = ctx.destination(&target).await?;

    let (kind, result) = if directory {
        (ErrorKind::Mkdir, volume.mkdir(&target, &name).await)
    } else {
        (ErrorKind::Mkfile, volume.mkfile(&target, &name).await)
    };
    let node = result.map_err(|err| failure(kind, &name, &err))?;
    Ok(Response {
        added: vec![node],
        ..Response::new()
    })
}

async fn rm(ctx: &Ctx<'_>) -> HandlerResult {
    let mut batch = Batch::new();
    for hash in ctx.args.list("targets") {
        let Some(volume) = ctx.registry.resolve(&hash) else {
            batch.not_found(&hash);
            continue;
        };
        match volume.rm(&hash).await {
            Ok(node) => batch.ok(node.hash),
            Err(err) => batch.failed(ErrorKind::Rm, &hash, &err),
        }
    }
    let (removed, warning) = batch.into_parts();
    Ok(Response {
        removed,
        warning,
        ..Response::new()
    })
}

async fn rename(ctx: &Ctx<'_>) -> HandlerResult {
    let target = ctx.args.string_or_empty("target");
    let name = ctx.args.string_or_empty("name");
    let volume = ctx.resolve(&target, ErrorKind::Rename)?;
    let node = volume
        .rename(&target, &name)
        .await
        .map_err(|err| failure(ErrorKind::Rename, &target, &err))?;

    let removed = if node.hash == target {
        Vec::new()
    } else {
        vec![target]
    };
    Ok(Response {
        added: vec![node],
        removed,
        ..Response::new()
    })
}

async fn duplicate(ctx: &Ctx<'_>) -> HandlerResult {
    let suffix = ctx.args.string_or_empty("suffix");
    let mut batch = Batch::new();
    for hash in ctx.args.list("targets") {
        let Some(volume) = ctx.registry.resolve(&hash) else {
            batch.not_found(&hash);
            continue;
        };
        match volume.duplicate(&hash, &suffix).await {
            Ok(node) => batch.ok(node),
            Err(err) => batch.failed(ErrorKind::Copy, &hash, &err),
        }
    }
    let (added, warning) = batch.into_parts();
    Ok(Response {
        added,
        warning,
        ..Response::new()
    })
}

async fn paste(ctx: &Ctx<'_>) -> HandlerResult {
    let dst = ctx.args.string_or_empty("dst");
    let cut = ctx.args.flag("cut");
    let destination = ctx.destination(&dst).await?;

    let code = if cut { ErrorKind::Move } else { ErrorKind::Copy };
    let mut removed = Vec::new();
    let mut batch = Batch::new();
    for hash in ctx.args.list("targets") {
        let Some(source) = ctx.registry.resolve(&hash) else {
            batch.not_found(&hash);
            continue;
        };
        match destination.paste(source.as_ref(), &hash, &dst, cut).await {
            Ok(node) => {
                if cut && node.hash != hash {
                    removed.push(hash);
                }
                batch.ok(node);
            }
            Err(err) => batch.failed(code, &hash, &err),
        }
    }
    let (added, warning) = batch.into_parts();
    Ok(Response {
        added,
        removed,
        warning,
        ..Response::new()
    })
}

async fn upload(ctx: &Ctx<'_>) -> HandlerResult {
    let files = ctx.args.uploads();
    if files.is_empty() {
        return Err(CommandError::new(
            ErrorList::new(ErrorKind::Upload).with_kind(ErrorKind::UploadNoFiles),
        ));
    }
    let target = ctx.args.string_or_empty("target");
    let volume = ctx.destination(&target).await?;

    let limit = ctx.config.upload_max_size;
    let mut batch = Batch::new();
    for file in files {
        let file = match file {
            Ok(file) => file,
            Err(name) => {
                batch.warn(
                    Warning::new(ErrorKind::UploadTransfer, name)
                        .with_detail("payload could not be decoded"),
                );
                continue;
            }
        };
        if limit > 0 && file.size() > limit {
            batch.warn(
                Warning::new(ErrorKind::UploadTransfer, &file.name)
                    .with_detail(format!("exceeds the upload limit of {limit} bytes")),
            );
            continue;
        }
        match volume.upload(&file, &target).await {
            Ok(node) => batch.ok(node),
            Err(err) => batch.failed(ErrorKind::UploadTransfer, &file.name, &err),
        }
    }
    let (added, warning) = batch.into_parts();
    Ok(Response {
        added,
        warning,
        ..Response::new()
    })
}

async fn put(ctx: &Ctx<'_>) -> HandlerResult {
    let target = ctx.args.string_or_empty("target");
    let content = ctx.args.string_or_empty("content");
    let volume = ctx.resolve(&target, ErrorKind::FileNotFound)?;
    let node = volume
        .put_contents(&target, content.as_bytes())
        .await
        .map_err(|err| failure(ErrorKind::Save, &target, &err))?;
    Ok(Response {
        changed: vec![node],
        ..Response::new()
    })
}

async fn archive(ctx: &Ctx<'_>) -> HandlerResult {
    let targets = ctx.args.list("targets");
    let mime = ctx.args.string_or_empty("type");
    let missing = || CommandError::new(ErrorList::new(ErrorKind::Archive).with_kind(ErrorKind::FileNotFound));

    let first = targets.first().ok_or_else(missing)?;
    let volume = ctx.registry.resolve(first).ok_or_else(missing)?;
    let node = volume
        .archive(&targets, &mime)
        .await
        .map_err(|err| CommandError::new(with_cause(ErrorList::new(ErrorKind::Archive), &err)))?;
    Ok(Response {
        added: vec![node],
        ..Response::new()
    })
}

async fn extract(ctx: &Ctx<'_>) -> HandlerResult {
    let target = ctx.args.string_or_empty("target");
    let volume = ctx.resolve(&target, ErrorKind::Extract)?;
    let added = volume
        .extract(&target)
        .await
        .map_err(|err| failure(ErrorKind::Extract, &target, &err))?;
    Ok(Response {
        added,
        ..Response::new()
    })
}

async fn resize(ctx: &Ctx<'_>) -> HandlerResult {
    let target = ctx.args.string_or_empty("target");
    let volume = ctx.resolve(&target, ErrorKind::Resize)?;

    let dimension = |key: &str| {
        ctx.args
            .number(key)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    };
    let request = ResizeRequest {
        width: dimension("width"),
        height: dimension("height"),
        x: dimension("x"),
        y: dimension("y"),
        mode: ResizeMode::parse(&ctx.args.string_or_empty("mode")),
        bg: ctx.args.string("bg"),
        degree: ctx
            .args
            .number("degree")
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or(0),
    };
    let node = volume
        .resize(&target, &request)
        .await
        .map_err(|err| failure(ErrorKind::Resize, &target, &err))?;
    Ok(Response {
        changed: vec![node],
        ..Response::new()
    })
}
