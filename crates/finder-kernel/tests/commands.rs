//! Per-command behavior through the connector.

mod common;

use serde_json::json;

use common::{HOME, SCRATCH, args, connector, hash};
use finder_kernel::types::ErrorKind;
use finder_kernel::{Connector, ConnectorConfig, RootConfig};

fn names(files: &[finder_kernel::types::FileNode]) -> Vec<&str> {
    files.iter().map(|f| f.name.as_str()).collect()
}

// ============================================================================
// open / ls / tree / parents
// ============================================================================

#[tokio::test]
async fn test_open_init_falls_back_to_default_volume() {
    let connector = connector().await;
    let response = connector
        .exec("open", args(json!({"init": 1, "target": ""})))
        .await
        .unwrap();

    let cwd = response.cwd.expect("cwd");
    assert_eq!(cwd.hash, hash(HOME, "/"));
    assert!(cwd.isroot);
    assert_eq!(cwd.volumeid.as_deref(), Some(HOME));
    assert_eq!(response.api.as_deref(), Some("2.1"));
    assert_eq!(response.upl_max_size.as_deref(), Some("0"));
    assert_eq!(response.net_drivers, Some(Vec::new()));
    assert_eq!(response.options.unwrap().path, "Home");

    let files = response.files.unwrap();
    assert_eq!(files.len(), 4);
    assert!(files.iter().any(|f| f.hash == cwd.hash));
}

#[tokio::test]
async fn test_open_without_init_needs_a_valid_target() {
    let connector = connector().await;
    let err = connector
        .exec("open", args(json!({"target": "m1_bm9wZQ"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Open));
}

#[tokio::test]
async fn test_open_tree_spans_volumes() {
    let connector = connector().await;
    let response = connector
        .exec(
            "open",
            args(json!({"init": true, "tree": true, "target": hash(HOME, "/docs")})),
        )
        .await
        .unwrap();

    let files = response.files.unwrap();
    assert_eq!(response.cwd.unwrap().name, "docs");
    assert!(files.iter().any(|f| f.hash == hash(SCRATCH, "/")));
    assert!(files.iter().any(|f| f.hash == hash(SCRATCH, "/inbox")));
    assert!(files.iter().any(|f| f.hash == hash(HOME, "/photos")));

    let mut hashes: Vec<_> = files.iter().map(|f| f.hash.clone()).collect();
    hashes.sort();
    hashes.dedup();
    assert_eq!(hashes.len(), files.len());
}

#[tokio::test]
async fn test_open_file_is_not_a_folder() {
    let connector = connector().await;
    let target = hash(HOME, "/docs/readme.txt");
    let err = connector
        .exec("open", args(json!({"target": target})))
        .await
        .unwrap_err();
    assert_eq!(err.errors.to_strings(), vec!["errFolderNotFound".to_string(), target]);
}

#[tokio::test]
async fn test_open_unreadable_root() {
    let config = ConnectorConfig::default()
        .with_root(RootConfig::new("Test").with_permissions(false, true).with_seed(["a/"]));
    let connector = Connector::open(config).await;
    assert!(connector.registry().default_volume().is_none());

    let root = hash(HOME, "/");
    let err = connector
        .exec("open", args(json!({"target": root})))
        .await
        .unwrap_err();
    assert_eq!(err.errors.to_strings(), vec!["errPerm".to_string(), root]);

    let err = connector
        .exec("open", args(json!({"init": 1})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Open));
}

#[tokio::test]
async fn test_ls_hides_thumbnail_dir() {
    let config = ConnectorConfig::default()
        .with_root(RootConfig::new("Test").with_seed([".tmb/", "a.txt"]));
    let connector = Connector::open(config).await;
    let response = connector
        .exec("ls", args(json!({"target": hash(HOME, "/")})))
        .await
        .unwrap();
    assert_eq!(names(&response.files.unwrap()), ["a.txt"]);
}

#[tokio::test]
async fn test_tree_and_parents() {
    let connector = connector().await;
    let response = connector
        .exec("tree", args(json!({"target": hash(HOME, "/")})))
        .await
        .unwrap();
    // Root plus docs, empty and photos.
    assert_eq!(response.files.unwrap().len(), 4);

    let response = connector
        .exec("parents", args(json!({"target": hash(HOME, "/docs/readme.txt")})))
        .await
        .unwrap();
    let files = response.files.unwrap();
    assert!(files.iter().any(|f| f.isroot));
    assert!(files.iter().all(|f| f.is_dir()));

    let err = connector
        .exec("tree", args(json!({"target": hash(HOME, "/missing")})))
        .await
        .unwrap_err();
    assert_eq!(err.errors.primary(), Some(ErrorKind::Open));
    assert!(err.errors.contains_kind(ErrorKind::FileNotFound));
}

// ============================================================================
// file / get / put / size / info / dim / tmb
// ============================================================================

#[tokio::test]
async fn test_file_streams_content() {
    let connector = connector().await;
    let target = hash(HOME, "/docs/readme.txt");

    let response = connector
        .exec("file", args(json!({"targets": [target]})))
        .await
        .unwrap();
    let file = response.file.unwrap();
    assert_eq!(file.status, 200);
    assert_eq!(file.body, b"hello");
    assert_eq!(file.header("content-type"), Some("text/plain"));
    assert_eq!(file.header("Content-Length"), Some("5"));
    assert_eq!(
        file.header("Content-Disposition"),
        Some("inline; filename=\"readme.txt\"")
    );

    let response = connector
        .exec("file", args(json!({"targets": [target], "download": "1"})))
        .await
        .unwrap();
    assert!(
        response
            .file
            .unwrap()
            .header("Content-Disposition")
            .unwrap()
            .starts_with("attachment")
    );
}

#[tokio::test]
async fn test_file_missing_is_404() {
    let connector = connector().await;
    for target in [hash(HOME, "/nope.txt"), "zz9_bm9wZQ".to_string()] {
        let response = connector
            .exec("file", args(json!({"targets": [target]})))
            .await
            .unwrap();
        let file = response.file.unwrap();
        assert_eq!(file.status, 404);
        assert!(file.body.is_empty());
    }
}

#[tokio::test]
async fn test_put_then_get() {
    let connector = connector().await;
    let target = hash(HOME, "/docs/notes.md");

    let response = connector
        .exec("put", args(json!({"target": target, "content": "bye"})))
        .await
        .unwrap();
    assert_eq!(response.changed[0].size, 3);

    let response = connector
        .exec("get", args(json!({"target": target})))
        .await
        .unwrap();
    assert_eq!(response.content.as_deref(), Some("bye"));

    let err = connector
        .exec("put", args(json!({"target": "zz9_bm9wZQ", "content": "x"})))
        .await
        .unwrap_err();
    assert_eq!(err.errors.to_strings(), vec!["errFileNotFound", "zz9_bm9wZQ"]);

    let docs = hash(HOME, "/docs");
    let err = connector
        .exec("put", args(json!({"target": docs, "content": "x"})))
        .await
        .unwrap_err();
    assert_eq!(err.errors.primary(), Some(ErrorKind::Save));
    assert!(err.errors.mentions(&docs));
}

#[tokio::test]
async fn test_size_sums_and_warns() {
    let connector = connector().await;
    let response = connector
        .exec(
            "size",
            args(json!({"targets": [hash(HOME, "/docs"), "zz9_bm9wZQ"]})),
        )
        .await
        .unwrap();
    // "hello" + "# notes"
    assert_eq!(response.size, Some(12));
    assert_eq!(response.warning.len(), 1);
}

#[tokio::test]
async fn test_info_skips_unknown_targets() {
    let connector = connector().await;
    let response = connector
        .exec(
            "info",
            args(json!({"targets": [hash(HOME, "/docs/readme.txt"), "zz9_bm9wZQ", hash(HOME, "/gone")]})),
        )
        .await
        .unwrap();
    let files = response.files.unwrap();
    assert_eq!(names(&files), ["readme.txt"]);
    assert!(response.warning.is_empty());
}

#[tokio::test]
async fn test_tmb_only_for_images() {
    let connector = connector().await;
    let cat = hash(HOME, "/photos/cat.png");
    let readme = hash(HOME, "/docs/readme.txt");
    let response = connector
        .exec("tmb", args(json!({"targets": [cat.clone(), readme.clone()]})))
        .await
        .unwrap();

    let images = response.images.unwrap();
    assert_eq!(images.get(&cat), Some(&format!("{cat}.png")));
    assert!(!images.contains_key(&readme));
    assert_eq!(response.warning.len(), 1);
    assert_eq!(response.warning[0].hash, readme);
}

#[tokio::test]
async fn test_dim_and_resize() {
    let connector = connector().await;
    let cat = hash(HOME, "/photos/cat.png");

    let response = connector.exec("dim", args(json!({"target": cat}))).await.unwrap();
    assert_eq!(response.dim.as_deref(), Some("0x0"));

    let response = connector
        .exec(
            "resize",
            args(json!({"target": cat, "mode": "resize", "width": 64, "height": "32"})),
        )
        .await
        .unwrap();
    assert_eq!(response.changed[0].dim.as_deref(), Some("64x32"));

    connector
        .exec("resize", args(json!({"target": cat, "mode": "rotate", "degree": 90})))
        .await
        .unwrap();
    let response = connector.exec("dim", args(json!({"target": cat}))).await.unwrap();
    assert_eq!(response.dim.as_deref(), Some("32x64"));

    let readme = hash(HOME, "/docs/readme.txt");
    let err = connector
        .exec("resize", args(json!({"target": readme, "width": 1, "height": 1})))
        .await
        .unwrap_err();
    assert_eq!(err.errors.primary(), Some(ErrorKind::Resize));
}

// ============================================================================
// mkdir / mkfile / rename / duplicate
// ============================================================================

#[tokio::test]
async fn test_mkdir_conflict_and_bad_destination() {
    let connector = connector().await;
    let err = connector
        .exec("mkdir", args(json!({"target": hash(HOME, "/"), "name": "docs"})))
        .await
        .unwrap_err();
    assert_eq!(
        err.errors.to_strings(),
        vec!["errMkdir", "docs", "already exists: docs"]
    );

    let file = hash(HOME, "/docs/readme.txt");
    let err = connector
        .exec("mkfile", args(json!({"target": file, "name": "x.txt"})))
        .await
        .unwrap_err();
    assert_eq!(err.errors.to_strings(), vec!["errTrgFolderNotFound".to_string(), file]);
}

#[tokio::test]
async fn test_mkfile_adds_node() {
    let connector = connector().await;
    let response = connector
        .exec("mkfile", args(json!({"target": hash(HOME, "/empty"), "name": "new.txt"})))
        .await
        .unwrap();
    let node = &response.added[0];
    assert_eq!(node.hash, hash(HOME, "/empty/new.txt"));
    assert_eq!(node.phash.as_deref(), Some(hash(HOME, "/empty").as_str()));
    assert_eq!(node.mime, "text/plain");
    assert_eq!(node.size, 0);
}

#[tokio::test]
async fn test_rename_reports_old_hash_removed() {
    let connector = connector().await;
    let old = hash(HOME, "/docs/readme.txt");
    let response = connector
        .exec("rename", args(json!({"target": old, "name": "intro.txt"})))
        .await
        .unwrap();

    assert_eq!(response.added[0].hash, hash(HOME, "/docs/intro.txt"));
    assert_eq!(response.removed, vec![old.clone()]);

    let err = connector
        .exec("rename", args(json!({"target": old, "name": "again.txt"})))
        .await
        .unwrap_err();
    assert_eq!(err.errors.primary(), Some(ErrorKind::Rename));
}

#[tokio::test]
async fn test_duplicate_uses_suffix() {
    let connector = connector().await;
    let target = hash(HOME, "/docs/readme.txt");
    let response = connector
        .exec("duplicate", args(json!({"targets": [target.clone(), target]})))
        .await
        .unwrap();
    assert_eq!(
        names(&response.added),
        ["readme copy.txt", "readme copy 1.txt"]
    );
}

// ============================================================================
// paste / upload
// ============================================================================

#[tokio::test]
async fn test_paste_copy_within_volume() {
    let connector = connector().await;
    let response = connector
        .exec(
            "paste",
            args(json!({"dst": hash(HOME, "/empty"), "targets": [hash(HOME, "/docs/readme.txt")]})),
        )
        .await
        .unwrap();
    assert_eq!(response.added[0].hash, hash(HOME, "/empty/readme.txt"));
    assert!(response.removed.is_empty());
}

#[tokio::test]
async fn test_cut_across_volumes() {
    let connector = connector().await;
    let docs = hash(HOME, "/docs");
    let response = connector
        .exec(
            "paste",
            args(json!({"dst": hash(SCRATCH, "/inbox"), "targets": [docs.clone()], "cut": "1"})),
        )
        .await
        .unwrap();

    assert_eq!(response.added[0].hash, hash(SCRATCH, "/inbox/docs"));
    assert_eq!(response.removed[0], docs);
    assert!(response.removed.contains(&hash(HOME, "/docs/readme.txt")));

    let response = connector
        .exec("ls", args(json!({"target": hash(SCRATCH, "/inbox/docs")})))
        .await
        .unwrap();
    assert_eq!(response.files.unwrap().len(), 2);

    let response = connector
        .exec("get", args(json!({"target": hash(SCRATCH, "/inbox/docs/readme.txt")})))
        .await
        .unwrap();
    assert_eq!(response.content.as_deref(), Some("hello"));
}

#[tokio::test]
async fn test_paste_skips_unresolvable_source() {
    let connector = connector().await;
    let bogus = "zz9_bm9wZQ";
    let response = connector
        .exec(
            "paste",
            args(json!({
                "dst": hash(HOME, "/empty"),
                "targets": [hash(HOME, "/docs/readme.txt"), bogus],
            })),
        )
        .await
        .unwrap();

    assert_eq!(names(&response.added), vec!["readme.txt"]);
    assert_eq!(response.added[0].hash, hash(HOME, "/empty/readme.txt"));
    assert_eq!(response.warning.len(), 1);
    assert_eq!(response.warning[0].code, ErrorKind::FileNotFound);
    assert_eq!(response.warning[0].hash, bogus);
}

#[tokio::test]
async fn test_cut_across_volumes_keeps_filtered_children() {
    let mut home = RootConfig::new("Test").with_alias("Home").with_seed([
        "docs/readme.txt=hello",
        "docs/cat.png=meow",
        "docs/secret.txt=shh",
    ]);
    home.hidden = vec!["secret.txt".into()];
    let config = ConnectorConfig::default()
        .with_root(home)
        .with_root(RootConfig::new("Memory").with_alias("Scratch").with_seed(["inbox/"]));
    let connector = Connector::open(config).await;

    let docs = hash(HOME, "/docs");
    let response = connector
        .exec(
            "paste",
            args(json!({
                "dst": hash(SCRATCH, "/inbox"),
                "targets": [docs.clone()],
                "cut": true,
                "mimes": ["image"],
            })),
        )
        .await
        .unwrap();
    assert!(response.warning.is_empty());
    assert_eq!(response.added[0].hash, hash(SCRATCH, "/inbox/docs"));
    assert!(response.removed.contains(&docs));

    for (name, content) in [("readme.txt", "hello"), ("cat.png", "meow"), ("secret.txt", "shh")] {
        let response = connector
            .exec("get", args(json!({"target": hash(SCRATCH, &format!("/inbox/docs/{name}"))})))
            .await
            .unwrap();
        assert_eq!(response.content.as_deref(), Some(content), "{name}");
    }

    let response = connector
        .exec("ls", args(json!({"target": hash(SCRATCH, "/inbox/docs"), "mimes": []})))
        .await
        .unwrap();
    assert_eq!(response.files.unwrap().len(), 3);
}

#[tokio::test]
async fn test_paste_into_missing_destination() {
    let connector = connector().await;
    let dst = hash(HOME, "/missing");
    let err = connector
        .exec(
            "paste",
            args(json!({"dst": dst, "targets": [hash(HOME, "/docs")]})),
        )
        .await
        .unwrap_err();
    assert_eq!(err.errors.to_strings(), vec!["errTrgFolderNotFound".to_string(), dst]);
}

#[tokio::test]
async fn test_upload_decodes_files() {
    let connector = connector().await;
    let inbox = hash(SCRATCH, "/inbox");
    let response = connector
        .exec(
            "upload",
            args(json!({
                "target": inbox,
                "FILES": [
                    {"name": "a.txt", "content": "plain"},
                    {"name": "b.txt", "content": "aGk=", "encoding": "base64"},
                    {"name": "c.txt", "content": "***", "encoding": "base64"},
                ],
            })),
        )
        .await
        .unwrap();

    assert_eq!(names(&response.added), ["a.txt", "b.txt"]);
    assert_eq!(response.warning.len(), 1);
    assert_eq!(response.warning[0].code, ErrorKind::UploadTransfer);
    assert_eq!(response.warning[0].hash, "c.txt");

    let response = connector
        .exec("get", args(json!({"target": hash(SCRATCH, "/inbox/b.txt")})))
        .await
        .unwrap();
    assert_eq!(response.content.as_deref(), Some("hi"));
}

#[tokio::test]
async fn test_upload_limit() {
    let mut config = common::config();
    config.upload_max_size = 4;
    let connector = Connector::open(config).await;

    let response = connector
        .exec(
            "upload",
            args(json!({
                "target": hash(HOME, "/"),
                "FILES": [{"name": "big.txt", "content": "hello world"}, {"name": "ok.txt", "content": "ok"}],
            })),
        )
        .await
        .unwrap();
    assert_eq!(names(&response.added), ["ok.txt"]);
    assert_eq!(response.warning[0].hash, "big.txt");
}

#[tokio::test]
async fn test_upload_without_files() {
    let connector = connector().await;
    let err = connector
        .exec("upload", args(json!({"target": hash(HOME, "/")})))
        .await
        .unwrap_err();
    assert_eq!(err.errors.to_strings(), vec!["errUpload", "errUploadNoFiles"]);
}

// ============================================================================
// archive / extract / search
// ============================================================================

#[tokio::test]
async fn test_archive_then_extract() {
    let connector = connector().await;
    let response = connector
        .exec(
            "archive",
            args(json!({"targets": [hash(HOME, "/docs")], "type": "application/zip"})),
        )
        .await
        .unwrap();
    let archive = &response.added[0];
    assert_eq!(archive.name, "Archive.zip");
    assert_eq!(archive.mime, "application/zip");

    let response = connector
        .exec("extract", args(json!({"target": archive.hash})))
        .await
        .unwrap();
    let added = names(&response.added);
    assert_eq!(added.len(), 4);
    assert!(added.contains(&"Archive"));
    assert!(response.added.iter().any(|n| n.hash == hash(HOME, "/Archive/docs/notes.md")));
}

#[tokio::test]
async fn test_archive_errors() {
    let connector = connector().await;
    let err = connector
        .exec("archive", args(json!({"targets": [], "type": "application/zip"})))
        .await
        .unwrap_err();
    assert_eq!(err.errors.to_strings(), vec!["errArchive", "errFileNotFound"]);

    let err = connector
        .exec(
            "archive",
            args(json!({"targets": [hash(HOME, "/docs")], "type": "application/x-rar"})),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.errors.to_strings(),
        vec!["errArchive", "unsupported archive type application/x-rar"]
    );

    let readme = hash(HOME, "/docs/readme.txt");
    let err = connector
        .exec("extract", args(json!({"target": readme})))
        .await
        .unwrap_err();
    assert_eq!(err.errors.primary(), Some(ErrorKind::Extract));
    assert!(err.errors.mentions(&readme));
}

#[tokio::test]
async fn test_search_across_volumes() {
    let connector = connector().await;
    connector
        .exec("mkdir", args(json!({"target": hash(SCRATCH, "/"), "name": "Photo backups"})))
        .await
        .unwrap();

    let response = connector.exec("search", args(json!({"q": "phot"}))).await.unwrap();
    let files = response.files.unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|f| f.hash == hash(HOME, "/photos")));
    assert!(files.iter().any(|f| f.hash == hash(SCRATCH, "/Photo backups")));

    let response = connector
        .exec("search", args(json!({"q": ".", "mimes": ["image"]})))
        .await
        .unwrap();
    assert_eq!(names(&response.files.unwrap()), ["cat.png"]);
}

#[tokio::test]
async fn test_netmount_is_unknown() {
    let connector = connector().await;
    let err = connector
        .exec("netmount", args(json!({"protocol": "ftp"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::UnknownCmd));
}
