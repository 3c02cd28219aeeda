#[path = "../src/backup.rs"]
mod backup;

use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("marksheet-backup-src");
    let workspace2 = temp_dir("marksheet-backup-dst");
    let out_dir = temp_dir("marksheet-backup-out");

    let db_src = workspace.join("marksheet.sqlite3");
    let bytes = b"sqlite-test-payload";
    std::fs::write(&db_src, bytes).expect("write source db");

    let bundle_path = out_dir.join("workspace.msbackup.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 3);
    assert_eq!(export.db_sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT_V1));
    assert!(manifest.contains(&export.db_sha256));
    archive
        .by_name("db/marksheet.sqlite3")
        .expect("database entry in bundle");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);
    assert!(import.checksum_verified);

    let db_dst = workspace2.join("marksheet.sqlite3");
    let restored = std::fs::read(&db_dst).expect("read restored db");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn legacy_sqlite_import_is_supported() {
    let out_dir = temp_dir("marksheet-backup-legacy");
    let workspace = temp_dir("marksheet-backup-legacy-dst");

    let legacy_file = out_dir.join("legacy.sqlite3");
    let bytes = b"legacy-sqlite-copy";
    std::fs::write(&legacy_file, bytes).expect("write legacy sqlite file");

    let import =
        backup::import_workspace_bundle(&legacy_file, &workspace).expect("import legacy sqlite");
    assert_eq!(import.bundle_format_detected, "legacy-sqlite3");
    assert!(!import.checksum_verified);

    let restored =
        std::fs::read(workspace.join("marksheet.sqlite3")).expect("read restored sqlite");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

fn write_bundle(path: &std::path::Path, manifest: serde_json::Value, db_bytes: &[u8]) {
    let f = File::create(path).expect("create bundle");
    let mut zip = zip::ZipWriter::new(f);
    let opts = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    zip.start_file("manifest.json", opts).expect("start manifest");
    zip.write_all(manifest.to_string().as_bytes())
        .expect("write manifest");
    zip.start_file("db/marksheet.sqlite3", opts)
        .expect("start db entry");
    zip.write_all(db_bytes).expect("write db entry");
    zip.finish().expect("finish bundle");
}

#[test]
fn checksum_mismatch_rejects_bundle() {
    let out_dir = temp_dir("marksheet-backup-badsum");
    let workspace = temp_dir("marksheet-backup-badsum-dst");

    let bundle_path = out_dir.join("tampered.msbackup.zip");
    write_bundle(
        &bundle_path,
        json!({
            "format": backup::BUNDLE_FORMAT_V1,
            "version": 1,
            "dbSha256": "0".repeat(64),
        }),
        b"payload-that-does-not-match",
    );

    let err = backup::import_workspace_bundle(&bundle_path, &workspace)
        .expect_err("tampered bundle must be rejected");
    assert!(
        err.to_string().contains("checksum mismatch"),
        "unexpected error: {}",
        err
    );
    assert!(
        !workspace.join("marksheet.sqlite3").exists(),
        "rejected bundle must not leave a database behind"
    );
    assert!(
        !workspace.join("marksheet.sqlite3.importing").exists(),
        "temp extraction file must be cleaned up"
    );

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_bundle_format_is_rejected() {
    let out_dir = temp_dir("marksheet-backup-badfmt");
    let workspace = temp_dir("marksheet-backup-badfmt-dst");

    let bundle_path = out_dir.join("foreign.zip");
    write_bundle(
        &bundle_path,
        json!({ "format": "some-other-tool-v9" }),
        b"whatever",
    );

    let err = backup::import_workspace_bundle(&bundle_path, &workspace)
        .expect_err("foreign bundle must be rejected");
    assert!(
        err.to_string().contains("unsupported bundle format"),
        "unexpected error: {}",
        err
    );

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}
