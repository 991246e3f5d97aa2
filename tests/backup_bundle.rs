#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::ZipWriter;

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

const SNAPSHOT: &str = r#"{"students":[{"id":"stu_1","name":"Ananya"}],"schedule":[]}"#;

fn write_raw_bundle(path: &PathBuf, manifest: &str, snapshot: &str) {
    let f = File::create(path).expect("create bundle");
    let mut zip = ZipWriter::new(f);
    zip.start_file("manifest.json", FileOptions::default())
        .expect("start manifest");
    zip.write_all(manifest.as_bytes()).expect("write manifest");
    zip.start_file("snapshot.json", FileOptions::default())
        .expect("start snapshot");
    zip.write_all(snapshot.as_bytes()).expect("write snapshot");
    zip.finish().expect("finish zip");
}

#[test]
fn zip_bundle_roundtrip_keeps_snapshot_text() {
    let out_dir = temp_dir("studiod-backup-bundle");
    let bundle_path = out_dir.join("nested").join("studio.zip");

    let export = backup::write_backup(SNAPSHOT, &bundle_path, true).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT);
    assert_eq!(export.sha256, backup::sha256_hex(SNAPSHOT.as_bytes()));
    assert!(export.bytes > 0);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT));
    assert!(manifest.contains(&export.sha256));

    let imported = backup::read_backup(&bundle_path).expect("import bundle");
    assert_eq!(imported.bundle_format_detected, backup::BUNDLE_FORMAT);
    assert_eq!(imported.text, SNAPSHOT);

    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn plain_json_is_detected_without_zip_signature() {
    let out_dir = temp_dir("studiod-backup-plain");
    let path = out_dir.join("studio.json");

    let export = backup::write_backup(SNAPSHOT, &path, false).expect("export plain");
    assert_eq!(export.bundle_format, backup::PLAIN_FORMAT);
    assert_eq!(std::fs::read_to_string(&path).expect("read back"), SNAPSHOT);

    let imported = backup::read_backup(&path).expect("import plain");
    assert_eq!(imported.bundle_format_detected, backup::PLAIN_FORMAT);
    assert_eq!(imported.text, SNAPSHOT);

    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn tampered_or_foreign_bundles_are_rejected() {
    let out_dir = temp_dir("studiod-backup-tampered");

    let tampered = out_dir.join("tampered.zip");
    let manifest = format!(
        r#"{{"format":"{}","version":1,"sha256":"{}"}}"#,
        backup::BUNDLE_FORMAT,
        backup::sha256_hex(b"something else")
    );
    write_raw_bundle(&tampered, &manifest, SNAPSHOT);
    let err = backup::read_backup(&tampered).expect_err("checksum mismatch");
    assert!(err.to_string().contains("checksum"));

    let foreign = out_dir.join("foreign.zip");
    write_raw_bundle(&foreign, r#"{"format":"other-app-v2"}"#, SNAPSHOT);
    let err = backup::read_backup(&foreign).expect_err("unsupported format");
    assert!(err.to_string().contains("unsupported bundle format"));

    // Bundles without a checksum are accepted as long as the format matches.
    let unsigned = out_dir.join("unsigned.zip");
    write_raw_bundle(
        &unsigned,
        &format!(r#"{{"format":"{}"}}"#, backup::BUNDLE_FORMAT),
        SNAPSHOT,
    );
    assert_eq!(backup::read_backup(&unsigned).expect("unsigned").text, SNAPSHOT);

    let _ = std::fs::remove_dir_all(out_dir);
}
