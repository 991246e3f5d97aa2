use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const SNAPSHOT_ENTRY: &str = "snapshot.json";
pub const BUNDLE_FORMAT: &str = "studio-backup-v1";
pub const PLAIN_FORMAT: &str = "plain-json";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportedBackup {
    pub text: String,
    pub bundle_format_detected: String,
}

pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn ensure_parent(out_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    Ok(())
}

/// Writes a snapshot document either as the bare JSON file or as a zip
/// bundle carrying a manifest with the snapshot's checksum.
pub fn write_backup(snapshot_json: &str, out_path: &Path, bundle: bool) -> anyhow::Result<ExportSummary> {
    ensure_parent(out_path)?;
    let sha256 = sha256_hex(snapshot_json.as_bytes());

    if !bundle {
        std::fs::write(out_path, snapshot_json).with_context(|| {
            format!("failed to write backup {}", out_path.to_string_lossy())
        })?;
        return Ok(ExportSummary {
            bundle_format: PLAIN_FORMAT.to_string(),
            bytes: snapshot_json.len() as u64,
            sha256,
        });
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "sha256": sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(SNAPSHOT_ENTRY, opts)
        .context("failed to start snapshot entry")?;
    zip.write_all(snapshot_json.as_bytes())
        .context("failed to write snapshot entry")?;

    let file = zip.finish().context("failed to finalize zip bundle")?;
    let bytes = file.metadata().map(|m| m.len()).unwrap_or_default();

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        bytes,
        sha256,
    })
}

/// Reads a backup written by `write_backup`. Anything without a zip
/// signature is taken to be the bare JSON document.
pub fn read_backup(in_path: &Path) -> anyhow::Result<ImportedBackup> {
    if !is_zip_file(in_path)? {
        let text = std::fs::read_to_string(in_path)
            .with_context(|| format!("failed to read backup {}", in_path.to_string_lossy()))?;
        return Ok(ImportedBackup {
            text,
            bundle_format_detected: PLAIN_FORMAT.to_string(),
        });
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut text = String::new();
    archive
        .by_name(SNAPSHOT_ENTRY)
        .context("bundle missing snapshot.json")?
        .read_to_string(&mut text)
        .context("failed to read snapshot.json")?;

    if let Some(expected) = manifest.get("sha256").and_then(|v| v.as_str()) {
        let actual = sha256_hex(text.as_bytes());
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(anyhow!(
                "snapshot checksum mismatch: manifest {}, contents {}",
                expected,
                actual
            ));
        }
    }

    Ok(ImportedBackup {
        text,
        bundle_format_detected: BUNDLE_FORMAT.to_string(),
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
