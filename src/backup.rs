use crate::db::DB_FILE_NAME;
use anyhow::{anyhow, bail, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/alunos.sqlite3";
pub const BUNDLE_FORMAT: &str = "alunos-workspace-v1";
const RAW_SQLITE_FORMAT: &str = "raw-sqlite3";
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
    pub db_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub db_sha256: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Zip the workspace database with a manifest carrying its checksum.
pub fn export_workspace_bundle(workspace: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let db_path = workspace.join(DB_FILE_NAME);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", db_path.display());
    }
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.display()))?;
    let db_sha256 = sha256_hex(&db_bytes);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create output file {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": crate::dates::now_rfc3339(),
        "dbEntry": DB_ENTRY,
        "dbSha256": db_sha256,
        "dbBytes": db_bytes.len(),
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())
        .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;
    zip.finish().context("failed to finalize zip bundle")?;

    log::info!("workspace bundle written to {}", out_path.display());
    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        db_sha256,
        db_bytes: db_bytes.len() as u64,
    })
}

/// Restore a bundle (or a bare SQLite file) into `workspace`. The existing
/// database is replaced only after the extracted copy passes its checksum.
pub fn import_workspace_bundle(in_path: &Path, workspace: &Path) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.display()))?;
    let bytes = std::fs::read(in_path)
        .with_context(|| format!("failed to read {}", in_path.display()))?;

    let (format, db_bytes) = if bytes.starts_with(SQLITE_MAGIC) {
        (RAW_SQLITE_FORMAT.to_string(), bytes)
    } else if bytes.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
        (BUNDLE_FORMAT.to_string(), read_bundle_db(&bytes)?)
    } else {
        bail!("not a workspace bundle or SQLite file: {}", in_path.display());
    };
    let db_sha256 = sha256_hex(&db_bytes);

    let dst = workspace.join(DB_FILE_NAME);
    let tmp = workspace.join(format!("{DB_FILE_NAME}.importing"));
    {
        let mut f = File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        f.write_all(&db_bytes)?;
        f.flush()?;
    }
    for stale in ["-wal", "-shm"] {
        let side = workspace.join(format!("{DB_FILE_NAME}{stale}"));
        if side.exists() {
            std::fs::remove_file(&side)
                .with_context(|| format!("failed to remove {}", side.display()))?;
        }
    }
    std::fs::rename(&tmp, &dst)
        .with_context(|| format!("failed to move extracted database to {}", dst.display()))?;

    log::info!("workspace restored from {} ({format})", in_path.display());
    Ok(ImportSummary {
        bundle_format_detected: format,
        db_sha256,
    })
}

fn read_bundle_db(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut archive =
        ZipArchive::new(std::io::Cursor::new(bytes)).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest.get("format").and_then(|v| v.as_str()).unwrap_or("");
    if format != BUNDLE_FORMAT {
        bail!("unsupported bundle format: {format}");
    }
    let expected = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest missing dbSha256"))?
        .to_string();

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle missing {DB_ENTRY}"))?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;

    let actual = sha256_hex(&db_bytes);
    if actual != expected {
        bail!("database checksum mismatch: expected {expected}, got {actual}");
    }
    Ok(db_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn tampered_bundle_is_rejected() {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut buf);
            let opts = FileOptions::default();
            zip.start_file(MANIFEST_ENTRY, opts).expect("manifest");
            zip.write_all(
                json!({ "format": BUNDLE_FORMAT, "dbSha256": sha256_hex(b"original") })
                    .to_string()
                    .as_bytes(),
            )
            .expect("write manifest");
            zip.start_file(DB_ENTRY, opts).expect("db");
            zip.write_all(b"tampered").expect("write db");
            zip.finish().expect("finish");
        }
        let e = read_bundle_db(buf.get_ref()).expect_err("must fail");
        assert!(e.to_string().contains("checksum mismatch"));
    }
}
