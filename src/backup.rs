//! Workspace bundles: a zip holding the SQLite database plus a manifest with the
//! database's SHA-256. Imports are checked (checksum, SQLite header, integrity
//! check) before the live database is moved, and the replaced file is kept until
//! the caller confirms the new one opens.

use crate::db::DB_FILE_NAME;
use anyhow::{anyhow, Context};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/schoold.sqlite3";
pub const BUNDLE_FORMAT: &str = "schoold-workspace-v1";
const PLAIN_SQLITE_FORMAT: &str = "sqlite3";
const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    app_version: String,
    exported_at: String,
    db_sha256: String,
    db_bytes: u64,
}

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
    format!("{:x}", Sha256::digest(bytes))
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = Manifest {
        format: BUNDLE_FORMAT.to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        db_sha256: sha256_hex(&db_bytes),
        db_bytes: db_bytes.len() as u64,
    };
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;
    zip.finish().context("failed to finalize zip bundle")?;

    tracing::info!(path = %out_path.display(), bytes = manifest.db_bytes, "workspace bundle exported");
    Ok(ExportSummary {
        bundle_format: manifest.format,
        db_sha256: manifest.db_sha256,
        db_bytes: manifest.db_bytes,
    })
}

/// A verified database written next to the live one but not yet swapped in.
#[derive(Debug)]
pub struct StagedImport {
    workspace: PathBuf,
    staged: PathBuf,
    format: &'static str,
    db_sha256: String,
}

/// A swapped-in database. The one it replaced is kept until [`finish`] so that
/// [`roll_back`] can restore it when the new file fails to open.
///
/// [`finish`]: CommittedImport::finish
/// [`roll_back`]: CommittedImport::roll_back
#[derive(Debug)]
pub struct CommittedImport {
    live: PathBuf,
    previous: Option<PathBuf>,
    summary: ImportSummary,
}

/// Reads `in_path` (a bundle, or a bare SQLite file), checks it, and writes it
/// beside the workspace database. Nothing live is touched.
pub fn stage_workspace_import(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<StagedImport> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;

    let (format, db_bytes) = if is_zip_file(in_path)? {
        (BUNDLE_FORMAT, read_bundle(in_path)?)
    } else {
        let bytes = std::fs::read(in_path)
            .with_context(|| format!("failed to read {}", in_path.to_string_lossy()))?;
        (PLAIN_SQLITE_FORMAT, bytes)
    };
    if !db_bytes.starts_with(SQLITE_HEADER) {
        return Err(anyhow!(
            "{} does not hold a SQLite database",
            in_path.to_string_lossy()
        ));
    }

    let staged = workspace_path.join(format!("{}.importing", DB_FILE_NAME));
    std::fs::write(&staged, &db_bytes).with_context(|| {
        format!(
            "failed to write staged database {}",
            staged.to_string_lossy()
        )
    })?;
    if let Err(e) = check_integrity(&staged) {
        let _ = std::fs::remove_file(&staged);
        return Err(e);
    }

    Ok(StagedImport {
        workspace: workspace_path.to_path_buf(),
        staged,
        format,
        db_sha256: sha256_hex(&db_bytes),
    })
}

fn check_integrity(path: &Path) -> anyhow::Result<()> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    let verdict: String = conn
        .query_row("PRAGMA integrity_check", [], |r| r.get(0))
        .context("integrity check failed to run")?;
    if verdict != "ok" {
        return Err(anyhow!("database failed integrity check: {}", verdict));
    }
    Ok(())
}

impl StagedImport {
    /// Moves the live database aside and the staged one into place. On error
    /// the live database is left where it was.
    pub fn commit(self) -> anyhow::Result<CommittedImport> {
        let live = self.workspace.join(DB_FILE_NAME);
        let previous = if live.exists() {
            let aside = self.workspace.join(format!("{}.previous", DB_FILE_NAME));
            if let Err(e) = std::fs::rename(&live, &aside) {
                let _ = std::fs::remove_file(&self.staged);
                return Err(e).with_context(|| {
                    format!("failed to move aside {}", live.to_string_lossy())
                });
            }
            Some(aside)
        } else {
            None
        };

        if let Err(e) = std::fs::rename(&self.staged, &live) {
            if let Some(aside) = &previous {
                let _ = std::fs::rename(aside, &live);
            }
            let _ = std::fs::remove_file(&self.staged);
            return Err(e).with_context(|| {
                format!(
                    "failed to move staged database to {}",
                    live.to_string_lossy()
                )
            });
        }

        Ok(CommittedImport {
            live,
            previous,
            summary: ImportSummary {
                bundle_format_detected: self.format.to_string(),
                db_sha256: self.db_sha256,
            },
        })
    }
}

impl CommittedImport {
    /// The new database opened; drop the one it replaced.
    pub fn finish(self) -> ImportSummary {
        if let Some(aside) = &self.previous {
            if let Err(e) = std::fs::remove_file(aside) {
                tracing::warn!(path = %aside.display(), error = %e, "failed to remove replaced database");
            }
        }
        tracing::info!(
            path = %self.live.display(),
            format = %self.summary.bundle_format_detected,
            "workspace bundle imported"
        );
        self.summary
    }

    /// Restores the database that was live before [`StagedImport::commit`].
    pub fn roll_back(self) -> anyhow::Result<()> {
        match &self.previous {
            Some(aside) => std::fs::rename(aside, &self.live).with_context(|| {
                format!("failed to restore {}", self.live.to_string_lossy())
            })?,
            None => std::fs::remove_file(&self.live).with_context(|| {
                format!("failed to remove {}", self.live.to_string_lossy())
            })?,
        }
        tracing::warn!(path = %self.live.display(), "workspace import rolled back");
        Ok(())
    }
}

fn read_bundle(in_path: &Path) -> anyhow::Result<Vec<u8>> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: Manifest =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle missing {}", DB_ENTRY))?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;

    let actual = sha256_hex(&db_bytes);
    if actual != manifest.db_sha256 {
        return Err(anyhow!(
            "database checksum mismatch: manifest {} but bundle holds {}",
            manifest.db_sha256,
            actual
        ));
    }
    Ok(db_bytes)
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
