//! Zip packaging of bundles.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::document::{BundleDocument, DOCUMENT_NAME};
use crate::config::SyncConfig;
use crate::error::Error;

/// Archive directory holding asset files.
pub const ASSET_DIR: &str = "assets";

/// What an export wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    /// Asset files packed, relative to the asset root.
    pub assets: Vec<PathBuf>,
    pub bytes: u64,
}

/// Write a bundle to `dest`.
///
/// Asset paths from the configuration are resolved against its asset root.
/// A directory is packed recursively. Files with an excluded extension are
/// skipped.
pub fn write_bundle(
    dest: &Path,
    document: &BundleDocument,
    config: &SyncConfig,
) -> Result<ExportSummary, Error> {
    let assets = match &config.asset_root {
        Some(root) => collect_assets(root, &config.asset_paths, config)?,
        None => Vec::new(),
    };

    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(DOCUMENT_NAME, options)?;
    zip.write_all(&document.to_json()?)?;

    if let Some(root) = &config.asset_root {
        for rel in &assets {
            zip.start_file(entry_name(rel), options)?;
            let mut source = File::open(root.join(rel))?;
            io::copy(&mut source, &mut zip)?;
        }
    }

    let file = zip.finish()?;
    let bytes = file.metadata()?.len();
    info!(path = %dest.display(), assets = assets.len(), bytes, "bundle written");
    Ok(ExportSummary {
        path: dest.to_path_buf(),
        assets,
        bytes,
    })
}

fn entry_name(rel: &Path) -> String {
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    format!("{ASSET_DIR}/{}", parts.join("/"))
}

/// Files under the configured asset paths, relative to `root`, sorted.
fn collect_assets(
    root: &Path,
    paths: &[PathBuf],
    config: &SyncConfig,
) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    for path in paths {
        let full = root.join(path);
        if full.is_dir() {
            walk_files(&full, &mut files)?;
        } else if full.is_file() {
            files.push(full);
        } else {
            warn!(path = %full.display(), "asset path not found; skipped");
        }
    }

    let mut out = Vec::with_capacity(files.len());
    for file in files {
        let excluded = file
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| config.is_excluded(e));
        if excluded {
            debug!(path = %file.display(), "excluded asset");
            continue;
        }
        let rel = file
            .strip_prefix(root)
            .map_err(|_| {
                Error::InvalidData(format!(
                    "asset {} is outside the asset root {}",
                    file.display(),
                    root.display()
                ))
            })?
            .to_path_buf();
        out.push(rel);
    }
    out.sort();
    out.dedup();
    Ok(out)
}

fn walk_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// A bundle unpacked into a scratch directory.
///
/// The directory is removed when the value is dropped, whatever the outcome
/// of the import.
#[derive(Debug)]
pub struct ExtractedBundle {
    dir: TempDir,
    document: BundleDocument,
    assets: Vec<PathBuf>,
}

impl ExtractedBundle {
    /// Unpack a bundle and read its document.
    ///
    /// Entries whose names would escape the scratch directory are skipped.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let dir = tempfile::Builder::new().prefix("metasync-").tempdir()?;
        let mut archive = ZipArchive::new(File::open(path)?)?;

        let mut document = None;
        let mut assets = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let Some(rel) = entry.enclosed_name() else {
                warn!(name = entry.name(), "unsafe entry name in bundle; skipped");
                continue;
            };
            if entry.is_dir() {
                continue;
            }
            if rel == Path::new(DOCUMENT_NAME) {
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes)?;
                document = Some(BundleDocument::from_json(&bytes)?);
                continue;
            }
            let target = dir.path().join(&rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            if let Ok(asset) = rel.strip_prefix(ASSET_DIR) {
                assets.push(asset.to_path_buf());
            }
        }

        let document = document.ok_or_else(|| {
            Error::InvalidData(format!("{} contains no {DOCUMENT_NAME}", path.display()))
        })?;
        assets.sort();
        info!(path = %path.display(), assets = assets.len(), "bundle extracted");
        Ok(Self {
            dir,
            document,
            assets,
        })
    }

    pub fn document(&self) -> &BundleDocument {
        &self.document
    }

    /// Asset files carried by the bundle, relative to the asset root.
    pub fn assets(&self) -> &[PathBuf] {
        &self.assets
    }

    pub fn scratch_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Copy the bundle's assets into `root`, replacing existing files.
    pub fn copy_assets(&self, root: &Path) -> Result<usize, Error> {
        let source = self.dir.path().join(ASSET_DIR);
        for rel in &self.assets {
            let target = root.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(source.join(rel), &target)?;
        }
        info!(root = %root.display(), copied = self.assets.len(), "assets copied");
        Ok(self.assets.len())
    }
}
