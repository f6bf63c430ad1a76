//! Code assets: fingerprinting, staging and the asset manifest
//!
//! Assets are content-addressed. The object key is derived from a blake3
//! fingerprint of the source, so an unchanged artifact keeps its key and
//! CloudFormation leaves the function code alone.

use crate::error::{Result, StackError};
use crate::intrinsic::Value;
use keyrotator_config::{CodeSource, StackConfig};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// How an asset becomes the uploaded zip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetPackaging {
    /// Upload the file unchanged (already a zip)
    File,
    /// Zip the directory contents
    ZipDirectory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub id: String,
    pub source: PathBuf,
    pub packaging: AssetPackaging,
    pub fingerprint: String,
}

impl Asset {
    /// An asset with a precomputed fingerprint
    pub fn new(
        id: impl Into<String>,
        source: impl Into<PathBuf>,
        packaging: AssetPackaging,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            packaging,
            fingerprint: fingerprint.into(),
        }
    }

    pub fn from_file(id: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read(path).map_err(|e| StackError::asset_unavailable(path, e))?;
        let fingerprint = hex::encode(blake3::hash(&content).as_bytes());
        Ok(Self::new(id, path, AssetPackaging::File, fingerprint))
    }

    pub fn from_directory(id: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let files = list_files(path)?;
        if files.is_empty() {
            return Err(StackError::asset_packaging(path, "directory contains no files"));
        }

        let mut hasher = blake3::Hasher::new();
        for (relative, absolute) in &files {
            let content =
                fs::read(absolute).map_err(|e| StackError::asset_unavailable(absolute, e))?;
            hasher.update(relative.as_bytes());
            hasher.update(&[0]);
            hasher.update(&(content.len() as u64).to_le_bytes());
            hasher.update(&content);
        }
        let fingerprint = hex::encode(hasher.finalize().as_bytes());
        Ok(Self::new(id, path, AssetPackaging::ZipDirectory, fingerprint))
    }

    pub fn from_code_source(id: impl Into<String>, source: &CodeSource) -> Result<Self> {
        match source {
            CodeSource::Directory { path } => Self::from_directory(id, path),
            CodeSource::Zip { path } => Self::from_file(id, path),
        }
    }

    /// Key of the uploaded zip inside the staging bucket
    pub fn object_key(&self, prefix: &str) -> String {
        format!("{}{}.zip", prefix, self.fingerprint)
    }

    /// File name of the staged zip inside the output directory
    pub fn staged_file_name(&self) -> String {
        format!("asset.{}.zip", self.fingerprint)
    }

    /// Write the upload-ready zip into `out_dir`, returning its path.
    ///
    /// The zip is built in a temporary file next to the target and renamed
    /// into place once complete, so an interrupted run never leaves a
    /// partial `asset.<fingerprint>.zip` behind. An existing file with the
    /// same name is always replaced.
    pub fn stage(&self, out_dir: &Path) -> Result<PathBuf> {
        let target = out_dir.join(self.staged_file_name());
        let mut staging = NamedTempFile::new_in(out_dir)
            .map_err(|e| StackError::asset_unavailable(out_dir, e))?;

        match self.packaging {
            AssetPackaging::File => {
                let mut source = fs::File::open(&self.source)
                    .map_err(|e| StackError::asset_unavailable(&self.source, e))?;
                io::copy(&mut source, staging.as_file_mut())
                    .map_err(|e| StackError::asset_unavailable(&self.source, e))?;
            }
            AssetPackaging::ZipDirectory => zip_directory(&self.source, staging.as_file_mut())?,
        }

        staging
            .as_file()
            .sync_all()
            .map_err(|e| StackError::asset_unavailable(&target, e))?;
        staging
            .persist(&target)
            .map_err(|e| StackError::asset_unavailable(&target, e.error))?;

        info!(asset = %self.id, path = %target.display(), "Staged asset");
        Ok(target)
    }
}

/// Code assets the stack needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackAssets {
    pub production: Asset,
    pub debug: Option<Asset>,
}

impl StackAssets {
    pub const PRODUCTION_ID: &'static str = "AccessKeyRotator";
    pub const DEBUG_ID: &'static str = "DebugAccessKeyRotator";

    /// Fingerprint the configured artifacts. Missing files fail here, before
    /// any template is produced.
    pub fn resolve(config: &StackConfig) -> Result<Self> {
        let production = Asset::from_file(Self::PRODUCTION_ID, &config.function.artifact)?;
        let debug = if config.debug.enabled {
            Some(Asset::from_code_source(
                Self::DEBUG_ID,
                &config.debug.source,
            )?)
        } else {
            None
        };
        Ok(Self { production, debug })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        std::iter::once(&self.production).chain(self.debug.as_ref())
    }
}

/// Upload instructions for every staged asset
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetManifest {
    pub version: u32,
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: String,
    pub source_path: PathBuf,
    pub packaging: AssetPackaging,
    pub fingerprint: String,
    pub staged_file: String,
    pub bucket: Value,
    pub object_key: String,
}

impl AssetManifest {
    pub fn new(assets: &StackAssets, bucket: &Value, prefix: &str) -> Self {
        let files = assets
            .iter()
            .map(|asset| ManifestEntry {
                id: asset.id.clone(),
                source_path: asset.source.clone(),
                packaging: asset.packaging,
                fingerprint: asset.fingerprint.clone(),
                staged_file: asset.staged_file_name(),
                bucket: bucket.clone(),
                object_key: asset.object_key(prefix),
            })
            .collect();
        Self { version: 1, files }
    }
}

/// Regular files below `root`, sorted by their `/`-separated relative path
fn list_files(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|e| StackError::asset_unavailable(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StackError::asset_unavailable(&dir, e))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|e| StackError::asset_unavailable(&path, e))?;

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .map_err(|e| StackError::asset_packaging(&path, e.to_string()))?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((relative, path));
            }
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn zip_directory(source: &Path, target: &mut fs::File) -> Result<()> {
    let files = list_files(source)?;
    let mut zip = ZipWriter::new(target);
    // Lambda needs the bootstrap binary to stay executable
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);

    for (relative, absolute) in files {
        let content =
            fs::read(&absolute).map_err(|e| StackError::asset_unavailable(&absolute, e))?;
        zip.start_file(relative.as_str(), options)
            .map_err(|e| StackError::asset_packaging(source, e.to_string()))?;
        zip.write_all(&content)
            .map_err(|e| StackError::asset_packaging(source, e.to_string()))?;
    }

    zip.finish()
        .map_err(|e| StackError::asset_packaging(source, e.to_string()))?;
    Ok(())
}
