//! Unpacking downloaded artifacts into a staging folder.

use crate::error::{Result, UpdateError};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

/// Unpacks artifacts into a staging folder next to the install directory.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    install_dir: PathBuf,
}

impl ArchiveExtractor {
    pub fn new(install_dir: PathBuf) -> Self {
        Self { install_dir }
    }

    /// Directory that receives staging folders: the install directory's parent.
    pub fn staging_parent(&self) -> PathBuf {
        self.install_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.install_dir.clone())
    }

    /// Unpack `archive` into `<staging parent>/<label or timestamp>` and delete
    /// the archive. Existing files in that folder are overwritten. A failed
    /// extraction leaves whatever was written for diagnosis.
    pub fn extract(&self, archive: &Path, label: Option<&str>) -> Result<PathBuf> {
        let folder_name = label
            .and_then(sanitize_label)
            .unwrap_or_else(timestamp_label);
        let target = self.staging_parent().join(folder_name);

        log::info!(
            "Extracting {} into {}",
            archive.display(),
            target.display()
        );
        fs::create_dir_all(&target)?;
        unpack_zip(archive, &target)?;

        if let Err(e) = fs::remove_file(archive) {
            log::warn!("Could not delete archive {}: {e}", archive.display());
        }

        log::info!("Extraction complete: {}", target.display());
        Ok(target)
    }

    /// [`extract`](Self::extract) on the blocking pool.
    pub async fn extract_async(&self, archive: PathBuf, label: Option<String>) -> Result<PathBuf> {
        let extractor = self.clone();
        tokio::task::spawn_blocking(move || extractor.extract(&archive, label.as_deref()))
            .await
            .map_err(|e| UpdateError::Extraction(format!("extraction task failed: {e}")))?
    }
}

fn unpack_zip(archive: &Path, target: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|e| {
        UpdateError::Extraction(format!("cannot open {}: {e}", archive.display()))
    })?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| {
        UpdateError::Extraction(format!("{} is not a readable zip: {e}", archive.display()))
    })?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| UpdateError::Extraction(format!("cannot read entry {i}: {e}")))?;

        let relative = entry.enclosed_name().ok_or_else(|| {
            UpdateError::Extraction(format!("entry {:?} has an unsafe path", entry.name()))
        })?;
        let out_path = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out).map_err(|e| {
            UpdateError::Extraction(format!("cannot extract {}: {e}", entry.name()))
        })?;

        // Owner keeps write access so a re-extraction or the updater's copy
        // can overwrite the file.
        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode((mode & 0o7777) | 0o200))?;
        }
    }

    Ok(())
}

/// Folder name for a label: path separators and other characters that are
/// unsafe in file names become `_`. `None` if nothing usable remains.
pub fn sanitize_label(label: &str) -> Option<String> {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => None,
        _ => Some(cleaned),
    }
}

/// Second-resolution local timestamp, e.g. `20260418093015`.
pub fn timestamp_label() -> String {
    chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
}
