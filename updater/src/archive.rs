//! Archive capability: unpack a downloaded release into the server directory.
//!
//! Extraction is additive. Entries present in the archive overwrite files on
//! disk; files not in the archive are left alone.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Result, UpdaterError};

#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Unpack `archive` into `target_dir`, returning the number of files written.
    async fn extract(&self, archive: &Path, target_dir: &Path) -> Result<usize>;
}

/// Zip extraction on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

#[async_trait]
impl ArchiveExtractor for ZipExtractor {
    async fn extract(&self, archive: &Path, target_dir: &Path) -> Result<usize> {
        let path = archive.to_path_buf();
        let target_dir = target_dir.to_path_buf();
        tokio::task::spawn_blocking(move || extract_zip(&path, &target_dir))
            .await
            .map_err(|e| UpdaterError::Archive {
                path: archive.to_path_buf(),
                message: format!("extraction task failed: {}", e),
            })?
    }
}

/// Synchronous zip extraction. Entries whose names would escape `target_dir`
/// (absolute paths, `..`) are skipped with a warning.
pub fn extract_zip(archive: &Path, target_dir: &Path) -> Result<usize> {
    fs::create_dir_all(target_dir).map_err(|e| UpdaterError::io("create_dir", target_dir, e))?;

    let file = fs::File::open(archive).map_err(|e| UpdaterError::io("open", archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| zip_err(archive, e))?;
    let mut written = 0;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| zip_err(archive, e))?;
        let Some(relative) = entry.enclosed_name().map(PathBuf::from) else {
            tracing::warn!("Skipping unsafe archive entry '{}'", entry.name());
            continue;
        };
        let out_path = target_dir.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| UpdaterError::io("create_dir", &out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| UpdaterError::io("create_dir", parent, e))?;
        }
        let mut outfile = fs::File::create(&out_path).map_err(|e| UpdaterError::io("create", &out_path, e))?;
        io::copy(&mut entry, &mut outfile).map_err(|e| UpdaterError::io("write", &out_path, e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&out_path, fs::Permissions::from_mode(mode));
        }

        written += 1;
    }

    tracing::debug!("Extracted {} files from {} into {}", written, archive.display(), target_dir.display());
    Ok(written)
}

fn zip_err(path: &Path, err: zip::result::ZipError) -> UpdaterError {
    UpdaterError::Archive {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extraction_is_additive_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("serverfiles");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("keep.txt"), "mine").unwrap();
        fs::write(target.join("config.json"), "old").unwrap();

        let archive = dir.path().join("install.zip");
        write_zip(&archive, &[
            ("config.json", b"new"),
            ("Impostor.Server.exe", b"MZ"),
            ("libraries/lib.dll", b"dll"),
        ]);

        let count = extract_zip(&archive, &target).unwrap();
        assert_eq!(count, 3);
        assert_eq!(fs::read_to_string(target.join("keep.txt")).unwrap(), "mine");
        assert_eq!(fs::read_to_string(target.join("config.json")).unwrap(), "new");
        assert!(target.join("libraries/lib.dll").exists());
    }

    #[test]
    fn corrupt_archive_is_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("install.zip");
        fs::write(&archive, b"definitely not a zip").unwrap();

        let err = extract_zip(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, UpdaterError::Archive { .. }));
    }

    #[tokio::test]
    async fn zip_extractor_runs_on_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("a.zip");
        write_zip(&archive, &[("a.txt", b"a")]);

        let n = ZipExtractor.extract(&archive, &dir.path().join("t")).await.unwrap();
        assert_eq!(n, 1);
    }
}
