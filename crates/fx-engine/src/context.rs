//! Build context packaging.
//!
//! A build directory is archived to a sibling file (`<dir>.tar` or
//! `<dir>.tar.gz`), read back, and handed to the engine. The archive is
//! deleted when the [`BuildContext`] is dropped, whichever way the build ends.

use std::fs::File;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use fx_common::constants::BUILD_DESCRIPTOR;
use fx_common::error::{FxError, Result};

/// How the build context archive is encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    /// Plain tar.
    #[default]
    None,
    /// Gzip-compressed tar; the engine detects it on its own.
    Gzip,
}

impl Compression {
    /// File extension appended to the directory path.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::None => ".tar",
            Self::Gzip => ".tar.gz",
        }
    }

    /// Selects gzip when `compress` is set.
    #[must_use]
    pub const fn from_flag(compress: bool) -> Self {
        if compress { Self::Gzip } else { Self::None }
    }
}

/// An archived build directory on local disk.
#[derive(Debug)]
pub struct BuildContext {
    dir: PathBuf,
    archive_path: PathBuf,
    size_bytes: u64,
}

impl BuildContext {
    /// Archives `dir` for a build of `image`.
    ///
    /// # Errors
    ///
    /// Returns `FxError::BuildFailed` if `dir` is not a directory, has no
    /// build descriptor, the archive path is already taken, or the archive
    /// cannot be written.
    pub fn package(image: &str, dir: &Path, compression: Compression) -> Result<Self> {
        let fail = |reason: String| FxError::BuildFailed {
            image: image.to_string(),
            reason,
        };

        let dir = std::fs::canonicalize(dir)
            .map_err(|e| fail(format!("cannot resolve {}: {e}", dir.display())))?;
        if !dir.is_dir() {
            return Err(fail(format!("{} is not a directory", dir.display())));
        }
        if !dir.join(BUILD_DESCRIPTOR).is_file() {
            return Err(fail(format!(
                "{BUILD_DESCRIPTOR} not found in {}",
                dir.display()
            )));
        }
        let archive_path = archive_path(&dir, compression)
            .ok_or_else(|| fail(format!("{} has no parent directory", dir.display())))?;
        if archive_path.symlink_metadata().is_ok() {
            return Err(fail(format!(
                "{} already exists; move it away before building",
                archive_path.display()
            )));
        }

        tracing::debug!(
            dir = %dir.display(),
            archive = %archive_path.display(),
            "packaging build context"
        );

        // From here on the archive file exists and must be cleaned up on error.
        let mut context = Self {
            dir,
            archive_path,
            size_bytes: 0,
        };
        context.size_bytes = context
            .write_archive(compression)
            .map_err(|e| fail(format!("archiving {}: {e}", context.dir.display())))?;

        tracing::info!(
            archive = %context.archive_path.display(),
            size = context.size_bytes,
            "build context packaged"
        );
        Ok(context)
    }

    /// Reads the archive back for transmission.
    ///
    /// # Errors
    ///
    /// Returns `FxError::BuildFailed` if the archive cannot be read.
    pub async fn read(&self, image: &str) -> Result<Bytes> {
        tokio::fs::read(&self.archive_path)
            .await
            .map(Bytes::from)
            .map_err(|e| FxError::BuildFailed {
                image: image.to_string(),
                reason: format!("reading {}: {e}", self.archive_path.display()),
            })
    }

    /// Directory that was archived.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the archive.
    #[must_use]
    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Archive size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    fn write_archive(&self, compression: Compression) -> std::io::Result<u64> {
        let file = File::create(&self.archive_path)?;
        match compression {
            Compression::None => {
                let mut builder = tar::Builder::new(file);
                builder.follow_symlinks(false);
                builder.append_dir_all(".", &self.dir)?;
                builder.into_inner()?.sync_all()?;
            }
            Compression::Gzip => {
                let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
                let mut builder = tar::Builder::new(encoder);
                builder.follow_symlinks(false);
                builder.append_dir_all(".", &self.dir)?;
                builder.into_inner()?.finish()?.sync_all()?;
            }
        }
        Ok(std::fs::metadata(&self.archive_path)?.len())
    }
}

impl Drop for BuildContext {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.archive_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    archive = %self.archive_path.display(),
                    error = %e,
                    "failed to remove build context archive"
                );
            }
        }
    }
}

/// Packages `dir` off the async executor and reads the archive back.
///
/// # Errors
///
/// Returns `FxError::BuildFailed` if packaging or reading fails.
pub async fn prepare(
    image: &str,
    dir: &Path,
    compression: Compression,
) -> Result<(BuildContext, Bytes)> {
    let owned_image = image.to_string();
    let owned_dir = dir.to_path_buf();
    let context = tokio::task::spawn_blocking(move || {
        BuildContext::package(&owned_image, &owned_dir, compression)
    })
    .await
    .map_err(|e| FxError::BuildFailed {
        image: image.to_string(),
        reason: format!("packaging task failed: {e}"),
    })??;
    let body = context.read(image).await?;
    Ok((context, body))
}

/// Sibling archive path for `dir`, or `None` for a filesystem root.
#[must_use]
pub fn archive_path(dir: &Path, compression: Compression) -> Option<PathBuf> {
    let name = dir.file_name()?;
    let mut file_name = name.to_os_string();
    file_name.push(compression.extension());
    Some(dir.parent()?.join(file_name))
}
