use std::fs::File;
use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use log::{debug, warn};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Detect the container format from the file name.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),
}

impl ArchiveError {
    fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &io::Error) -> Self {
        Self::io(
            context,
            io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }

    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::PermissionDenied)
    }
}

/// Check that `path` is a complete, uncorrupted archive with at least one
/// entry.
///
/// Every entry is read to its end so stored checksums are verified. Nothing
/// is written to disk. Missing, empty, truncated or garbage files yield
/// `false`; this never panics or errors.
#[must_use]
pub fn is_valid(path: &Path) -> bool {
    let Some(format) = ArchiveFormat::from_path(path) else {
        debug!("Unrecognised archive extension: {}", path.display());
        return false;
    };
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() || metadata.len() == 0 {
        return false;
    }

    let result = match format {
        ArchiveFormat::Zip => verify_zip(path),
        ArchiveFormat::TarGz => verify_tar_gz(path),
    };
    match result {
        Ok(entries) if entries > 0 => true,
        Ok(_) => {
            debug!("Archive has no entries: {}", path.display());
            false
        }
        Err(e) => {
            debug!("Archive {} failed verification: {e}", path.display());
            false
        }
    }
}

fn verify_zip(path: &Path) -> io::Result<usize> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(io::Error::other)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(io::Error::other)?;
        io::copy(&mut entry, &mut io::sink())?;
    }
    Ok(archive.len())
}

fn verify_tar_gz(path: &Path) -> io::Result<usize> {
    let file = File::open(path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut count = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        io::copy(&mut entry, &mut io::sink())?;
        count += 1;
    }
    // Drain past the tar end marker so the gzip trailer CRC is checked.
    let mut decoder = archive.into_inner();
    io::copy(&mut decoder, &mut io::sink())?;
    Ok(count)
}

/// Extract `archive_path` into `dest`, which is created if missing.
///
/// # Errors
/// Returns an error when the archive cannot be read or any entry cannot be
/// written.
pub fn extract(archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let format = ArchiveFormat::from_path(archive_path)
        .ok_or_else(|| ArchiveError::UnsupportedFormat(archive_path.display().to_string()))?;
    std::fs::create_dir_all(dest).map_err(|error| {
        ArchiveError::io_with_path("failed to create extraction directory", dest, &error)
    })?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive_path, dest)?,
        ArchiveFormat::TarGz => extract_tar_gz(archive_path, dest)?,
    }

    debug!("Extraction complete to {}", dest.display());
    Ok(())
}

fn extract_zip(zip_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = File::open(zip_path)
        .map_err(|error| ArchiveError::io_with_path("failed to open zip file", zip_path, &error))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| ArchiveError::zip("failed to read zip archive", error))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| ArchiveError::zip("failed to read zip entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path");
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                ArchiveError::io_with_path("failed to create directory", &out_path, &error)
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                ArchiveError::io_with_path("failed to create parent directory", parent, &error)
            })?;
        }
        let mut outfile = File::create(&out_path).map_err(|error| {
            ArchiveError::io_with_path("failed to create extracted file", &out_path, &error)
        })?;
        io::copy(&mut entry, &mut outfile).map_err(|error| {
            ArchiveError::io_with_path("failed to extract archive entry", &out_path, &error)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }
    }
    Ok(())
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive_path).map_err(|error| {
        ArchiveError::io_with_path("failed to open tarball", archive_path, &error)
    })?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive
        .unpack(dest)
        .map_err(|error| ArchiveError::io_with_path("failed to unpack tarball", dest, &error))
}

/// Extract into a hidden staging directory next to `extract_dir`, then rename
/// it into place so `extract_dir` only ever appears complete.
///
/// When the rename is refused, falls back to extracting straight into
/// `extract_dir` and removes it again if that fails.
///
/// # Errors
/// Returns the extraction error. Partial output is removed before returning.
pub fn extract_atomically(archive_path: &Path, extract_dir: &Path) -> Result<(), ArchiveError> {
    let parent = extract_dir
        .parent()
        .ok_or_else(|| ArchiveError::UnsupportedFormat(extract_dir.display().to_string()))?;
    std::fs::create_dir_all(parent).map_err(|error| {
        ArchiveError::io_with_path("failed to create install root", parent, &error)
    })?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(parent)
        .map_err(|error| ArchiveError::io("failed to create staging directory", error))?;
    extract(archive_path, staging.path())?;

    // A leftover empty directory would block the rename on some platforms.
    if extract_dir.is_dir() {
        let _ = std::fs::remove_dir(extract_dir);
    }

    let staged = staging.keep();
    match std::fs::rename(&staged, extract_dir) {
        Ok(()) => Ok(()),
        Err(error) => {
            warn!(
                "Could not move {} into place ({error}), extracting in place",
                staged.display()
            );
            let _ = std::fs::remove_dir_all(&staged);
            extract(archive_path, extract_dir).inspect_err(|_| {
                if let Err(cleanup) = std::fs::remove_dir_all(extract_dir) {
                    warn!(
                        "Failed to remove partial directory {}: {cleanup}",
                        extract_dir.display()
                    );
                }
            })
        }
    }
}
