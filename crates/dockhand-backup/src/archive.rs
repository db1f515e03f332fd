//! Compressed tarballs of whole directories.

use std::fs::File;
use std::path::Path;

use dockhand_common::error::{DockhandError, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// Packs the contents of `src` into a gzip-compressed tarball at `dest`.
///
/// Entries are stored relative to `src`; symlinks are stored as links.
/// A partially written archive is removed on failure.
///
/// # Errors
///
/// Returns an I/O error if `src` cannot be read or `dest` written.
pub fn pack_dir(src: &Path, dest: &Path) -> Result<u64> {
    tracing::info!(src = %src.display(), dest = %dest.display(), "packing archive");
    let packed = write_archive(src, dest);
    if packed.is_err() {
        let _ = std::fs::remove_file(dest);
    }
    packed?;
    let size = std::fs::metadata(dest)
        .map_err(|e| DockhandError::io(dest, e))?
        .len();
    tracing::info!(size, "archive written");
    Ok(size)
}

fn write_archive(src: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest).map_err(|e| DockhandError::io(dest, e))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder
        .append_dir_all(".", src)
        .map_err(|e| DockhandError::io(src, e))?;
    let encoder = builder.into_inner().map_err(|e| DockhandError::io(dest, e))?;
    let file = encoder.finish().map_err(|e| DockhandError::io(dest, e))?;
    file.sync_all().map_err(|e| DockhandError::io(dest, e))
}

/// Extracts `archive` over `target`, returning the number of entries.
///
/// Supports both plain `.tar` and gzip-compressed `.tar.gz` / `.tgz`
/// archives. Existing files are overwritten; files absent from the
/// archive are left alone. Entries escaping `target` are skipped.
///
/// # Errors
///
/// Returns an I/O error if the archive cannot be read or an entry cannot
/// be written.
pub fn unpack(archive: &Path, target: &Path) -> Result<usize> {
    tracing::info!(
        archive = %archive.display(),
        target = %target.display(),
        "extracting archive"
    );
    std::fs::create_dir_all(target).map_err(|e| DockhandError::io(target, e))?;
    let file = File::open(archive).map_err(|e| DockhandError::io(archive, e))?;
    let count = if is_gzip_archive(archive) {
        unpack_entries(tar::Archive::new(GzDecoder::new(file)), archive, target)?
    } else {
        unpack_entries(tar::Archive::new(file), archive, target)?
    };
    tracing::info!(entries = count, "archive extracted");
    Ok(count)
}

fn unpack_entries<R: std::io::Read>(
    mut archive: tar::Archive<R>,
    source: &Path,
    target: &Path,
) -> Result<usize> {
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);
    let mut count = 0;
    for entry in archive.entries().map_err(|e| DockhandError::io(source, e))? {
        let mut entry = entry.map_err(|e| DockhandError::io(source, e))?;
        if entry.unpack_in(target).map_err(|e| DockhandError::io(target, e))? {
            count += 1;
        } else {
            tracing::warn!(entry = ?entry.path().ok(), "skipping entry outside target");
        }
    }
    Ok(count)
}

/// Determines whether the archive is gzip-compressed based on extension.
fn is_gzip_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz") || ext.eq_ignore_ascii_case("tgz"))
}
