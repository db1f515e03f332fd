//! Host filesystem operations used by the migration engine.
//!
//! [`HostFs`] is the seam between the migration state machine and the
//! disk. [`LocalFs`] implements it directly with the standard library and
//! `walkdir`; the tree copy mirrors `rsync -a --delete`: contents,
//! permissions, ownership (when permitted), modification times, symlinks
//! and special files (FIFOs, sockets, device nodes such as overlay
//! whiteouts) are reproduced, and entries missing from the source are
//! pruned from the destination, so repeating a copy over a partial
//! destination converges on the source.

use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use dockhand_common::error::{DockhandError, Result};
use nix::sys::stat::{Mode, SFlag};
use nix::sys::time::TimeVal;
use walkdir::WalkDir;

/// Counters from one tree copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Regular files written.
    pub files_copied: u64,
    /// Regular files already identical in the destination.
    pub files_skipped: u64,
    /// Bytes written.
    pub bytes_copied: u64,
    /// Symlinks (re)created.
    pub links: u64,
    /// FIFOs, sockets and device nodes (re)created.
    pub specials: u64,
    /// Destination entries removed because the source lacks them.
    pub pruned: u64,
}

/// Filesystem operations needed to relocate a data tree.
pub trait HostFs {
    /// Returns whether anything exists at `path` (symlinks not followed).
    fn exists(&self, path: &Path) -> bool;

    /// Returns whether `path` is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Returns whether `path` is a directory with no entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    fn is_empty_dir(&self, path: &Path) -> Result<bool>;

    /// Creates `path` and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Confirms that files can be created inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a probe file cannot be written.
    fn probe_writable(&self, dir: &Path) -> Result<()>;

    /// Returns the total size in bytes of regular files under `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be walked.
    fn tree_size(&self, path: &Path) -> Result<u64>;

    /// Returns bytes available to unprivileged writers on the filesystem
    /// holding `path` (or its nearest existing ancestor).
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem cannot be queried.
    fn available_space(&self, path: &Path) -> Result<u64>;

    /// Makes `dst` an exact copy of the contents of `src`.
    ///
    /// # Errors
    ///
    /// Returns an error if any entry cannot be read or written.
    fn sync_tree(&self, src: &Path, dst: &Path) -> Result<SyncStats>;

    /// Renames `from` to `to` (same filesystem, atomic).
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Removes every entry inside `dir`, keeping `dir` itself.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry cannot be removed.
    fn clear_dir(&self, dir: &Path) -> Result<()>;

    /// Removes `path` and everything below it. Missing paths are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be removed.
    fn remove_tree(&self, path: &Path) -> Result<()>;
}

/// [`HostFs`] backed by the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl HostFs for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.symlink_metadata().is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_empty_dir(&self, path: &Path) -> Result<bool> {
        let mut entries = std::fs::read_dir(path).map_err(|e| DockhandError::io(path, e))?;
        Ok(entries.next().is_none())
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).map_err(|e| DockhandError::io(path, e))
    }

    fn probe_writable(&self, dir: &Path) -> Result<()> {
        let probe = tempfile::Builder::new()
            .prefix(".dockhand-probe")
            .tempfile_in(dir)
            .map_err(|e| DockhandError::io(dir, e))?;
        probe.close().map_err(|e| DockhandError::io(dir, e))
    }

    fn tree_size(&self, path: &Path) -> Result<u64> {
        let mut total = 0u64;
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = entry.map_err(|e| walk_error(path, e))?;
            if entry.file_type().is_file() {
                let meta = entry.metadata().map_err(|e| walk_error(path, e))?;
                total = total.saturating_add(meta.len());
            }
        }
        Ok(total)
    }

    fn available_space(&self, path: &Path) -> Result<u64> {
        let existing = path
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or_else(|| Path::new("/"));
        let stat = nix::sys::statvfs::statvfs(existing)
            .map_err(|errno| DockhandError::io(existing, io::Error::from(errno)))?;
        Ok(u64::from(stat.blocks_available()).saturating_mul(u64::from(stat.fragment_size())))
    }

    fn sync_tree(&self, src: &Path, dst: &Path) -> Result<SyncStats> {
        tracing::info!(src = %src.display(), dst = %dst.display(), "synchronizing data tree");
        let mut stats = SyncStats::default();
        let mut dirs = Vec::new();
        std::fs::create_dir_all(dst).map_err(|e| DockhandError::io(dst, e))?;

        for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| walk_error(src, e))?;
            let target = dst.join(relative(src, entry.path())?);
            let meta = entry.metadata().map_err(|e| walk_error(src, e))?;
            let file_type = entry.file_type();

            if file_type.is_dir() {
                if !target.is_dir() {
                    remove_any(&target)?;
                    std::fs::create_dir(&target).map_err(|e| DockhandError::io(&target, e))?;
                }
                dirs.push((target, meta));
            } else if file_type.is_symlink() {
                if sync_symlink(entry.path(), &target)? {
                    stats.links += 1;
                }
                preserve_owner(&target, &meta);
            } else if file_type.is_file() {
                if up_to_date(&meta, &target) {
                    stats.files_skipped += 1;
                } else {
                    stats.bytes_copied += copy_file(entry.path(), &target, &meta)?;
                    stats.files_copied += 1;
                }
                preserve_owner(&target, &meta);
            } else {
                if sync_special(&meta, &target)? {
                    stats.specials += 1;
                }
                preserve_owner(&target, &meta);
            }
        }

        stats.pruned = prune(src, dst)?;

        // Directory attributes last: writing children bumps their mtime.
        for (dir, meta) in dirs.iter().rev() {
            std::fs::set_permissions(dir, meta.permissions()).map_err(|e| DockhandError::io(dir, e))?;
            preserve_owner(dir, meta);
            if let Ok(modified) = meta.modified() {
                if let Err(e) = std::fs::File::open(dir).and_then(|f| f.set_modified(modified)) {
                    tracing::debug!(path = %dir.display(), error = %e, "cannot preserve directory mtime");
                }
            }
        }

        tracing::info!(
            copied = stats.files_copied,
            skipped = stats.files_skipped,
            bytes = stats.bytes_copied,
            specials = stats.specials,
            pruned = stats.pruned,
            "data tree synchronized"
        );
        Ok(stats)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        tracing::info!(from = %from.display(), to = %to.display(), "renaming");
        std::fs::rename(from, to).map_err(|e| DockhandError::io(from, e))
    }

    fn clear_dir(&self, dir: &Path) -> Result<()> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(DockhandError::io(dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| DockhandError::io(dir, e))?;
            remove_any(&entry.path())?;
        }
        Ok(())
    }

    fn remove_tree(&self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "removing tree");
        remove_any(path)
    }
}

fn walk_error(root: &Path, err: walkdir::Error) -> DockhandError {
    let path = err.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
    DockhandError::io(path, io::Error::from(err))
}

fn relative<'a>(root: &Path, path: &'a Path) -> Result<&'a Path> {
    path.strip_prefix(root).map_err(|_| DockhandError::Validation {
        message: format!("{} is outside {}", path.display(), root.display()),
    })
}

/// Removes whatever is at `path`; a missing path is not an error.
fn remove_any(path: &Path) -> Result<()> {
    let meta = match path.symlink_metadata() {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(DockhandError::io(path, e)),
    };
    let removed = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    removed.map_err(|e| DockhandError::io(path, e))
}

fn up_to_date(src: &std::fs::Metadata, target: &Path) -> bool {
    let Ok(existing) = target.symlink_metadata() else {
        return false;
    };
    existing.is_file()
        && existing.len() == src.len()
        && existing.permissions().mode() == src.permissions().mode()
        && matches!((existing.modified(), src.modified()), (Ok(a), Ok(b)) if a == b)
}

fn copy_file(src: &Path, target: &Path, meta: &std::fs::Metadata) -> Result<u64> {
    remove_any(target)?;
    let mut reader = std::fs::File::open(src).map_err(|e| DockhandError::io(src, e))?;
    let mut writer = std::fs::File::create(target).map_err(|e| DockhandError::io(target, e))?;
    let bytes = io::copy(&mut reader, &mut writer).map_err(|e| DockhandError::io(target, e))?;
    if let Ok(modified) = meta.modified() {
        writer
            .set_modified(modified)
            .map_err(|e| DockhandError::io(target, e))?;
    }
    writer
        .set_permissions(meta.permissions())
        .map_err(|e| DockhandError::io(target, e))?;
    Ok(bytes)
}

/// Points `target` at the same place as the symlink `src`. Returns `true`
/// when the link had to be (re)created.
fn sync_symlink(src: &Path, target: &Path) -> Result<bool> {
    let link = std::fs::read_link(src).map_err(|e| DockhandError::io(src, e))?;
    if std::fs::read_link(target).is_ok_and(|existing| existing == link) {
        return Ok(false);
    }
    remove_any(target)?;
    std::os::unix::fs::symlink(&link, target).map_err(|e| DockhandError::io(target, e))?;
    Ok(true)
}

/// Recreates the FIFO, socket or device node described by `meta` at
/// `target`. Returns `true` when the node had to be (re)created.
fn sync_special(meta: &std::fs::Metadata, target: &Path) -> Result<bool> {
    let kind = SFlag::from_bits_truncate(meta.mode() & SFlag::S_IFMT.bits());
    let perm = Mode::from_bits_truncate(meta.mode() & 0o7777);
    if !special_up_to_date(meta, target) {
        remove_any(target)?;
        nix::sys::stat::mknod(target, kind, perm, meta.rdev())
            .map_err(|errno| DockhandError::io(target, io::Error::from(errno)))?;
        // mknod applies the umask.
        std::fs::set_permissions(target, meta.permissions()).map_err(|e| DockhandError::io(target, e))?;
        set_node_times(target, meta)?;
        return Ok(true);
    }
    Ok(false)
}

fn special_up_to_date(src: &std::fs::Metadata, target: &Path) -> bool {
    let Ok(existing) = target.symlink_metadata() else {
        return false;
    };
    let (a, b) = (existing.file_type(), src.file_type());
    let same_kind = (a.is_fifo() && b.is_fifo())
        || (a.is_socket() && b.is_socket())
        || (a.is_char_device() && b.is_char_device())
        || (a.is_block_device() && b.is_block_device());
    same_kind
        && existing.rdev() == src.rdev()
        && existing.mode() == src.mode()
        && existing.mtime() == src.mtime()
        // Node times are set with microsecond precision.
        && existing.mtime_nsec() / 1_000 == src.mtime_nsec() / 1_000
}

/// Sets access and modification times without opening the node; opening
/// a FIFO blocks and opening a device talks to its driver.
fn set_node_times(target: &Path, meta: &std::fs::Metadata) -> Result<()> {
    let atime = TimeVal::new(meta.atime(), meta.atime_nsec() / 1_000);
    let mtime = TimeVal::new(meta.mtime(), meta.mtime_nsec() / 1_000);
    nix::sys::stat::lutimes(target, &atime, &mtime)
        .map_err(|errno| DockhandError::io(target, io::Error::from(errno)))
}

/// Ownership is reproduced only when the process may change it.
fn preserve_owner(target: &Path, meta: &std::fs::Metadata) {
    if let Err(e) = std::os::unix::fs::lchown(target, Some(meta.uid()), Some(meta.gid())) {
        tracing::trace!(path = %target.display(), error = %e, "ownership not preserved");
    }
}

fn prune(src: &Path, dst: &Path) -> Result<u64> {
    let mut stale: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dst).min_depth(1).follow_links(false).contents_first(true) {
        let entry = entry.map_err(|e| walk_error(dst, e))?;
        let rel = relative(dst, entry.path())?;
        if src.join(rel).symlink_metadata().is_err() {
            stale.push(entry.path().to_path_buf());
        }
    }
    // contents_first lists children before parents; drop children of
    // stale directories so each subtree is removed once.
    let roots: Vec<&PathBuf> = stale
        .iter()
        .filter(|p| !stale.iter().any(|q| q != *p && p.starts_with(q)))
        .collect();
    for path in &roots {
        tracing::debug!(path = %path.display(), "pruning entry absent from source");
        remove_any(path)?;
    }
    Ok(roots.len() as u64)
}
