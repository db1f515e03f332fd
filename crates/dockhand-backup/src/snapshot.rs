//! Snapshot identity and on-disk naming.
//!
//! Every snapshot lives directly in the backup root and is named
//! `<subject>_<YYYYMMDD_HHMMSS>.tar` for container exports, or
//! `docker_config_<YYYYMMDD_HHMMSS>.tar.gz` for configuration archives.
//! The file name is the snapshot's identifier.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use dockhand_common::constants::{
    CONFIG_SNAPSHOT_EXT, CONFIG_SNAPSHOT_SUBJECT, CONTAINER_SNAPSHOT_EXT, TIMESTAMP_FORMAT,
};
use dockhand_common::error::{DockhandError, Result};

/// Length of a rendered timestamp label, e.g. `20240131_235959`.
const LABEL_LEN: usize = 15;

/// What a snapshot captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    /// Exported container filesystem.
    Container,
    /// Archived runtime configuration directory.
    Config,
}

impl SnapshotKind {
    /// Returns the file extension, without the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Container => CONTAINER_SNAPSHOT_EXT,
            Self::Config => CONFIG_SNAPSHOT_EXT,
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Config => write!(f, "config"),
        }
    }
}

/// An immutable snapshot file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Container name, or `docker_config` for configuration archives.
    pub subject: String,
    /// Time the snapshot was taken, to the second.
    pub label: NaiveDateTime,
    /// What the snapshot captures.
    pub kind: SnapshotKind,
    /// Location of the snapshot file.
    pub path: PathBuf,
}

impl Snapshot {
    /// Builds the snapshot that would be stored under `root`.
    #[must_use]
    pub fn new(root: &Path, subject: &str, label: NaiveDateTime, kind: SnapshotKind) -> Self {
        Self {
            subject: subject.to_string(),
            label,
            kind,
            path: root.join(file_name(subject, label, kind)),
        }
    }

    /// Recognizes a snapshot by its file name.
    ///
    /// Returns `None` for files that do not follow the naming scheme.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let (subject, label, kind) = parse_file_name(name)?;
        Some(Self {
            subject,
            label,
            kind,
            path: path.to_path_buf(),
        })
    }

    /// Returns the snapshot identifier (its file name).
    #[must_use]
    pub fn id(&self) -> String {
        file_name(&self.subject, self.label, self.kind)
    }

    /// Returns the size of the snapshot file in bytes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be inspected.
    pub fn size(&self) -> Result<u64> {
        std::fs::metadata(&self.path)
            .map(|m| m.len())
            .map_err(|e| DockhandError::io(&self.path, e))
    }
}

/// Renders the file name for a snapshot.
#[must_use]
pub fn file_name(subject: &str, label: NaiveDateTime, kind: SnapshotKind) -> String {
    format!(
        "{subject}_{}.{}",
        label.format(TIMESTAMP_FORMAT),
        kind.extension()
    )
}

/// Splits a snapshot file name into subject, label and kind.
#[must_use]
pub fn parse_file_name(name: &str) -> Option<(String, NaiveDateTime, SnapshotKind)> {
    let (stem, kind) = if let Some(stem) = name.strip_suffix(".tar.gz") {
        (stem, SnapshotKind::Config)
    } else {
        (name.strip_suffix(".tar")?, SnapshotKind::Container)
    };
    let split = stem.len().checked_sub(LABEL_LEN + 1)?;
    let (subject, rest) = stem.split_at_checked(split)?;
    let label = rest.strip_prefix('_')?;
    if subject.is_empty() {
        return None;
    }
    if kind == SnapshotKind::Config && subject != CONFIG_SNAPSHOT_SUBJECT {
        return None;
    }
    let label = NaiveDateTime::parse_from_str(label, TIMESTAMP_FORMAT).ok()?;
    Some((subject.to_string(), label, kind))
}

/// Lists the snapshots in `root`, oldest first.
///
/// A missing root holds no snapshots. Files that do not follow the
/// naming scheme are ignored.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be read.
pub fn list(root: &Path) -> Result<Vec<Snapshot>> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(DockhandError::io(root, e)),
    };
    let mut snapshots = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DockhandError::io(root, e))?;
        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        if let Some(snapshot) = Snapshot::from_path(&entry.path()).filter(|_| is_file) {
            snapshots.push(snapshot);
        }
    }
    snapshots.sort_by(|a, b| (a.label, &a.subject).cmp(&(b.label, &b.subject)));
    Ok(snapshots)
}
