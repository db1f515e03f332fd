//! Backup and restore of containers and runtime configuration.
//!
//! The coordinator owns the snapshot files in the backup root. It touches
//! live runtime state only through the gateway (export, import, create)
//! and the configuration directory only on an explicit, confirmed
//! restore. Nothing here restarts the runtime.

use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, SubsecRound, TimeDelta};
use dockhand_common::confirm::Confirm;
use dockhand_common::constants::CONFIG_SNAPSHOT_SUBJECT;
use dockhand_common::error::{DockhandError, Result};
use dockhand_common::types::ContainerName;
use dockhand_runtime::containers::Containers;
use dockhand_runtime::gateway::PrivilegeMode;

use crate::archive;
use crate::clock::{Clock, SystemClock};
use crate::snapshot::{self, Snapshot, SnapshotKind};

/// Command given to restored containers when the caller supplies none.
///
/// Exported filesystems carry no entrypoint.
pub const DEFAULT_RESTORE_COMMAND: &str = "sh";

/// Result of snapshotting every container.
#[derive(Debug, Default)]
pub struct BatchTally {
    /// Containers attempted.
    pub total: usize,
    /// Snapshots written.
    pub snapshots: Vec<Snapshot>,
    /// Containers whose export failed, with the reason.
    pub failures: Vec<(ContainerName, DockhandError)>,
}

impl BatchTally {
    /// Number of containers snapshotted successfully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.snapshots.len()
    }
}

/// Creates, lists, restores and deletes snapshots.
pub struct BackupCoordinator<'a> {
    root: PathBuf,
    config_dir: PathBuf,
    containers: Containers,
    clock: Box<dyn Clock + 'a>,
    confirm: &'a dyn Confirm,
}

impl<'a> BackupCoordinator<'a> {
    /// Creates a coordinator storing snapshots in `root` and archiving
    /// `config_dir`.
    pub fn new(
        root: impl Into<PathBuf>,
        config_dir: impl Into<PathBuf>,
        containers: Containers,
        confirm: &'a dyn Confirm,
    ) -> Self {
        Self {
            root: root.into(),
            config_dir: config_dir.into(),
            containers,
            clock: Box::new(SystemClock),
            confirm,
        }
    }

    /// Replaces the clock used for timestamp labels.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Returns the backup root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Exports one container to a new snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::NotFound`] if no such container exists and
    /// [`DockhandError::ExportFailed`] if the runtime cannot export it.
    pub fn snapshot_container(&self, name: &ContainerName) -> Result<Snapshot> {
        if !self.containers.exists(name)? {
            return Err(DockhandError::NotFound {
                kind: "container",
                id: name.to_string(),
            });
        }
        self.export(name)
    }

    /// Exports every container, one at a time.
    ///
    /// A failing container does not stop the batch.
    ///
    /// # Errors
    ///
    /// Returns an error only if the containers cannot be listed.
    pub fn snapshot_all(&self) -> Result<BatchTally> {
        let names = self.containers.names()?;
        let mut tally = BatchTally {
            total: names.len(),
            ..BatchTally::default()
        };
        for name in names {
            match self.export(&name) {
                Ok(snapshot) => tally.snapshots.push(snapshot),
                Err(e) => {
                    tracing::warn!(container = %name, error = %e, "snapshot failed");
                    tally.failures.push((name, e));
                }
            }
        }
        tracing::info!(
            total = tally.total,
            succeeded = tally.succeeded(),
            "batch snapshot finished"
        );
        Ok(tally)
    }

    fn export(&self, name: &ContainerName) -> Result<Snapshot> {
        self.ensure_root()?;
        let snapshot = self.next_snapshot(name.as_str(), SnapshotKind::Container)?;
        if let Err(e) = self.containers.export(name, &snapshot.path) {
            discard(&snapshot.path);
            return Err(DockhandError::ExportFailed {
                container: name.to_string(),
                message: e.to_string(),
            });
        }
        self.fix_ownership(&snapshot.path);
        tracing::info!(container = %name, snapshot = %snapshot.id(), "container snapshot written");
        Ok(snapshot)
    }

    /// Imports a container snapshot as a new container named `new_name`.
    ///
    /// The archive becomes image `<new_name>:restored`; the container is
    /// created, not started, running `command` (or `sh`). Returns the new
    /// container's id.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::NotFound`] if the snapshot is missing,
    /// [`DockhandError::NameInUse`] if `new_name` is taken, and
    /// [`DockhandError::ImportFailed`] if the runtime rejects the import or
    /// the container creation.
    pub fn restore_container(
        &self,
        snapshot: &Path,
        new_name: &ContainerName,
        command: &[String],
    ) -> Result<String> {
        if !snapshot.is_file() {
            return Err(DockhandError::NotFound {
                kind: "snapshot",
                id: snapshot.display().to_string(),
            });
        }
        if self.containers.exists(new_name)? {
            return Err(DockhandError::NameInUse {
                name: new_name.to_string(),
            });
        }

        let reference = format!("{}:restored", new_name.as_str().to_ascii_lowercase());
        let image = self
            .containers
            .import(snapshot, &reference)
            .map_err(|e| import_failed(snapshot, &e))?;
        tracing::info!(image, reference, "snapshot imported");

        let command = if command.is_empty() {
            vec![DEFAULT_RESTORE_COMMAND.to_string()]
        } else {
            command.to_vec()
        };
        let id = self
            .containers
            .create(new_name, &reference, &command)
            .map_err(|e| import_failed(snapshot, &e))?;
        tracing::info!(container = %new_name, id, "container restored");
        Ok(id)
    }

    /// Archives the configuration directory to a new snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::NotFound`] if the configuration directory
    /// does not exist, or an I/O error if the archive cannot be written.
    pub fn snapshot_config(&self) -> Result<Snapshot> {
        if !self.config_dir.is_dir() {
            return Err(DockhandError::NotFound {
                kind: "configuration directory",
                id: self.config_dir.display().to_string(),
            });
        }
        self.ensure_root()?;
        let snapshot = self.next_snapshot(CONFIG_SNAPSHOT_SUBJECT, SnapshotKind::Config)?;
        let _ = archive::pack_dir(&self.config_dir, &snapshot.path)?;
        self.fix_ownership(&snapshot.path);
        tracing::info!(snapshot = %snapshot.id(), "configuration snapshot written");
        Ok(snapshot)
    }

    /// Extracts a configuration snapshot over the configuration directory.
    ///
    /// Files in the archive overwrite their live counterparts. The runtime
    /// is not restarted. Returns the number of entries restored.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::NotFound`] if the snapshot is missing,
    /// [`DockhandError::Validation`] if it is not a configuration archive,
    /// and [`DockhandError::Cancelled`] if the restore is not confirmed.
    pub fn restore_config(&self, snapshot: &Path) -> Result<usize> {
        if !snapshot.is_file() {
            return Err(DockhandError::NotFound {
                kind: "snapshot",
                id: snapshot.display().to_string(),
            });
        }
        if !Snapshot::from_path(snapshot).is_some_and(|s| s.kind == SnapshotKind::Config) {
            return Err(DockhandError::Validation {
                message: format!("{} is not a configuration snapshot", snapshot.display()),
            });
        }
        let question = format!(
            "Overwrite the configuration in {} with {}?",
            self.config_dir.display(),
            snapshot.display()
        );
        if !self.confirm.confirm(&question) {
            return Err(DockhandError::Cancelled {
                operation: "configuration restore".into(),
            });
        }
        let count = archive::unpack(snapshot, &self.config_dir)?;
        tracing::warn!("configuration restored; restart the runtime to apply it");
        Ok(count)
    }

    /// Lists snapshots in the backup root, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the backup root cannot be read.
    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        snapshot::list(&self.root)
    }

    /// Resolves a snapshot id, or a path, to an existing snapshot file.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::NotFound`] if no such file exists.
    pub fn resolve(&self, id_or_path: &str) -> Result<PathBuf> {
        let given = Path::new(id_or_path);
        let path = if given.components().count() > 1 {
            given.to_path_buf()
        } else {
            self.root.join(given)
        };
        if path.is_file() {
            Ok(path)
        } else {
            Err(DockhandError::NotFound {
                kind: "snapshot",
                id: id_or_path.to_string(),
            })
        }
    }

    /// Permanently deletes the snapshot `id` from the backup root.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::NotFound`] if `id` names no snapshot in the
    /// backup root and [`DockhandError::Cancelled`] if the deletion is not
    /// confirmed.
    pub fn delete_snapshot(&self, id: &str) -> Result<Snapshot> {
        let not_found = || DockhandError::NotFound {
            kind: "snapshot",
            id: id.to_string(),
        };
        if Path::new(id).components().count() != 1 {
            return Err(not_found());
        }
        let snapshot = Snapshot::from_path(&self.root.join(id))
            .filter(|s| s.path.is_file())
            .ok_or_else(not_found)?;

        let question = format!("Permanently delete snapshot {id}?");
        if !self.confirm.confirm(&question) {
            return Err(DockhandError::Cancelled {
                operation: "snapshot deletion".into(),
            });
        }
        std::fs::remove_file(&snapshot.path).map_err(|e| DockhandError::io(&snapshot.path, e))?;
        tracing::info!(snapshot = id, "snapshot deleted");
        Ok(snapshot)
    }

    fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| DockhandError::io(&self.root, e))
    }

    /// Picks a label for a new snapshot of `subject`.
    ///
    /// Labels have one-second resolution; when the clock has not moved past
    /// the latest existing snapshot of the subject, the label is bumped so
    /// labels stay strictly increasing and files are never reused.
    fn next_snapshot(&self, subject: &str, kind: SnapshotKind) -> Result<Snapshot> {
        let now = self.clock.now().trunc_subsecs(0);
        let latest = snapshot::list(&self.root)?
            .into_iter()
            .filter(|s| s.subject == subject && s.kind == kind)
            .map(|s| s.label)
            .max();
        let label = next_label(now, latest);
        Ok(Snapshot::new(&self.root, subject, label, kind))
    }

    /// Hands files written by an elevated runtime back to the invoking user.
    fn fix_ownership(&self, path: &Path) {
        let gateway = self.containers.gateway();
        if gateway.mode() != PrivilegeMode::Elevated {
            return;
        }
        let Some(path_str) = path.to_str() else {
            tracing::warn!(path = %path.display(), "cannot fix ownership of non UTF-8 path");
            return;
        };
        let owner = format!("{}:{}", nix::unistd::getuid(), nix::unistd::getgid());
        if let Err(e) = gateway.run_host("chown", &[owner.as_str(), path_str]) {
            tracing::warn!(path = path_str, error = %e, "cannot fix snapshot ownership");
        }
    }
}

fn next_label(now: NaiveDateTime, latest: Option<NaiveDateTime>) -> NaiveDateTime {
    match latest {
        Some(latest) if latest >= now => latest + TimeDelta::seconds(1),
        _ => now,
    }
}

fn import_failed(snapshot: &Path, err: &DockhandError) -> DockhandError {
    DockhandError::ImportFailed {
        snapshot: snapshot.to_path_buf(),
        message: err.to_string(),
    }
}

/// Removes a partial snapshot left by a failed export.
fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed partial snapshot"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot remove partial snapshot"),
    }
}
