//! End-to-end migration scenarios against a scripted daemon.
//!
//! The filesystem side runs for real inside a temporary directory; only
//! the service manager is simulated. The simulated daemon reads its data
//! root from the configuration document whenever it starts, like the real
//! one does.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use dockhand_common::confirm::ScriptedAnswers;
use dockhand_common::error::{DockhandError, Result};
use dockhand_runtime::daemon_config::ConfigStore;
use dockhand_runtime::fs::{HostFs, LocalFs, SyncStats};
use dockhand_runtime::migration::{MigrationEngine, MigrationOutcome, MigrationState, OldDataPolicy};
use dockhand_runtime::service::ServiceControl;
use serde_json::json;

// ── Fixtures ─────────────────────────────────────────────────────────

struct FakeDaemon {
    store: ConfigStore,
    default_root: PathBuf,
    active_root: RefCell<PathBuf>,
    running: Cell<bool>,
    /// Keeps serving the root it booted with, ignoring the configuration.
    stale: bool,
    fail_stop: bool,
    /// Number of upcoming `start` calls that fail.
    failing_starts: Cell<u32>,
    log: RefCell<Vec<&'static str>>,
}

impl FakeDaemon {
    fn new(store: ConfigStore, root: &Path) -> Self {
        Self {
            store,
            default_root: root.to_path_buf(),
            active_root: RefCell::new(root.to_path_buf()),
            running: Cell::new(true),
            stale: false,
            fail_stop: false,
            failing_starts: Cell::new(0),
            log: RefCell::new(Vec::new()),
        }
    }

    fn unavailable(what: &str) -> DockhandError {
        DockhandError::CommandFailed {
            command: format!("systemctl {what} docker"),
            status: 1,
            stderr: "Job failed".into(),
        }
    }
}

impl ServiceControl for FakeDaemon {
    fn stop(&self) -> Result<()> {
        self.log.borrow_mut().push("stop");
        if self.fail_stop {
            return Err(Self::unavailable("stop"));
        }
        self.running.set(false);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.log.borrow_mut().push("start");
        if self.failing_starts.get() > 0 {
            self.failing_starts.set(self.failing_starts.get() - 1);
            return Err(Self::unavailable("start"));
        }
        if !self.stale {
            let configured = self
                .store
                .read()?
                .get("data-root")
                .and_then(|v| v.as_str().map(PathBuf::from))
                .unwrap_or_else(|| self.default_root.clone());
            *self.active_root.borrow_mut() = configured;
        }
        self.running.set(true);
        Ok(())
    }

    fn restart(&self) -> Result<()> {
        self.stop()?;
        self.start()
    }

    fn data_root(&self) -> Result<String> {
        if !self.running.get() {
            return Err(DockhandError::CommandFailed {
                command: "docker info".into(),
                status: 1,
                stderr: "Cannot connect to the Docker daemon".into(),
            });
        }
        // The runtime prints a trailing newline; a trailing slash must
        // not defeat verification either.
        Ok(format!("{}/\n", self.active_root.borrow().display()))
    }
}

/// Delegates to [`LocalFs`], failing the operations that are switched on.
#[derive(Default)]
struct FaultyFs {
    /// The tree copy writes a partial file, then runs out of space.
    copy: bool,
    /// Probe files cannot be created.
    unwritable: bool,
    /// Trees cannot be removed.
    remove: bool,
}

impl FaultyFs {
    fn disk_error(path: &Path, kind: std::io::ErrorKind, message: &str) -> DockhandError {
        DockhandError::io(path, std::io::Error::new(kind, message.to_string()))
    }
}

impl HostFs for FaultyFs {
    fn exists(&self, path: &Path) -> bool {
        LocalFs.exists(path)
    }
    fn is_dir(&self, path: &Path) -> bool {
        LocalFs.is_dir(path)
    }
    fn is_empty_dir(&self, path: &Path) -> Result<bool> {
        LocalFs.is_empty_dir(path)
    }
    fn create_dir(&self, path: &Path) -> Result<()> {
        LocalFs.create_dir(path)
    }
    fn probe_writable(&self, dir: &Path) -> Result<()> {
        if self.unwritable {
            return Err(Self::disk_error(dir, std::io::ErrorKind::ReadOnlyFilesystem, "read-only file system"));
        }
        LocalFs.probe_writable(dir)
    }
    fn tree_size(&self, path: &Path) -> Result<u64> {
        LocalFs.tree_size(path)
    }
    fn available_space(&self, path: &Path) -> Result<u64> {
        LocalFs.available_space(path)
    }
    fn sync_tree(&self, src: &Path, dst: &Path) -> Result<SyncStats> {
        if self.copy {
            std::fs::write(dst.join("partial-layer"), b"half").unwrap();
            return Err(Self::disk_error(dst, std::io::ErrorKind::StorageFull, "no space left on device"));
        }
        LocalFs.sync_tree(src, dst)
    }
    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        LocalFs.rename(from, to)
    }
    fn clear_dir(&self, dir: &Path) -> Result<()> {
        LocalFs.clear_dir(dir)
    }
    fn remove_tree(&self, path: &Path) -> Result<()> {
        if self.remove {
            return Err(Self::disk_error(path, std::io::ErrorKind::PermissionDenied, "permission denied"));
        }
        LocalFs.remove_tree(path)
    }
}

struct Host {
    _dir: tempfile::TempDir,
    previous: PathBuf,
    target: PathBuf,
    config: PathBuf,
}

impl Host {
    fn new(daemon_json: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let previous = dir.path().join("var/lib/runtime");
        std::fs::create_dir_all(previous.join("containers/web1")).unwrap();
        std::fs::create_dir_all(previous.join("volumes")).unwrap();
        std::fs::write(previous.join("containers/web1/config.v2.json"), b"{\"Name\":\"web1\"}").unwrap();
        std::fs::write(previous.join("volumes/metadata.db"), b"volumes").unwrap();
        let config = dir.path().join("etc/docker/daemon.json");
        std::fs::create_dir_all(config.parent().unwrap()).unwrap();
        std::fs::write(&config, daemon_json).unwrap();
        Self {
            target: dir.path().join("mnt/data"),
            previous,
            config,
            _dir: dir,
        }
    }

    fn store(&self) -> ConfigStore {
        ConfigStore::new(&self.config)
    }

    fn daemon(&self) -> FakeDaemon {
        FakeDaemon::new(self.store(), &self.previous)
    }

    fn staging(&self) -> PathBuf {
        PathBuf::from(format!("{}.old", self.previous.display()))
    }
}

fn no_files_under(path: &Path) -> bool {
    !path.exists() || LocalFs.is_empty_dir(path).unwrap()
}

// ── Success ──────────────────────────────────────────────────────────

#[test]
fn migration_completes_and_service_reports_target() {
    let host = Host::new(r#"{"log-level":"info"}"#);
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([true, true, false]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let report = engine.migrate(&host.target).expect("migrate");

    assert_eq!(report.final_state(), MigrationState::MigrationComplete);
    assert_eq!(engine.state(), MigrationState::MigrationComplete);
    assert_eq!(
        report.history,
        vec![
            MigrationState::Idle,
            MigrationState::PlanValidated,
            MigrationState::ConfigUpdated,
            MigrationState::ServiceStopped,
            MigrationState::DataCopied,
            MigrationState::OldDataRenamed,
            MigrationState::ServiceRestarted,
            MigrationState::Verified { success: true },
            MigrationState::MigrationComplete,
        ]
    );
    assert_eq!(daemon.data_root().unwrap().trim_end_matches(['/', '\n']), host.target.to_str().unwrap());
    assert_eq!(
        std::fs::read(host.target.join("containers/web1/config.v2.json")).unwrap(),
        b"{\"Name\":\"web1\"}"
    );
    assert!(!host.previous.exists());
    assert!(host.staging().join("volumes/metadata.db").exists());
    assert!(matches!(
        report.outcome,
        MigrationOutcome::Complete { old_data_deleted: false, .. }
    ));

    let doc = store.read().unwrap();
    assert_eq!(doc.get("log-level"), Some(&json!("info")));
    assert_eq!(doc.get("data-root"), Some(&json!(host.target.to_str().unwrap())));
}

#[test]
fn confirmed_cleanup_deletes_the_old_tree() {
    let host = Host::new("{}");
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([true, true, true]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let report = engine.migrate(&host.target).expect("migrate");

    assert!(matches!(
        report.outcome,
        MigrationOutcome::Complete { old_data_deleted: true, .. }
    ));
    assert!(!host.staging().exists());
    assert!(answers.asked()[2].contains("Delete the old data"));
}

#[test]
fn delete_policy_removes_old_tree_without_asking() {
    let host = Host::new("{}");
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([true, true]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous)
        .with_old_data_policy(OldDataPolicy::Delete);

    let report = engine.migrate(&host.target).expect("migrate");

    assert!(matches!(
        report.outcome,
        MigrationOutcome::Complete { old_data_deleted: true, .. }
    ));
    assert_eq!(answers.asked().len(), 2);
    assert!(!host.staging().exists());
}

#[test]
fn migration_into_partially_copied_target_converges() {
    let host = Host::new("{}");
    std::fs::create_dir_all(host.target.join("containers/web1")).unwrap();
    std::fs::write(host.target.join("containers/web1/config.v2.json"), b"{\"Na").unwrap();
    std::fs::write(host.target.join("leftover.tmp"), b"x").unwrap();
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([true, true, false]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let report = engine.migrate(&host.target).expect("migrate");

    assert_eq!(report.final_state(), MigrationState::MigrationComplete);
    assert!(answers.asked()[0].contains("not empty"));
    assert!(!host.target.join("leftover.tmp").exists());
    assert_eq!(
        std::fs::read(host.target.join("containers/web1/config.v2.json")).unwrap(),
        b"{\"Name\":\"web1\"}"
    );
}

// ── Rollback ─────────────────────────────────────────────────────────

#[test]
fn stale_restart_rolls_back_to_original_root() {
    let host = Host::new(r#"{"log-level":"info"}"#);
    let store = host.store();
    let mut daemon = host.daemon();
    daemon.stale = true;
    let answers = ScriptedAnswers::new([true, true]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let report = engine.migrate(&host.target).expect("rollback succeeds");

    assert_eq!(report.final_state(), MigrationState::RolledBack);
    assert_eq!(engine.state(), MigrationState::RolledBack);
    assert!(report.history.contains(&MigrationState::Verified { success: false }));
    match &report.outcome {
        MigrationOutcome::RolledBack { cause, .. } => {
            assert!(matches!(cause, DockhandError::MigrationFailed { .. }));
        }
        other => panic!("expected rollback, got {other:?}"),
    }

    assert_eq!(
        daemon.data_root().unwrap().trim_end_matches(['/', '\n']),
        host.previous.to_str().unwrap()
    );
    assert!(host.previous.join("containers/web1/config.v2.json").exists());
    assert!(host.previous.join("volumes/metadata.db").exists());
    assert!(!host.staging().exists());
    assert!(no_files_under(&host.target));

    let doc = store.read().unwrap();
    assert_eq!(doc.get("data-root"), None);
    assert_eq!(doc.get("log-level"), Some(&json!("info")));
}

#[test]
fn rollback_restores_prior_data_root_value() {
    let prior = r#"{"data-root":"/var/lib/runtime-configured"}"#;
    let host = Host::new(prior);
    let store = host.store();
    let mut daemon = host.daemon();
    daemon.stale = true;
    let answers = ScriptedAnswers::new([true, true]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let _ = engine.migrate(&host.target).expect("rollback succeeds");

    assert_eq!(
        store.read().unwrap().get("data-root"),
        Some(&json!("/var/lib/runtime-configured"))
    );
}

#[test]
fn copy_failure_rolls_back_before_anything_is_renamed() {
    let host = Host::new("{}");
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([true, true]);
    let fs = FaultyFs {
        copy: true,
        ..FaultyFs::default()
    };
    let mut engine = MigrationEngine::new(&store, &daemon, &fs, &answers, &host.previous);

    let report = engine.migrate(&host.target).expect("rollback succeeds");

    assert_eq!(
        report.history,
        vec![
            MigrationState::Idle,
            MigrationState::PlanValidated,
            MigrationState::ConfigUpdated,
            MigrationState::ServiceStopped,
            MigrationState::RolledBack,
        ]
    );
    assert!(report.sync.is_none());
    assert!(no_files_under(&host.target));
    assert!(host.previous.join("volumes/metadata.db").exists());
    assert_eq!(*daemon.log.borrow(), vec!["stop", "start"]);
    assert!(daemon.data_root().unwrap().starts_with(host.previous.to_str().unwrap()));
}

#[test]
fn failed_start_rolls_back_and_restarts_on_original_root() {
    let host = Host::new("{}");
    let store = host.store();
    let daemon = host.daemon();
    daemon.failing_starts.set(1);
    let answers = ScriptedAnswers::new([true, true]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let report = engine.migrate(&host.target).expect("rollback succeeds");

    assert_eq!(report.final_state(), MigrationState::RolledBack);
    assert_eq!(
        report.history[report.history.len() - 2],
        MigrationState::OldDataRenamed
    );
    assert!(host.previous.join("containers/web1").is_dir());
    assert!(!host.staging().exists());
    assert!(no_files_under(&host.target));
}

#[test]
fn rollback_restart_failure_is_fatal() {
    let host = Host::new("{}");
    let store = host.store();
    let daemon = host.daemon();
    daemon.failing_starts.set(2);
    let answers = ScriptedAnswers::new([true, true]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let err = engine.migrate(&host.target).expect_err("rollback cannot restart");

    assert!(err.is_fatal());
    assert!(matches!(
        err,
        DockhandError::RollbackFailed { step: "restart service", .. }
    ));
    // The data itself is back in place for the operator.
    assert!(host.previous.join("volumes/metadata.db").exists());
    assert_eq!(daemon.log.borrow().iter().filter(|c| **c == "start").count(), 2);
}

// ── Aborts before the service stops ──────────────────────────────────

#[test]
fn declining_to_proceed_restores_config_and_never_stops() {
    let host = Host::new(r#"{"ipv6":true}"#);
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([true, false]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let report = engine.migrate(&host.target).expect("aborted cleanly");

    assert_eq!(
        report.history,
        vec![
            MigrationState::Idle,
            MigrationState::PlanValidated,
            MigrationState::ConfigUpdated,
            MigrationState::RolledBack,
        ]
    );
    assert!(matches!(
        report.outcome,
        MigrationOutcome::RolledBack { cause: DockhandError::Cancelled { .. }, .. }
    ));
    assert!(daemon.log.borrow().is_empty());
    assert!(!host.target.exists());
    assert_eq!(serde_json::Value::Object(store.read().unwrap()), json!({"ipv6": true}));
}

#[test]
fn stop_failure_aborts_without_copying() {
    let host = Host::new("{}");
    let store = host.store();
    let mut daemon = host.daemon();
    daemon.fail_stop = true;
    let answers = ScriptedAnswers::new([true, true]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let report = engine.migrate(&host.target).expect("aborted cleanly");

    assert_eq!(report.final_state(), MigrationState::RolledBack);
    assert!(!report.history.contains(&MigrationState::ServiceStopped));
    assert!(no_files_under(&host.target));
    assert_eq!(*daemon.log.borrow(), vec!["stop"]);
    assert_eq!(store.read().unwrap().get("data-root"), None);
}

// ── Rejected plans ───────────────────────────────────────────────────

#[test]
fn empty_target_is_rejected_without_side_effects() {
    let host = Host::new(r#"{"log-level":"warn"}"#);
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let err = engine.migrate(Path::new("")).expect_err("empty target");

    assert!(matches!(err, DockhandError::InvalidTarget { .. }));
    assert_eq!(engine.state(), MigrationState::Idle);
    assert_eq!(std::fs::read_to_string(&host.config).unwrap(), r#"{"log-level":"warn"}"#);
    assert!(answers.asked().is_empty());
}

#[test]
fn current_root_is_rejected_as_target() {
    let host = Host::new("{}");
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([true, true]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let with_slash = PathBuf::from(format!("{}/", host.previous.display()));
    let err = engine.migrate(&with_slash).expect_err("same root");

    assert!(matches!(err, DockhandError::Validation { .. }));
    assert_eq!(engine.state(), MigrationState::Idle);
}

#[test]
fn nested_target_is_rejected() {
    let host = Host::new("{}");
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([true, true]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let err = engine.migrate(&host.previous.join("inner")).expect_err("nested");
    assert!(matches!(err, DockhandError::InvalidTarget { .. }));
}

#[test]
fn leftover_staging_directory_blocks_migration() {
    let host = Host::new("{}");
    std::fs::create_dir_all(host.staging()).unwrap();
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([true, true]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let err = engine.migrate(&host.target).expect_err("staging exists");

    assert!(matches!(err, DockhandError::Validation { .. }));
    assert!(!host.target.exists());
}

#[test]
fn declining_target_creation_cancels() {
    let host = Host::new("{}");
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([false]);
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous);

    let err = engine.migrate(&host.target).expect_err("declined");

    assert!(matches!(err, DockhandError::Cancelled { .. }));
    assert!(!host.target.exists());
    assert_eq!(std::fs::read_to_string(&host.config).unwrap(), "{}");
}

#[test]
fn unwritable_created_target_is_removed_and_rejected() {
    let host = Host::new("{}");
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([true]);
    let fs = FaultyFs {
        unwritable: true,
        ..FaultyFs::default()
    };
    let mut engine = MigrationEngine::new(&store, &daemon, &fs, &answers, &host.previous);

    let err = engine.migrate(&host.target).expect_err("not writable");

    assert!(matches!(&err, DockhandError::InvalidTarget { reason, .. } if reason.contains("not writable")));
    assert!(!host.target.exists());
    assert!(daemon.log.borrow().is_empty());
}

#[test]
fn failed_cleanup_of_unwritable_target_still_rejects_it() {
    let host = Host::new("{}");
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([true]);
    let fs = FaultyFs {
        unwritable: true,
        remove: true,
        ..FaultyFs::default()
    };
    let mut engine = MigrationEngine::new(&store, &daemon, &fs, &answers, &host.previous);

    let err = engine.migrate(&host.target).expect_err("not writable");

    assert!(matches!(&err, DockhandError::InvalidTarget { reason, .. } if reason.contains("not writable")));
    assert!(host.target.is_dir());
    assert_eq!(std::fs::read_to_string(&host.config).unwrap(), "{}");
}

#[test]
fn observer_sees_every_transition() {
    let host = Host::new("{}");
    let store = host.store();
    let daemon = host.daemon();
    let answers = ScriptedAnswers::new([true, true, false]);
    let seen = RefCell::new(Vec::new());
    let mut engine = MigrationEngine::new(&store, &daemon, &LocalFs, &answers, &host.previous)
        .with_observer(|state| seen.borrow_mut().push(state));

    let report = engine.migrate(&host.target).expect("migrate");
    drop(engine);

    assert_eq!(seen.borrow().as_slice(), &report.history[1..]);
}
