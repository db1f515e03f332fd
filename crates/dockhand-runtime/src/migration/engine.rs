//! The migration state machine.

use std::path::{Path, PathBuf};

use dockhand_common::confirm::Confirm;
use dockhand_common::constants::DATA_ROOT_KEY;
use dockhand_common::error::{DockhandError, Result};
use serde_json::json;

use super::plan::{MigrationPlan, normalize_root, staging_path};
use super::{MigrationOutcome, MigrationReport, MigrationState};
use crate::daemon_config::ConfigStore;
use crate::fs::{HostFs, SyncStats};
use crate::service::ServiceControl;

/// How far the destructive part of a migration got before failing.
#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    renamed: bool,
    start_attempted: bool,
}

type Observer<'a> = Box<dyn FnMut(MigrationState) + 'a>;

/// What happens to the old data tree after a verified migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OldDataPolicy {
    /// Ask through the confirmation capability.
    #[default]
    Ask,
    /// Delete without asking.
    Delete,
    /// Keep it at the staging path.
    Keep,
}

/// Drives a data-root migration.
///
/// The engine borrows its collaborators for the duration of one session;
/// the configuration store is only touched to write, and on rollback to
/// restore, the `data-root` key.
pub struct MigrationEngine<'a> {
    store: &'a ConfigStore,
    service: &'a dyn ServiceControl,
    fs: &'a dyn HostFs,
    confirm: &'a dyn Confirm,
    fallback_root: PathBuf,
    old_data: OldDataPolicy,
    state: MigrationState,
    history: Vec<MigrationState>,
    observer: Option<Observer<'a>>,
}

impl<'a> MigrationEngine<'a> {
    /// Creates an idle engine.
    ///
    /// `fallback_root` is assumed to be the current data root when the
    /// service cannot report one.
    pub fn new(
        store: &'a ConfigStore,
        service: &'a dyn ServiceControl,
        fs: &'a dyn HostFs,
        confirm: &'a dyn Confirm,
        fallback_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            service,
            fs,
            confirm,
            fallback_root: fallback_root.into(),
            old_data: OldDataPolicy::Ask,
            state: MigrationState::Idle,
            history: vec![MigrationState::Idle],
            observer: None,
        }
    }

    /// Registers a callback invoked on every state transition.
    #[must_use]
    pub fn with_observer(mut self, observer: impl FnMut(MigrationState) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Sets how the old data tree is handled after success.
    #[must_use]
    pub fn with_old_data_policy(mut self, policy: OldDataPolicy) -> Self {
        self.old_data = policy;
        self
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> MigrationState {
        self.state
    }

    /// Moves the data root to `requested`.
    ///
    /// Returns a report for every attempt that reached a terminal state,
    /// including rolled-back ones. Errors are returned only when the
    /// request is rejected before anything changed (the engine stays
    /// `Idle`), or when a rollback could not restore the original root.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::InvalidTarget`], [`DockhandError::Validation`],
    /// [`DockhandError::InsufficientSpace`] or [`DockhandError::Cancelled`]
    /// for rejected plans, a store error if the configuration cannot be
    /// written, and [`DockhandError::RollbackFailed`] if recovery failed.
    pub fn migrate(&mut self, requested: &Path) -> Result<MigrationReport> {
        self.state = MigrationState::Idle;
        self.history = vec![MigrationState::Idle];

        let plan = self.validate(requested)?;
        self.advance(MigrationState::PlanValidated);

        if let Err(e) = self.store.update(DATA_ROOT_KEY, json!(plan.target_str())) {
            self.discard_created_target(&plan);
            self.reset();
            return Err(e);
        }
        self.advance(MigrationState::ConfigUpdated);

        let question = format!(
            "Stop the container runtime and move its data from {} to {}?",
            plan.previous.display(),
            plan.target.display()
        );
        if !self.confirm.confirm(&question) {
            let cause = DockhandError::Cancelled {
                operation: "data-root migration".into(),
            };
            return self.abort(plan, cause);
        }
        if let Err(e) = self.service.stop() {
            return self.abort(plan, e);
        }
        self.advance(MigrationState::ServiceStopped);

        let stats = match self.fs.sync_tree(&plan.previous, &plan.target) {
            Ok(stats) => stats,
            Err(e) => return self.roll_back(plan, Progress::default(), e, None),
        };
        self.advance(MigrationState::DataCopied);

        if let Err(e) = self.fs.rename(&plan.previous, &plan.staging) {
            return self.roll_back(plan, Progress::default(), e, Some(stats));
        }
        self.advance(MigrationState::OldDataRenamed);

        let progress = Progress {
            renamed: true,
            start_attempted: true,
        };
        if let Err(e) = self.service.start() {
            return self.roll_back(plan, progress, e, Some(stats));
        }
        self.advance(MigrationState::ServiceRestarted);

        let verification = self.verify(&plan.target);
        self.advance(MigrationState::Verified {
            success: verification.is_ok(),
        });
        match verification {
            Ok(()) => Ok(self.complete(plan, stats)),
            Err(e) => self.roll_back(plan, progress, e, Some(stats)),
        }
    }

    fn validate(&self, requested: &Path) -> Result<MigrationPlan> {
        let raw = requested.to_string_lossy();
        if raw.trim().is_empty() {
            return Err(DockhandError::InvalidTarget {
                path: requested.to_path_buf(),
                reason: "target path is empty".into(),
            });
        }
        let target = normalize_root(&raw)?;
        let previous = match self.service.data_root().and_then(|r| normalize_root(&r)) {
            Ok(previous) => previous,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = %self.fallback_root.display(),
                    "cannot determine current data root, assuming default"
                );
                self.fallback_root.clone()
            }
        };
        let invalid = |reason: &str| DockhandError::InvalidTarget {
            path: target.clone(),
            reason: reason.to_string(),
        };

        if target == previous {
            return Err(DockhandError::Validation {
                message: format!("{} is already the data root", target.display()),
            });
        }
        if target.starts_with(&previous) || previous.starts_with(&target) {
            return Err(invalid("target and current data root are nested"));
        }
        if !self.fs.is_dir(&previous) {
            return Err(DockhandError::Validation {
                message: format!("current data root {} does not exist", previous.display()),
            });
        }
        let staging = staging_path(&previous);
        if target == staging {
            return Err(invalid("target is the staging path for the current data root"));
        }
        if self.fs.exists(&staging) {
            return Err(DockhandError::Validation {
                message: format!(
                    "{} already exists; remove or rename it before migrating",
                    staging.display()
                ),
            });
        }

        let required = self.fs.tree_size(&previous)?;
        let available = self.fs.available_space(&target)?;
        if available < required {
            return Err(DockhandError::InsufficientSpace {
                path: target.clone(),
                required,
                available,
            });
        }
        tracing::info!(required, available, "space check passed");

        let prior_data_root = self.store.read()?.get(DATA_ROOT_KEY).cloned();

        let created_target = if self.fs.exists(&target) {
            if !self.fs.is_dir(&target) {
                return Err(invalid("target exists and is not a directory"));
            }
            let question = format!(
                "{} is not empty and its contents will be replaced. Continue?",
                target.display()
            );
            if !self.fs.is_empty_dir(&target)? && !self.confirm.confirm(&question) {
                return Err(DockhandError::Cancelled {
                    operation: "data-root migration".into(),
                });
            }
            false
        } else {
            let question = format!("Directory {} does not exist. Create it?", target.display());
            if !self.confirm.confirm(&question) {
                return Err(DockhandError::Cancelled {
                    operation: "data-root migration".into(),
                });
            }
            self.fs
                .create_dir(&target)
                .map_err(|e| invalid(&format!("cannot be created: {e}")))?;
            true
        };

        if let Err(e) = self.fs.probe_writable(&target) {
            if created_target {
                if let Err(cleanup) = self.fs.remove_tree(&target) {
                    tracing::warn!(path = %target.display(), error = %cleanup, "cannot remove target");
                }
            }
            return Err(invalid(&format!("not writable: {e}")));
        }

        let plan = MigrationPlan {
            target,
            previous,
            staging,
            created_target,
            prior_data_root,
        };
        tracing::info!(
            target = %plan.target.display(),
            previous = %plan.previous.display(),
            staging = %plan.staging.display(),
            "migration plan validated"
        );
        Ok(plan)
    }

    fn verify(&self, expected: &Path) -> Result<()> {
        let reported = self.service.data_root()?;
        if normalize_root(&reported).is_ok_and(|root| root == expected) {
            tracing::info!(data_root = %reported, "service reports new data root");
            Ok(())
        } else {
            Err(DockhandError::MigrationFailed {
                expected: expected.display().to_string(),
                reported,
            })
        }
    }

    fn complete(&mut self, plan: MigrationPlan, stats: SyncStats) -> MigrationReport {
        let mut warnings = Vec::new();
        let question = format!(
            "Migration verified. Delete the old data at {}?",
            plan.staging.display()
        );
        let delete = match self.old_data {
            OldDataPolicy::Ask => self.confirm.confirm(&question),
            OldDataPolicy::Delete => true,
            OldDataPolicy::Keep => false,
        };
        let old_data_deleted = if delete {
            match self.fs.remove_tree(&plan.staging) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(path = %plan.staging.display(), error = %e, "cannot delete old data");
                    warnings.push(format!("delete {}: {e}", plan.staging.display()));
                    false
                }
            }
        } else {
            tracing::info!(path = %plan.staging.display(), "old data kept");
            false
        };
        self.advance(MigrationState::MigrationComplete);
        MigrationReport {
            plan,
            outcome: MigrationOutcome::Complete {
                old_data_deleted,
                warnings,
            },
            history: self.history.clone(),
            sync: Some(stats),
        }
    }

    /// Ends a migration that never stopped the service.
    fn abort(&mut self, plan: MigrationPlan, cause: DockhandError) -> Result<MigrationReport> {
        tracing::warn!(cause = %cause, "migration aborted before the service was stopped");
        self.restore_config(&plan)?;
        let warnings = self.discard_created_target(&plan).into_iter().collect();
        self.advance(MigrationState::RolledBack);
        Ok(MigrationReport {
            plan,
            outcome: MigrationOutcome::RolledBack { cause, warnings },
            history: self.history.clone(),
            sync: None,
        })
    }

    fn roll_back(
        &mut self,
        plan: MigrationPlan,
        progress: Progress,
        cause: DockhandError,
        sync: Option<SyncStats>,
    ) -> Result<MigrationReport> {
        tracing::error!(cause = %cause, state = %self.state, "migration failed, rolling back");
        let mut warnings = Vec::new();

        if progress.start_attempted {
            if let Err(e) = self.service.stop() {
                tracing::warn!(error = %e, "cannot stop service during rollback");
                warnings.push(format!("stop service: {e}"));
            }
        }

        if let Err(e) = self.fs.clear_dir(&plan.target) {
            tracing::warn!(path = %plan.target.display(), error = %e, "cannot clear target");
            warnings.push(format!("clear {}: {e}", plan.target.display()));
        }
        warnings.extend(self.discard_created_target(&plan));

        if progress.renamed {
            self.fs
                .rename(&plan.staging, &plan.previous)
                .map_err(|e| rollback_failed("restore original data directory", &e))?;
        }
        self.restore_config(&plan)?;
        self.service
            .start()
            .map_err(|e| rollback_failed("restart service", &e))?;

        let reported = self
            .service
            .data_root()
            .map_err(|e| rollback_failed("verify original data root", &e))?;
        if !normalize_root(&reported).is_ok_and(|root| root == plan.previous) {
            return Err(DockhandError::RollbackFailed {
                step: "verify original data root",
                message: format!(
                    "service reports {reported}, expected {}",
                    plan.previous.display()
                ),
            });
        }

        self.advance(MigrationState::RolledBack);
        tracing::info!(data_root = %plan.previous.display(), "rollback complete");
        Ok(MigrationReport {
            plan,
            outcome: MigrationOutcome::RolledBack { cause, warnings },
            history: self.history.clone(),
            sync,
        })
    }

    fn restore_config(&self, plan: &MigrationPlan) -> Result<()> {
        let restored = match &plan.prior_data_root {
            Some(value) => self.store.update(DATA_ROOT_KEY, value.clone()).map(|_| ()),
            None => self.store.remove(DATA_ROOT_KEY).map(|_| ()),
        };
        restored.map_err(|e| rollback_failed("restore configuration", &e))
    }

    /// Removes the target directory if this migration created it.
    fn discard_created_target(&self, plan: &MigrationPlan) -> Option<String> {
        if !plan.created_target {
            return None;
        }
        self.fs.remove_tree(&plan.target).err().map(|e| {
            tracing::warn!(path = %plan.target.display(), error = %e, "cannot remove target");
            format!("remove {}: {e}", plan.target.display())
        })
    }

    fn advance(&mut self, next: MigrationState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal migration transition {} -> {next}",
            self.state
        );
        tracing::info!(from = %self.state, to = %next, "migration state");
        self.state = next;
        self.history.push(next);
        if let Some(observer) = self.observer.as_mut() {
            observer(next);
        }
    }

    fn reset(&mut self) {
        self.state = MigrationState::Idle;
        self.history = vec![MigrationState::Idle];
    }
}

fn rollback_failed(step: &'static str, err: &DockhandError) -> DockhandError {
    tracing::error!(step, error = %err, "rollback step failed");
    DockhandError::RollbackFailed {
        step,
        message: err.to_string(),
    }
}
