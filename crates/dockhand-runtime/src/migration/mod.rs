//! Data-root migration.
//!
//! Relocating the runtime's data directory is the one operation whose
//! failure mid-way could leave the daemon unable to start. The engine
//! walks an explicit state machine and every exit path lands in one of
//! two known-good terminal states:
//!
//! ```text
//! Idle -> PlanValidated -> ConfigUpdated -> ServiceStopped -> DataCopied
//!      -> OldDataRenamed -> ServiceRestarted -> Verified(ok)  -> MigrationComplete
//!                                            -> Verified(err) -> RolledBack
//! ```
//!
//! Any failure after the configuration write routes to `RolledBack`. A
//! rollback is attempted once; if it cannot restore the original data root
//! and bring the service back, the engine returns
//! [`DockhandError::RollbackFailed`](dockhand_common::error::DockhandError::RollbackFailed)
//! and leaves recovery to the operator.

mod engine;
mod plan;

use std::fmt;

use dockhand_common::error::DockhandError;

pub use engine::{MigrationEngine, OldDataPolicy};
pub use plan::{MigrationPlan, normalize_root, staging_path};

use crate::fs::SyncStats;

/// Position of a migration in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationState {
    /// No migration in progress.
    Idle,
    /// Target checked; nothing changed yet.
    PlanValidated,
    /// `data-root` written to the daemon configuration.
    ConfigUpdated,
    /// Service stopped.
    ServiceStopped,
    /// Data tree copied to the target.
    DataCopied,
    /// Old data tree renamed to the staging path.
    OldDataRenamed,
    /// Service started again.
    ServiceRestarted,
    /// Reported data root compared against the target.
    Verified {
        /// Whether the service reports the target as its data root.
        success: bool,
    },
    /// Terminal: the service runs on the new data root.
    MigrationComplete,
    /// Terminal: the original data root is restored and serving.
    RolledBack,
}

impl MigrationState {
    /// Returns whether the state ends a migration.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::MigrationComplete | Self::RolledBack)
    }

    /// Returns whether `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::PlanValidated)
                | (Self::PlanValidated, Self::ConfigUpdated)
                | (Self::ConfigUpdated, Self::ServiceStopped)
                | (Self::ServiceStopped, Self::DataCopied)
                | (Self::DataCopied, Self::OldDataRenamed)
                | (Self::OldDataRenamed, Self::ServiceRestarted)
                | (Self::ServiceRestarted, Self::Verified { .. })
                | (Self::Verified { success: true }, Self::MigrationComplete)
                | (
                    Self::ConfigUpdated
                        | Self::ServiceStopped
                        | Self::DataCopied
                        | Self::OldDataRenamed
                        | Self::Verified { success: false },
                    Self::RolledBack
                )
        )
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::PlanValidated => write!(f, "plan validated"),
            Self::ConfigUpdated => write!(f, "configuration updated"),
            Self::ServiceStopped => write!(f, "service stopped"),
            Self::DataCopied => write!(f, "data copied"),
            Self::OldDataRenamed => write!(f, "old data renamed"),
            Self::ServiceRestarted => write!(f, "service restarted"),
            Self::Verified { success: true } => write!(f, "verified"),
            Self::Verified { success: false } => write!(f, "verification failed"),
            Self::MigrationComplete => write!(f, "migration complete"),
            Self::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// How a migration ended.
#[derive(Debug)]
pub enum MigrationOutcome {
    /// The service runs on the target.
    Complete {
        /// Whether the renamed-aside old tree was deleted.
        old_data_deleted: bool,
        /// Non-fatal problems encountered after verification.
        warnings: Vec<String>,
    },
    /// The original data root was restored.
    RolledBack {
        /// The failure that triggered the rollback.
        cause: DockhandError,
        /// Cleanup steps that failed without compromising the rollback.
        warnings: Vec<String>,
    },
}

/// Result of one migration attempt.
#[derive(Debug)]
pub struct MigrationReport {
    /// The validated plan.
    pub plan: MigrationPlan,
    /// Terminal outcome.
    pub outcome: MigrationOutcome,
    /// Every state visited, starting at [`MigrationState::Idle`].
    pub history: Vec<MigrationState>,
    /// Copy counters, when the copy ran to completion.
    pub sync: Option<SyncStats>,
}

impl MigrationReport {
    /// Returns the terminal state reached.
    #[must_use]
    pub const fn final_state(&self) -> MigrationState {
        match self.outcome {
            MigrationOutcome::Complete { .. } => MigrationState::MigrationComplete,
            MigrationOutcome::RolledBack { .. } => MigrationState::RolledBack,
        }
    }
}
