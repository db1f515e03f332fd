//! Unified error types for the dockhand workspace.
//!
//! Every library operation reports failures through [`DockhandError`]. The
//! variants map onto the operator-facing failure kinds: fatal precondition
//! failures, external command failures, configuration document errors,
//! input validation errors, and migration/backup specific conditions.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum DockhandError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A required tool, privilege, or service is unavailable.
    #[error("precondition failed: {message}")]
    PreconditionFailed {
        /// Description of the missing precondition.
        message: String,
    },

    /// An external command exited with a non-zero status.
    #[error("command `{command}` failed with status {status}: {stderr}")]
    CommandFailed {
        /// The command line as it was invoked.
        command: String,
        /// Exit status (`-1` when terminated by a signal).
        status: i32,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The configuration document exists but is not a JSON object.
    #[error("cannot parse configuration document {path}: {source}")]
    Parse {
        /// Path of the malformed document.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// The configuration document could not be written.
    #[error("cannot write configuration document {path}: {source}")]
    Write {
        /// Path of the document.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// User input was rejected before any side effect occurred.
    #[error("invalid input: {message}")]
    Validation {
        /// Description of the rejected input.
        message: String,
    },

    /// The requested data-root target is unusable.
    #[error("invalid target {path}: {reason}")]
    InvalidTarget {
        /// The requested target path.
        path: PathBuf,
        /// Why the target was rejected.
        reason: String,
    },

    /// The target filesystem cannot hold the data tree.
    #[error("not enough space at {path}: {required} bytes required, {available} available")]
    InsufficientSpace {
        /// Target path that was checked.
        path: PathBuf,
        /// Size of the data to be copied.
        required: u64,
        /// Bytes available at the target.
        available: u64,
    },

    /// The operator declined a confirmation.
    #[error("{operation} cancelled by operator")]
    Cancelled {
        /// The operation that was not confirmed.
        operation: String,
    },

    /// Post-restart verification reported an unexpected data root.
    #[error("migration verification failed: expected data root {expected}, service reports {reported}")]
    MigrationFailed {
        /// The requested data root.
        expected: String,
        /// The data root reported by the service.
        reported: String,
    },

    /// Rollback could not return the service to its original state.
    #[error("rollback failed during {step}: {message}")]
    RollbackFailed {
        /// The rollback step that failed.
        step: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// A container export did not complete.
    #[error("export of container {container} failed: {message}")]
    ExportFailed {
        /// The container being exported.
        container: String,
        /// Description of the failure.
        message: String,
    },

    /// A snapshot import did not complete.
    #[error("import of {snapshot} failed: {message}")]
    ImportFailed {
        /// The snapshot being imported.
        snapshot: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// A restore target name already belongs to a container.
    #[error("container name {name} is already in use")]
    NameInUse {
        /// The conflicting name.
        name: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl DockhandError {
    /// Returns whether the error must terminate the session.
    ///
    /// Only missing preconditions and failed rollbacks are fatal; every
    /// other failure returns control to the caller.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PreconditionFailed { .. } | Self::RollbackFailed { .. }
        )
    }

    /// Builds an [`DockhandError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, DockhandError>;
