//! Session startup checks.
//!
//! Any failure here is a [`DockhandError::PreconditionFailed`] and ends
//! the session.

use std::sync::Arc;

use dockhand_common::config::ConsoleConfig;
use dockhand_common::error::{DockhandError, Result};
use nix::unistd::Uid;

use crate::command::CommandRunner;
use crate::gateway::{PrivilegeMode, RuntimeGateway};

/// Verifies tooling and privilege, returning a ready gateway.
///
/// # Errors
///
/// Returns [`DockhandError::PreconditionFailed`] if the runtime binary is
/// not on `PATH` or no privilege mode can reach the runtime.
pub fn open_gateway(config: &ConsoleConfig, runner: Arc<dyn CommandRunner>) -> Result<RuntimeGateway> {
    let binary = which::which(&config.runtime_binary).map_err(|e| DockhandError::PreconditionFailed {
        message: format!("{} not found on PATH: {e}", config.runtime_binary),
    })?;
    tracing::debug!(binary = %binary.display(), "runtime binary located");

    let mode = PrivilegeMode::detect(&config.socket_path)?;
    tracing::info!(%mode, "privilege mode selected");
    Ok(RuntimeGateway::new(runner, config.runtime_binary.clone(), mode))
}

/// Checks that the runtime daemon answers, returning its server version.
///
/// # Errors
///
/// Returns [`DockhandError::PreconditionFailed`] if the daemon is unreachable.
pub fn require_daemon(gateway: &RuntimeGateway) -> Result<String> {
    let out = gateway
        .invoke(&["info", "--format", "{{.ServerVersion}}"])
        .map_err(|e| DockhandError::PreconditionFailed {
            message: format!("container runtime is not running or not accessible: {e}"),
        })?;
    let version = out.stdout.trim().to_string();
    tracing::info!(%version, "container runtime reachable");
    Ok(version)
}

/// Returns whether the effective user is root.
pub fn is_root() -> bool {
    Uid::effective().is_root()
}

/// Requires the effective user to be root.
///
/// # Errors
///
/// Returns [`DockhandError::PreconditionFailed`] for non-root users.
pub fn require_root(operation: &str) -> Result<()> {
    check_root(is_root(), operation)
}

/// Fails `operation` unless `is_root`.
///
/// # Errors
///
/// Returns [`DockhandError::PreconditionFailed`] when `is_root` is false.
pub fn check_root(is_root: bool, operation: &str) -> Result<()> {
    if is_root {
        Ok(())
    } else {
        Err(DockhandError::PreconditionFailed {
            message: format!("{operation} must be run as root"),
        })
    }
}
