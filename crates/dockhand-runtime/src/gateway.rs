//! Runtime command gateway.
//!
//! Uniform invocation of the runtime's command-line interface. The
//! privilege mode is decided once per session and applied to every call
//! made through the gateway, including the host tools the console needs
//! (`systemctl`, `chown`).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use dockhand_common::error::{DockhandError, Result};
use nix::unistd::{AccessFlags, Uid, access};

use crate::command::{CommandOutput, CommandRunner, render};

/// Program used to elevate privilege.
const ELEVATION_PROGRAM: &str = "sudo";

/// How commands reach the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegeMode {
    /// Commands run as the current user.
    Direct,
    /// Commands are prefixed with `sudo`.
    Elevated,
}

impl PrivilegeMode {
    /// Selects the mode for this session.
    ///
    /// Root and users with read/write access to the control socket run
    /// commands directly; everyone else is elevated, provided `sudo` is
    /// installed.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::PreconditionFailed`] if elevation is needed
    /// but unavailable.
    pub fn detect(socket: &Path) -> Result<Self> {
        if Uid::effective().is_root() {
            tracing::debug!("running as root, no elevation needed");
            return Ok(Self::Direct);
        }
        if access(socket, AccessFlags::R_OK | AccessFlags::W_OK).is_ok() {
            tracing::debug!(socket = %socket.display(), "control socket reachable without elevation");
            return Ok(Self::Direct);
        }
        if which::which(ELEVATION_PROGRAM).is_ok() {
            tracing::info!(socket = %socket.display(), "control socket not reachable, elevating with sudo");
            return Ok(Self::Elevated);
        }
        Err(DockhandError::PreconditionFailed {
            message: format!(
                "cannot access {} and {ELEVATION_PROGRAM} is not installed",
                socket.display()
            ),
        })
    }

    /// Rewrites a command line for this mode.
    #[must_use]
    pub fn command_line(self, program: &str, args: &[String]) -> (String, Vec<String>) {
        match self {
            Self::Direct => (program.to_string(), args.to_vec()),
            Self::Elevated => {
                let mut elevated = Vec::with_capacity(args.len() + 1);
                elevated.push(program.to_string());
                elevated.extend_from_slice(args);
                (ELEVATION_PROGRAM.to_string(), elevated)
            }
        }
    }
}

impl fmt::Display for PrivilegeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Elevated => write!(f, "elevated"),
        }
    }
}

/// Gateway to the runtime's command-line interface.
///
/// Cheap to clone; clones share the runner and the privilege mode.
#[derive(Clone)]
pub struct RuntimeGateway {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    mode: PrivilegeMode,
}

impl fmt::Debug for RuntimeGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeGateway")
            .field("binary", &self.binary)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl RuntimeGateway {
    /// Creates a gateway invoking `binary` through `runner` in `mode`.
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>, mode: PrivilegeMode) -> Self {
        Self {
            runner,
            binary: binary.into(),
            mode,
        }
    }

    /// Returns the privilege mode chosen for this session.
    #[must_use]
    pub const fn mode(&self) -> PrivilegeMode {
        self.mode
    }

    /// Invokes the runtime binary with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::CommandFailed`] on a non-zero exit, or an
    /// I/O error if the process cannot be spawned.
    pub fn invoke(&self, args: &[&str]) -> Result<CommandOutput> {
        self.run_host(&self.binary, args)
    }

    /// Invokes a host tool under the session's privilege mode.
    ///
    /// # Errors
    ///
    /// Returns [`DockhandError::CommandFailed`] on a non-zero exit, or an
    /// I/O error if the process cannot be spawned.
    pub fn run_host(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        let (program, args) = self.mode.command_line(program, &args);
        let output = self.runner.run(&program, &args)?;
        if output.success() {
            return Ok(output);
        }
        let command = render(&program, &args);
        tracing::debug!(%command, status = output.exit_code, "command failed");
        Err(DockhandError::CommandFailed {
            command,
            status: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}
